// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Owning arena for the nodes of one in-memory mount

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, trace, warn};

use crate::config::MemFsConfig;
use crate::error::{FsError, FsResult};
use crate::fault::{FaultInjector, FaultOp};
use crate::node::MemNode;
use crate::types::{
    AccessMode, Clock, MountId, MountStats, NodeId, NodeState, NodeType, StatData, SystemClock,
    TreeChange, UtimBuf,
};

static NEXT_MOUNT_ID: AtomicU64 = AtomicU64::new(1);

/// In-memory mount: owns every node, stamps times, and keeps parent and child
/// links consistent.
///
/// Single-threaded by contract; callers sharing a mount across threads wrap
/// it in their own lock.
pub struct MemMount {
    id: MountId,
    config: MemFsConfig,
    clock: Box<dyn Clock>,
    faults: FaultInjector,
    nodes: HashMap<NodeId, MemNode>,
    root: NodeId,
    next_node_id: u64,
}

impl MemMount {
    /// Create a mount with an empty root directory
    pub fn new(config: MemFsConfig) -> FsResult<Self> {
        Self::with_clock(config, Box::new(SystemClock))
    }

    pub fn with_clock(config: MemFsConfig, clock: Box<dyn Clock>) -> FsResult<Self> {
        config.buffer.validate()?;
        let id = MountId::new(NEXT_MOUNT_ID.fetch_add(1, Ordering::Relaxed));
        let faults = FaultInjector::with_policy(config.fault.clone());
        let mut mount = Self {
            id,
            config,
            clock,
            faults,
            nodes: HashMap::new(),
            root: NodeId(0),
            next_node_id: 1,
        };
        mount.root = mount.allocate_node(NodeType::Directory, "");
        debug!(mount = mount.id.0, root = %mount.root, "created in-memory mount");
        Ok(mount)
    }

    pub fn id(&self) -> MountId {
        self.id
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn config(&self) -> &MemFsConfig {
        &self.config
    }

    pub fn faults(&self) -> &FaultInjector {
        &self.faults
    }

    pub fn node(&self, id: NodeId) -> FsResult<&MemNode> {
        self.nodes.get(&id).ok_or(FsError::NotFound)
    }

    pub fn node_mut(&mut self, id: NodeId) -> FsResult<&mut MemNode> {
        self.nodes.get_mut(&id).ok_or(FsError::NotFound)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn stats(&self) -> MountStats {
        let mut stats = MountStats {
            nodes: self.nodes.len(),
            ..MountStats::default()
        };
        for node in self.nodes.values() {
            if node.state() == NodeState::Unlinked {
                stats.unlinked += 1;
            }
            stats.open_handles += u64::from(node.use_count());
            stats.bytes_in_memory += node.capacity() as u64;
        }
        stats
    }

    fn allocate_node(&mut self, kind: NodeType, name: &str) -> NodeId {
        let id = NodeId(self.next_node_id);
        self.next_node_id += 1;
        let mode = match kind {
            NodeType::File => self.config.modes.file_mode,
            NodeType::Directory => self.config.modes.dir_mode,
        };
        let mut node = MemNode::new(id, kind, name, mode, self.clock.now());
        node.set_mount(Some(self.id));
        self.nodes.insert(id, node);
        id
    }

    // Directory entries

    /// Create an empty regular file named `name` in `parent`
    pub fn create_file(&mut self, parent: NodeId, name: &str) -> FsResult<NodeId> {
        self.create_entry(parent, name, NodeType::File)
    }

    /// Create an empty directory named `name` in `parent`
    pub fn mkdir(&mut self, parent: NodeId, name: &str) -> FsResult<NodeId> {
        self.create_entry(parent, name, NodeType::Directory)
    }

    fn create_entry(&mut self, parent: NodeId, name: &str, kind: NodeType) -> FsResult<NodeId> {
        validate_name(name)?;
        let dir = self.node(parent)?;
        if !dir.is_dir() {
            return Err(FsError::NotADirectory);
        }
        if dir.state() != NodeState::Active {
            return Err(FsError::NotFound);
        }
        if self.find_child(parent, name).is_some() {
            return Err(FsError::AlreadyExists);
        }

        let id = self.allocate_node(kind, name);
        match self.add_child(parent, id)? {
            TreeChange::Applied => {
                debug!(parent = %parent, child = %id, name, ?kind, "created entry");
                Ok(id)
            }
            TreeChange::Ignored => {
                self.nodes.remove(&id);
                Err(FsError::InvalidArgument)
            }
        }
    }

    /// Resolve a single entry of `dir`
    pub fn lookup(&self, dir: NodeId, name: &str) -> FsResult<NodeId> {
        if !self.node(dir)?.is_dir() {
            return Err(FsError::NotADirectory);
        }
        self.find_child(dir, name).ok_or(FsError::NotFound)
    }

    /// Entries of `dir` in insertion order
    pub fn entries(&self, dir: NodeId) -> FsResult<Vec<(String, NodeId)>> {
        let node = self.node(dir)?;
        if !node.is_dir() {
            return Err(FsError::NotADirectory);
        }
        let children = node.children().unwrap_or_default();
        let mut out = Vec::with_capacity(children.len());
        for child in children {
            let entry = self.node(*child)?;
            out.push((entry.name().to_string(), *child));
        }
        Ok(out)
    }

    fn find_child(&self, dir: NodeId, name: &str) -> Option<NodeId> {
        let children = self.nodes.get(&dir)?.children()?;
        children
            .iter()
            .copied()
            .find(|c| self.nodes.get(c).is_some_and(|n| n.name() == name))
    }

    // Tree mutation

    /// Link `child` under `parent` and point the child back at it.
    ///
    /// Ignored when `parent` is not a directory, `child` already has a parent,
    /// or linking would create a cycle. Sibling names are not checked.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> FsResult<TreeChange> {
        let child_node = self.node(child)?;
        let child_linkable = child_node.parent().is_none()
            && child_node.state() == NodeState::Active
            && child != self.root;
        let parent_node = self.node(parent)?;
        let parent_open = parent_node.is_dir() && parent_node.state() == NodeState::Active;
        if !parent_open || !child_linkable || self.is_ancestor(child, parent) {
            trace!(parent = %parent, child = %child, "add_child ignored");
            return Ok(TreeChange::Ignored);
        }

        let now = self.clock.now();
        let parent_node = self.node_mut(parent)?;
        let change = parent_node.add_child(child);
        if change.applied() {
            parent_node.touch_modified(now);
            self.node_mut(child)?.set_parent(Some(parent));
            trace!(parent = %parent, child = %child, "linked child");
        }
        Ok(change)
    }

    /// Unlink the first occurrence of `child` from `parent` and clear the
    /// child's parent. Ignored when `parent` is not a directory or does not
    /// contain `child`.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> FsResult<TreeChange> {
        let now = self.clock.now();
        let parent_node = self.node_mut(parent)?;
        let change = parent_node.remove_child(child);
        if !change.applied() {
            trace!(parent = %parent, child = %child, "remove_child ignored");
            return Ok(change);
        }
        parent_node.touch_modified(now);

        if let Some(child_node) = self.nodes.get_mut(&child) {
            if child_node.parent() == Some(parent) {
                child_node.set_parent(None);
            }
        }
        trace!(parent = %parent, child = %child, "detached child");
        Ok(change)
    }

    // `true` when `ancestor` is `node` or lies on its parent chain
    fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut cursor = Some(node);
        while let Some(id) = cursor {
            if id == ancestor {
                return true;
            }
            cursor = self.nodes.get(&id).and_then(MemNode::parent);
        }
        false
    }

    // Handles

    /// Take a reference on `id`
    pub fn open(&mut self, id: NodeId) -> FsResult<u32> {
        let node = self.node_mut(id)?;
        let count = node.increment_use_count();
        trace!(node = %id, use_count = count, "opened");
        Ok(count)
    }

    /// Drop a reference on `id`; the last reference to a removed node
    /// destroys it
    pub fn close(&mut self, id: NodeId) -> FsResult<u32> {
        let count = self.node_mut(id)?.decrement_use_count().inspect_err(|_| {
            warn!(node = %id, "close without matching open");
        })?;
        trace!(node = %id, use_count = count, "closed");
        self.reap(id);
        Ok(count)
    }

    // Removal

    /// Remove a non-directory entry
    pub fn unlink(&mut self, id: NodeId) -> FsResult<()> {
        self.remove_with(id, MemNode::unlink)
    }

    /// Remove an empty directory
    pub fn rmdir(&mut self, id: NodeId) -> FsResult<()> {
        self.remove_with(id, MemNode::rmdir)
    }

    /// Remove a file or an empty directory
    pub fn remove(&mut self, id: NodeId) -> FsResult<()> {
        self.remove_with(id, MemNode::remove)
    }

    fn remove_with(&mut self, id: NodeId, op: fn(&mut MemNode) -> FsResult<()>) -> FsResult<()> {
        if id == self.root {
            return Err(FsError::InvalidArgument);
        }
        let node = self.node_mut(id)?;
        op(node)?;
        let parent = node.parent();

        if let Some(parent) = parent {
            self.remove_child(parent, id)?;
        }
        let now = self.clock.now();
        if let Some(node) = self.nodes.get_mut(&id) {
            node.touch_changed(now);
            if node.use_count() > 0 {
                debug!(
                    node = %id,
                    use_count = node.use_count(),
                    "removal deferred until last close"
                );
            }
        }
        self.reap(id);
        Ok(())
    }

    // Destroy `id` if it was removed and nothing references it
    fn reap(&mut self, id: NodeId) {
        let ready = self
            .nodes
            .get(&id)
            .is_some_and(|n| n.state() == NodeState::Unlinked && n.use_count() == 0);
        if !ready {
            return;
        }
        if let Some(mut node) = self.nodes.remove(&id) {
            let freed = node.capacity();
            node.release();
            debug!(node = %id, freed, "destroyed node");
        }
    }

    // Content

    /// Write `bytes` at `offset`, growing the buffer as needed
    pub fn write(&mut self, id: NodeId, offset: usize, bytes: &[u8]) -> FsResult<usize> {
        self.node(id)?;
        if !bytes.is_empty() {
            if let Some(err) = self.faults.should_fault(FaultOp::Write, bytes.len()) {
                warn!(node = %id, error = %err, "injected write fault");
                return Err(err);
            }
            let end = offset.checked_add(bytes.len()).ok_or(FsError::InvalidArgument)?;
            self.check_growth(id, end)?;
        }

        let now = self.clock.now();
        let policy = &self.config.buffer;
        let node = self.nodes.get_mut(&id).ok_or(FsError::NotFound)?;
        let written = node.write_at(offset, bytes, policy)?;
        if written > 0 {
            node.touch_modified(now);
        }
        Ok(written)
    }

    pub fn read(&self, id: NodeId, offset: usize, buf: &mut [u8]) -> FsResult<usize> {
        self.node(id)?.read_at(offset, buf)
    }

    /// Drop the content of `id`, keeping its allocation
    pub fn truncate(&mut self, id: NodeId) -> FsResult<()> {
        let now = self.clock.now();
        let node = self.node_mut(id)?;
        if node.is_dir() {
            return Err(FsError::IsADirectory);
        }
        node.truncate();
        node.touch_modified(now);
        Ok(())
    }

    /// Set the length of `id`, zero-filling on growth
    pub fn ftruncate(&mut self, id: NodeId, len: usize) -> FsResult<()> {
        self.check_growth(id, len)?;
        let now = self.clock.now();
        let policy = &self.config.buffer;
        let node = self.nodes.get_mut(&id).ok_or(FsError::NotFound)?;
        node.resize(len, policy)?;
        node.touch_modified(now);
        Ok(())
    }

    /// Reallocate the buffer of `id` to exactly `capacity` bytes
    pub fn realloc_data(&mut self, id: NodeId, capacity: usize) -> FsResult<()> {
        self.node(id)?;
        self.config.buffer.admit(capacity)?;
        if let Some(err) = self.faults.should_fault(FaultOp::Realloc, capacity) {
            warn!(node = %id, error = %err, "injected realloc fault");
            return Err(err);
        }
        self.node_mut(id)?.realloc_data(capacity)
    }

    // Consult the fault injector when `required` bytes do not fit
    fn check_growth(&self, id: NodeId, required: usize) -> FsResult<()> {
        let node = self.node(id)?;
        if required <= node.capacity() || node.is_dir() {
            return Ok(());
        }
        if let Some(err) = self.faults.should_fault(FaultOp::Realloc, required) {
            warn!(node = %id, error = %err, "injected realloc fault");
            return Err(err);
        }
        Ok(())
    }

    // Metadata

    pub fn stat(&self, id: NodeId) -> FsResult<StatData> {
        self.node(id)?.stat()
    }

    pub fn access(&self, id: NodeId, amode: AccessMode) -> FsResult<()> {
        self.node(id)?.access(amode)
    }

    pub fn chmod(&mut self, id: NodeId, mode: u32) -> FsResult<()> {
        let now = self.clock.now();
        let node = self.node_mut(id)?;
        node.chmod(mode);
        node.touch_changed(now);
        Ok(())
    }

    /// Set timestamps; `None` stamps the current time
    pub fn utime(&mut self, id: NodeId, times: Option<UtimBuf>) -> FsResult<()> {
        let now = self.clock.now();
        self.node_mut(id)?.utime(times.as_ref(), now);
        Ok(())
    }
}

fn validate_name(name: &str) -> FsResult<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') || name.contains('\0')
    {
        return Err(FsError::InvalidArgument);
    }
    Ok(())
}
