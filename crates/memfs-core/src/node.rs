// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! A single file or directory of the in-memory tree.
//!
//! A [`MemNode`] owns its name, POSIX metadata, data buffer, child list and
//! use count. Parent and mount are non-owning ids; the [`MemMount`] arena owns
//! every node and keeps both sides of a parent/child link in step.
//!
//! [`MemMount`]: crate::MemMount

use crate::config::BufferPolicy;
use crate::error::{FsError, FsResult};
use crate::types::{
    AccessMode, FileTimes, MountId, NodeId, NodeState, NodeType, StatData, TreeChange, UtimBuf,
};

const BLOCK_SIZE: u32 = 4096;

#[derive(Clone, Debug)]
pub struct MemNode {
    id: NodeId,
    name: String,
    kind: NodeType,
    parent: Option<NodeId>,
    mount: Option<MountId>,
    children: Vec<NodeId>,
    // Zero-filled allocation; its length is the node's capacity.
    data: Vec<u8>,
    len: usize,
    mode: u32,
    times: FileTimes,
    use_count: u32,
    state: NodeState,
}

impl Default for MemNode {
    fn default() -> Self {
        Self {
            id: NodeId(0),
            name: String::new(),
            kind: NodeType::File,
            parent: None,
            mount: None,
            children: Vec::new(),
            data: Vec::new(),
            len: 0,
            mode: 0,
            times: FileTimes::default(),
            use_count: 0,
            state: NodeState::Active,
        }
    }
}

impl MemNode {
    pub fn new(id: NodeId, kind: NodeType, name: impl Into<String>, mode: u32, now: i64) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            mode: mode & 0o7777,
            times: FileTimes::at(now),
            ..Self::default()
        }
    }

    pub fn file(id: NodeId, name: impl Into<String>, mode: u32, now: i64) -> Self {
        Self::new(id, NodeType::File, name, mode, now)
    }

    pub fn directory(id: NodeId, name: impl Into<String>, mode: u32, now: i64) -> Self {
        Self::new(id, NodeType::Directory, name, mode, now)
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Entry name within the parent directory, not a path
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn node_type(&self) -> NodeType {
        self.kind
    }

    pub fn is_dir(&self) -> bool {
        self.kind == NodeType::Directory
    }

    /// Parent directory, `None` for the root or a detached node
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn set_parent(&mut self, parent: Option<NodeId>) {
        self.parent = parent;
    }

    pub fn mount(&self) -> Option<MountId> {
        self.mount
    }

    pub fn set_mount(&mut self, mount: Option<MountId>) {
        self.mount = mount;
    }

    pub fn mode(&self) -> u32 {
        self.mode
    }

    pub fn times(&self) -> FileTimes {
        self.times
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    /// Live children of a directory; `None` for files and empty directories
    pub fn children(&self) -> Option<&[NodeId]> {
        if self.children.is_empty() {
            None
        } else {
            Some(&self.children)
        }
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// Append `child` to the child list. Only the list is touched; the mount
    /// sets the child's parent.
    pub(crate) fn add_child(&mut self, child: NodeId) -> TreeChange {
        if !self.is_dir() || child == self.id {
            return TreeChange::Ignored;
        }
        self.children.push(child);
        TreeChange::Applied
    }

    /// Drop the first occurrence of `child` from the child list.
    pub(crate) fn remove_child(&mut self, child: NodeId) -> TreeChange {
        if !self.is_dir() {
            return TreeChange::Ignored;
        }
        match self.children.iter().position(|c| *c == child) {
            Some(idx) => {
                self.children.remove(idx);
                TreeChange::Applied
            }
            None => TreeChange::Ignored,
        }
    }

    // Buffer management

    /// Allocated bytes
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Valid bytes
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Valid content, `len` bytes
    pub fn data(&self) -> &[u8] {
        &self.data[..self.len]
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data[..self.len]
    }

    /// Resize the allocation to exactly `new_capacity` bytes.
    ///
    /// Content up to `min(len, new_capacity)` is preserved and new bytes are
    /// zero. Shrinking below `len` shortens `len`. On allocation failure the
    /// node is left untouched.
    pub fn realloc_data(&mut self, new_capacity: usize) -> FsResult<()> {
        let old = self.data.len();
        if new_capacity > old {
            self.data
                .try_reserve_exact(new_capacity - old)
                .map_err(|_| FsError::AllocationFailure {
                    requested: new_capacity,
                })?;
            self.data.resize(new_capacity, 0);
        } else {
            self.data.truncate(new_capacity);
            self.data.shrink_to_fit();
        }
        self.len = self.len.min(new_capacity);
        Ok(())
    }

    /// Grow per `policy` until at least `required` bytes fit
    pub fn reserve(&mut self, required: usize, policy: &BufferPolicy) -> FsResult<()> {
        if required <= self.capacity() {
            return Ok(());
        }
        let target = policy.grown_capacity(self.capacity(), required)?;
        self.realloc_data(target)
    }

    /// Set the logical length. A length beyond capacity reallocates to exactly
    /// `len` bytes first; within capacity the existing buffer bytes are exposed
    /// as they are.
    pub fn set_len(&mut self, len: usize) -> FsResult<()> {
        if len > self.capacity() {
            self.realloc_data(len)?;
        }
        self.len = len;
        Ok(())
    }

    /// Drop all content, keeping the allocation for reuse
    pub fn truncate(&mut self) {
        self.len = 0;
    }

    /// ftruncate-style length change: growth exposes zero bytes
    pub fn resize(&mut self, len: usize, policy: &BufferPolicy) -> FsResult<()> {
        self.require_file()?;
        if len > self.len {
            self.reserve(len, policy)?;
            self.data[self.len..len].fill(0);
        }
        self.len = len;
        Ok(())
    }

    /// Write `bytes` at `offset`, growing per `policy`. A gap between the old
    /// end and `offset` reads back as zeros. An empty write changes nothing.
    pub fn write_at(
        &mut self,
        offset: usize,
        bytes: &[u8],
        policy: &BufferPolicy,
    ) -> FsResult<usize> {
        self.require_file()?;
        if bytes.is_empty() {
            return Ok(0);
        }
        let end = offset.checked_add(bytes.len()).ok_or(FsError::InvalidArgument)?;
        self.reserve(end, policy)?;
        if offset > self.len {
            self.data[self.len..offset].fill(0);
        }
        self.data[offset..end].copy_from_slice(bytes);
        self.len = self.len.max(end);
        Ok(bytes.len())
    }

    /// Copy valid content starting at `offset` into `buf`
    pub fn read_at(&self, offset: usize, buf: &mut [u8]) -> FsResult<usize> {
        self.require_file()?;
        if offset >= self.len {
            return Ok(0);
        }
        let end = self.len.min(offset.saturating_add(buf.len()));
        let count = end - offset;
        buf[..count].copy_from_slice(&self.data[offset..end]);
        Ok(count)
    }

    fn require_file(&self) -> FsResult<()> {
        if self.is_dir() {
            Err(FsError::IsADirectory)
        } else {
            Ok(())
        }
    }

    // POSIX operations

    pub fn nlink(&self) -> u32 {
        match self.kind {
            NodeType::File => 1,
            NodeType::Directory => 2 + self.children.len() as u32,
        }
    }

    /// Attributes without liveness checks
    pub fn raw_stat(&self) -> StatData {
        let size = self.len as u64;
        StatData {
            st_ino: self.id.as_u64(),
            st_mode: self.kind.type_bits() | self.mode,
            st_nlink: self.nlink(),
            st_size: size,
            st_blksize: BLOCK_SIZE,
            st_blocks: size.div_ceil(512),
            st_atime: self.times.atime,
            st_mtime: self.times.mtime,
            st_ctime: self.times.ctime,
        }
    }

    pub fn stat(&self) -> FsResult<StatData> {
        if self.state == NodeState::Destroyed {
            return Err(FsError::NotFound);
        }
        Ok(self.raw_stat())
    }

    /// Check `amode` against the owner permission bits. There are no
    /// credentials at this layer, so the owner class always applies.
    pub fn access(&self, amode: AccessMode) -> FsResult<()> {
        if self.state == NodeState::Destroyed {
            return Err(FsError::NotFound);
        }
        let checks = [
            (AccessMode::READ, libc::S_IRUSR as u32),
            (AccessMode::WRITE, libc::S_IWUSR as u32),
            (AccessMode::EXEC, libc::S_IXUSR as u32),
        ];
        for (want, bit) in checks {
            if amode.contains(want) && self.mode & bit == 0 {
                return Err(FsError::PermissionDenied);
            }
        }
        Ok(())
    }

    /// Replace the permission bits; type bits in `mode` are ignored
    pub fn chmod(&mut self, mode: u32) {
        self.mode = mode & 0o7777;
    }

    /// Set atime/mtime from `times`, or both to `now` when `times` is `None`
    pub fn utime(&mut self, times: Option<&UtimBuf>, now: i64) {
        match times {
            Some(t) => {
                self.times.atime = t.actime;
                self.times.mtime = t.modtime;
            }
            None => {
                self.times.atime = now;
                self.times.mtime = now;
            }
        }
        self.times.ctime = now;
    }

    pub(crate) fn touch_modified(&mut self, now: i64) {
        self.times.mtime = now;
        self.times.ctime = now;
    }

    pub(crate) fn touch_changed(&mut self, now: i64) {
        self.times.ctime = now;
    }

    /// Accept removal of a non-directory. Detaching from the parent is the
    /// caller's job.
    pub fn unlink(&mut self) -> FsResult<()> {
        self.require_active()?;
        if self.is_dir() {
            return Err(FsError::IsADirectory);
        }
        self.state = NodeState::Unlinked;
        Ok(())
    }

    /// Accept removal of an empty directory
    pub fn rmdir(&mut self) -> FsResult<()> {
        self.require_active()?;
        if !self.is_dir() {
            return Err(FsError::NotADirectory);
        }
        if !self.children.is_empty() {
            return Err(FsError::DirectoryNotEmpty);
        }
        self.state = NodeState::Unlinked;
        Ok(())
    }

    /// `unlink` or `rmdir` depending on the node type
    pub fn remove(&mut self) -> FsResult<()> {
        match self.kind {
            NodeType::File => self.unlink(),
            NodeType::Directory => self.rmdir(),
        }
    }

    fn require_active(&self) -> FsResult<()> {
        match self.state {
            NodeState::Active => Ok(()),
            NodeState::Unlinked | NodeState::Destroyed => Err(FsError::NotFound),
        }
    }

    /// Free the buffer and child list; terminal
    pub(crate) fn release(&mut self) {
        self.data = Vec::new();
        self.len = 0;
        self.children = Vec::new();
        self.parent = None;
        self.state = NodeState::Destroyed;
    }

    // Reference counting

    pub fn use_count(&self) -> u32 {
        self.use_count
    }

    pub fn increment_use_count(&mut self) -> u32 {
        self.use_count += 1;
        self.use_count
    }

    /// Drop one reference. Without a matching increment the count stays at
    /// zero and `UseCountUnderflow` is returned.
    pub fn decrement_use_count(&mut self) -> FsResult<u32> {
        self.use_count = self.use_count.checked_sub(1).ok_or(FsError::UseCountUnderflow)?;
        Ok(self.use_count)
    }
}
