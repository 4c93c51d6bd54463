// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Core type definitions for the in-memory node layer

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Arena handle identifying a node within its mount
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl NodeId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identity of the mount a node belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MountId(pub u64);

impl MountId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

/// File type of a node
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum NodeType {
    #[default]
    File,
    Directory,
}

impl NodeType {
    /// `S_IFMT` bits for this type
    pub fn type_bits(self) -> u32 {
        match self {
            NodeType::File => libc::S_IFREG as u32,
            NodeType::Directory => libc::S_IFDIR as u32,
        }
    }
}

/// Lifecycle of a node.
///
/// `Active` nodes may or may not be linked into a directory. A node becomes
/// `Unlinked` once `unlink`, `rmdir` or `remove` accepted it; its content stays
/// readable through open handles until the last one is released, at which
/// point the mount destroys it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum NodeState {
    #[default]
    Active,
    Unlinked,
    Destroyed,
}

/// Node timestamps, seconds since the epoch
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FileTimes {
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
}

impl FileTimes {
    pub fn at(now: i64) -> Self {
        Self {
            atime: now,
            mtime: now,
            ctime: now,
        }
    }
}

/// stat(2)-compatible attributes
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatData {
    pub st_ino: u64,
    pub st_mode: u32,
    pub st_nlink: u32,
    pub st_size: u64,
    pub st_blksize: u32,
    pub st_blocks: u64,
    pub st_atime: i64,
    pub st_mtime: i64,
    pub st_ctime: i64,
}

impl StatData {
    pub fn is_dir(&self) -> bool {
        self.st_mode & libc::S_IFMT as u32 == libc::S_IFDIR as u32
    }

    pub fn is_file(&self) -> bool {
        self.st_mode & libc::S_IFMT as u32 == libc::S_IFREG as u32
    }

    pub fn permissions(&self) -> u32 {
        self.st_mode & 0o7777
    }
}

/// utimbuf-compatible timestamp update
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UtimBuf {
    pub actime: i64,
    pub modtime: i64,
}

/// access(2) mode: `F_OK` or any combination of `R_OK`, `W_OK`, `X_OK`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccessMode(i32);

impl AccessMode {
    pub const EXISTS: AccessMode = AccessMode(libc::F_OK);
    pub const READ: AccessMode = AccessMode(libc::R_OK);
    pub const WRITE: AccessMode = AccessMode(libc::W_OK);
    pub const EXEC: AccessMode = AccessMode(libc::X_OK);

    /// Build from raw `amode` bits; unknown bits are rejected
    pub fn from_bits(bits: i32) -> Option<Self> {
        let known = libc::R_OK | libc::W_OK | libc::X_OK;
        if bits & !known != 0 {
            None
        } else {
            Some(Self(bits))
        }
    }

    pub fn bits(self) -> i32 {
        self.0
    }

    pub fn contains(self, other: AccessMode) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for AccessMode {
    type Output = AccessMode;

    fn bitor(self, rhs: AccessMode) -> AccessMode {
        AccessMode(self.0 | rhs.0)
    }
}

/// Outcome of a tree mutation that is silently skipped on type mismatch
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TreeChange {
    Applied,
    Ignored,
}

impl TreeChange {
    pub fn applied(self) -> bool {
        self == TreeChange::Applied
    }
}

/// Mount-wide counters
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MountStats {
    pub nodes: usize,
    pub unlinked: usize,
    pub open_handles: u64,
    pub bytes_in_memory: u64,
}

/// Time source used by the mount to stamp nodes
#[cfg_attr(test, mockall::automock)]
pub trait Clock: Send + Sync {
    /// Seconds since the epoch
    fn now(&self) -> i64;
}

/// Wall clock
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_mode_rejects_unknown_bits() {
        assert!(AccessMode::from_bits(0o100).is_none());
        let rw = AccessMode::from_bits(libc::R_OK | libc::W_OK).unwrap();
        assert!(rw.contains(AccessMode::READ));
        assert!(rw.contains(AccessMode::WRITE));
        assert!(!rw.contains(AccessMode::EXEC));
        assert_eq!(rw, AccessMode::READ | AccessMode::WRITE);
    }

    #[test]
    fn stat_data_reports_type() {
        let stat = StatData {
            st_mode: NodeType::Directory.type_bits() | 0o755,
            ..StatData::default()
        };
        assert!(stat.is_dir());
        assert!(!stat.is_file());
        assert_eq!(stat.permissions(), 0o755);
    }
}
