// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! In-memory POSIX-like filesystem nodes.
//!
//! [`MemNode`] is one file or directory: metadata, a growable data buffer, a
//! child list and a use count. [`MemMount`] owns the nodes of a tree and is the
//! surface a path resolver or syscall layer drives.

pub mod config;
pub mod error;
pub mod fault;
pub mod mount;
pub mod node;
pub mod types;

#[cfg(test)]
mod test_lifecycle;

pub use config::{BufferPolicy, MemFsConfig, ModeDefaults};
pub use error::{FsError, FsResult};
pub use fault::{FaultErrno, FaultInjector, FaultOp, FaultPolicy, FaultRule};
pub use mount::MemMount;
pub use node::MemNode;
pub use types::{
    AccessMode, Clock, FileTimes, MountId, MountStats, NodeId, NodeState, NodeType, StatData,
    SystemClock, TreeChange, UtimBuf,
};
