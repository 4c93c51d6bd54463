// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for the in-memory node layer

use std::io;

/// Node and mount error type
#[derive(thiserror::Error, Debug)]
pub enum FsError {
    #[error("not a directory")]
    NotADirectory,
    #[error("directory not empty")]
    DirectoryNotEmpty,
    #[error("is a directory")]
    IsADirectory,
    #[error("permission denied")]
    PermissionDenied,
    #[error("cannot allocate {requested} bytes")]
    AllocationFailure { requested: usize },
    #[error("not found")]
    NotFound,
    #[error("already exists")]
    AlreadyExists,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("use count decremented below zero")]
    UseCountUnderflow,
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl FsError {
    /// POSIX errno a syscall layer should report for this error
    pub fn errno(&self) -> i32 {
        match self {
            FsError::NotADirectory => libc::ENOTDIR,
            FsError::DirectoryNotEmpty => libc::ENOTEMPTY,
            FsError::IsADirectory => libc::EISDIR,
            FsError::PermissionDenied => libc::EACCES,
            FsError::AllocationFailure { .. } => libc::ENOMEM,
            FsError::NotFound => libc::ENOENT,
            FsError::AlreadyExists => libc::EEXIST,
            FsError::InvalidArgument | FsError::UseCountUnderflow | FsError::Config(_) => {
                libc::EINVAL
            }
            FsError::Io(err) => err.raw_os_error().unwrap_or(libc::EIO),
        }
    }
}

pub type FsResult<T> = Result<T, FsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tree_errors_map_to_posix_codes() {
        assert_eq!(FsError::NotADirectory.errno(), libc::ENOTDIR);
        assert_eq!(FsError::DirectoryNotEmpty.errno(), libc::ENOTEMPTY);
        assert_eq!(FsError::IsADirectory.errno(), libc::EISDIR);
        assert_eq!(FsError::PermissionDenied.errno(), libc::EACCES);
        assert_eq!(FsError::AllocationFailure { requested: 1 }.errno(), libc::ENOMEM);
    }

    #[test]
    fn io_errors_keep_their_os_code() {
        let err = FsError::from(io::Error::from_raw_os_error(libc::ENOSPC));
        assert_eq!(err.errno(), libc::ENOSPC);

        let err = FsError::from(io::Error::new(io::ErrorKind::Other, "synthetic"));
        assert_eq!(err.errno(), libc::EIO);
    }
}
