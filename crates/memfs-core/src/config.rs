// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Configuration for an in-memory mount

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{FsError, FsResult};
use crate::fault::FaultPolicy;

/// Top-level mount configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MemFsConfig {
    pub buffer: BufferPolicy,
    pub modes: ModeDefaults,
    pub fault: FaultPolicy,
}

impl MemFsConfig {
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Load a JSON configuration file
    pub fn load(path: &Path) -> FsResult<Self> {
        let bytes = std::fs::read(path)?;
        let config = Self::from_json_bytes(&bytes)?;
        config.buffer.validate()?;
        Ok(config)
    }
}

/// Growth policy for node data buffers
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferPolicy {
    /// Smallest capacity allocated once a node needs any storage
    pub initial_capacity: usize,
    /// Multiplier applied to the current capacity when growing
    pub growth_factor: usize,
    /// Hard per-node ceiling; `None` means unbounded
    pub max_node_bytes: Option<usize>,
}

impl Default for BufferPolicy {
    fn default() -> Self {
        Self {
            initial_capacity: 0,
            growth_factor: 2,
            max_node_bytes: None,
        }
    }
}

impl BufferPolicy {
    pub fn validate(&self) -> FsResult<()> {
        if self.growth_factor == 0 {
            return Err(FsError::InvalidArgument);
        }
        if let Some(max) = self.max_node_bytes {
            if self.initial_capacity > max {
                return Err(FsError::InvalidArgument);
            }
        }
        Ok(())
    }

    /// Check that a node may hold `bytes` bytes
    pub fn admit(&self, bytes: usize) -> FsResult<()> {
        match self.max_node_bytes {
            Some(max) if bytes > max => Err(FsError::AllocationFailure { requested: bytes }),
            _ => Ok(()),
        }
    }

    /// Capacity to allocate so that at least `required` bytes fit.
    ///
    /// Never smaller than `required`, grows geometrically from `current` and
    /// is clamped to `max_node_bytes`.
    pub fn grown_capacity(&self, current: usize, required: usize) -> FsResult<usize> {
        self.admit(required)?;
        let geometric = current.saturating_mul(self.growth_factor.max(1));
        let target = required.max(self.initial_capacity).max(geometric);
        Ok(match self.max_node_bytes {
            Some(max) => target.min(max),
            None => target,
        })
    }
}

/// Permission bits given to newly created nodes
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModeDefaults {
    pub file_mode: u32,
    pub dir_mode: u32,
}

impl Default for ModeDefaults {
    fn default() -> Self {
        Self {
            file_mode: 0o644,
            dir_mode: 0o755,
        }
    }
}
