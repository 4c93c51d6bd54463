// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Fault injection policy + runtime controller for node buffer operations

use crate::FsError;
use serde::{Deserialize, Serialize};
use std::io;
use std::sync::Mutex;

/// Buffer operations that can be made to fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultOp {
    Realloc,
    Write,
}

/// Synthetic failure kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultErrno {
    Enomem,
    Eio,
}

impl FaultErrno {
    fn to_error(self, requested: usize) -> FsError {
        match self {
            FaultErrno::Enomem => FsError::AllocationFailure { requested },
            FaultErrno::Eio => FsError::Io(io::Error::from_raw_os_error(libc::EIO)),
        }
    }
}

/// Which op should fail, starting when, and how many times.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FaultRule {
    pub op: FaultOp,
    pub errno: FaultErrno,
    /// Leading invocations to let through before injecting.
    #[serde(default)]
    pub start_after: u64,
    #[serde(default)]
    pub max_faults: Option<u64>,
}

impl Default for FaultRule {
    fn default() -> Self {
        Self {
            op: FaultOp::Realloc,
            errno: FaultErrno::Enomem,
            start_after: 0,
            max_faults: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
pub struct FaultPolicy {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub rules: Vec<FaultRule>,
}

impl FaultPolicy {
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn summary(&self) -> FaultPolicySummary {
        FaultPolicySummary {
            enabled: self.enabled,
            active: self.enabled && !self.rules.is_empty(),
            rule_count: self.rules.len(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FaultPolicySummary {
    pub enabled: bool,
    pub active: bool,
    pub rule_count: usize,
}

#[derive(Clone, Debug, Default)]
struct RuleCounters {
    hits: u64,
    invocations: u64,
}

#[derive(Clone, Debug, Default)]
struct FaultState {
    policy: FaultPolicy,
    counters: Vec<RuleCounters>,
}

/// Tracks the active policy and per-rule hit counts.
pub struct FaultInjector {
    state: Mutex<FaultState>,
}

impl Default for FaultInjector {
    fn default() -> Self {
        Self::new()
    }
}

impl FaultInjector {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FaultState::default()),
        }
    }

    pub fn with_policy(policy: FaultPolicy) -> Self {
        let injector = Self::new();
        injector.set_policy(policy);
        injector
    }

    pub fn snapshot(&self) -> FaultPolicy {
        self.state.lock().unwrap().policy.clone()
    }

    pub fn summary(&self) -> FaultPolicySummary {
        self.snapshot().summary()
    }

    pub fn set_policy(&self, policy: FaultPolicy) {
        let mut guard = self.state.lock().unwrap();
        guard.counters = vec![RuleCounters::default(); policy.rules.len()];
        guard.policy = policy;
    }

    pub fn clear(&self) {
        self.set_policy(FaultPolicy::default());
    }

    /// Error to inject for an `op` touching `requested` bytes, if any rule fires
    pub fn should_fault(&self, op: FaultOp, requested: usize) -> Option<FsError> {
        let mut guard = self.state.lock().unwrap();
        if !guard.policy.enabled {
            return None;
        }
        let rules_len = guard.policy.rules.len();
        if guard.counters.len() < rules_len {
            guard.counters.resize(rules_len, RuleCounters::default());
        }
        for idx in 0..rules_len {
            let rule = guard.policy.rules[idx].clone();
            if rule.op != op {
                continue;
            }
            let counters =
                guard.counters.get_mut(idx).unwrap_or_else(|| unreachable!("counters aligned"));
            counters.invocations = counters.invocations.saturating_add(1);
            if counters.invocations <= rule.start_after {
                continue;
            }
            if let Some(max) = rule.max_faults {
                if counters.hits >= max {
                    continue;
                }
            }
            counters.hits = counters.hits.saturating_add(1);
            return Some(rule.errno.to_error(requested));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fault_policy_json() {
        let json = br#"{ "enabled": true, "rules": [ { "op": "realloc", "errno": "enomem", "max_faults": 2 } ] }"#;
        let policy = FaultPolicy::from_json_bytes(json).expect("policy");
        assert!(policy.enabled);
        assert_eq!(policy.rules.len(), 1);
        assert_eq!(policy.rules[0].op, FaultOp::Realloc);
        assert_eq!(policy.rules[0].max_faults, Some(2));
        assert_eq!(policy.summary().rule_count, 1);
        assert!(policy.summary().active);
    }

    #[test]
    fn injector_respects_start_and_max_hits() {
        let injector = FaultInjector::with_policy(FaultPolicy {
            enabled: true,
            rules: vec![FaultRule {
                op: FaultOp::Write,
                errno: FaultErrno::Eio,
                start_after: 1,
                max_faults: Some(2),
            }],
        });

        // First call skipped due to start_after
        assert!(injector.should_fault(FaultOp::Write, 8).is_none());
        assert!(injector.should_fault(FaultOp::Write, 8).is_some());
        assert!(injector.should_fault(FaultOp::Write, 8).is_some());
        // Max hits reached
        assert!(injector.should_fault(FaultOp::Write, 8).is_none());
    }

    #[test]
    fn enomem_becomes_allocation_failure() {
        let injector = FaultInjector::with_policy(FaultPolicy {
            enabled: true,
            rules: vec![FaultRule::default()],
        });
        assert!(injector.should_fault(FaultOp::Write, 16).is_none());
        assert!(matches!(
            injector.should_fault(FaultOp::Realloc, 16),
            Some(FsError::AllocationFailure { requested: 16 })
        ));

        injector.clear();
        assert!(injector.should_fault(FaultOp::Realloc, 16).is_none());
        assert!(!injector.summary().enabled);
    }
}
