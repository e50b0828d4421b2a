//! page/report — lifecycle violations as data.
//!
//! Lifecycle operations never panic and never fail on a bookkeeping
//! inconsistency. They hand back a [`LifecycleReport`]; the boundary decides
//! what to do with it via [`LifecycleReport::settle`] and a [`ViolationPolicy`].

use log::warn;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::accounting::Counter;
use crate::error::{PageError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LifecycleViolation {
    #[error("page {page:#x}: reference count {count} after {op}, expected 0 or 1")]
    RefCountOutOfRange { page: u64, count: u32, op: &'static str },

    #[error("page {page:#x} freed while locked")]
    FreedWhileLocked { page: u64 },

    #[error("page {page:#x} unlocked but not locked")]
    NotLocked { page: u64 },

    #[error("page {page:#x} freed twice")]
    DoubleFree { page: u64 },

    #[error("page {page:#x} accessed after free")]
    UseAfterFree { page: u64 },

    #[error("{subsystem}: {counter} dropped to {value}")]
    NegativeCounter {
        subsystem: String,
        counter: Counter,
        value: i64,
    },

    #[error("page vector destroyed with {pages} pages still held")]
    LeakedOnDestroy { pages: usize },
}

/// What the boundary does with a non-clean report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationPolicy {
    /// Log, then fail with the first violation.
    Escalate,
    /// Log and carry on.
    LogAndContinue,
}

impl ViolationPolicy {
    /// Escalate in debug builds, log-and-continue in release builds.
    pub fn build_default() -> Self {
        if cfg!(debug_assertions) {
            ViolationPolicy::Escalate
        } else {
            ViolationPolicy::LogAndContinue
        }
    }
}

impl Default for ViolationPolicy {
    fn default() -> Self {
        Self::build_default()
    }
}

impl fmt::Display for ViolationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViolationPolicy::Escalate => f.write_str("escalate"),
            ViolationPolicy::LogAndContinue => f.write_str("log-and-continue"),
        }
    }
}

#[must_use = "a lifecycle report may carry violations; settle() or inspect it"]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LifecycleReport {
    violations: Vec<LifecycleViolation>,
}

impl LifecycleReport {
    pub fn clean() -> Self {
        Self::default()
    }

    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.violations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn violations(&self) -> &[LifecycleViolation] {
        &self.violations
    }

    pub fn into_violations(self) -> Vec<LifecycleViolation> {
        self.violations
    }

    pub fn push(&mut self, violation: LifecycleViolation) {
        self.violations.push(violation);
    }

    pub fn merge(&mut self, other: LifecycleReport) {
        self.violations.extend(other.violations);
    }

    pub fn contains(&self, pred: impl Fn(&LifecycleViolation) -> bool) -> bool {
        self.violations.iter().any(pred)
    }

    /// Log every violation; fail with the first one under `Escalate`.
    pub fn settle(self, policy: ViolationPolicy) -> Result<()> {
        for v in &self.violations {
            warn!("lifecycle: {}", v);
        }
        match (policy, self.violations.into_iter().next()) {
            (ViolationPolicy::Escalate, Some(first)) => Err(PageError::Lifecycle(first)),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settle_escalates_first_violation() {
        let mut r = LifecycleReport::clean();
        r.push(LifecycleViolation::NotLocked { page: 1 });
        r.push(LifecycleViolation::DoubleFree { page: 2 });
        let err = r.clone().settle(ViolationPolicy::Escalate).unwrap_err();
        assert!(matches!(
            err,
            PageError::Lifecycle(LifecycleViolation::NotLocked { page: 1 })
        ));
        r.settle(ViolationPolicy::LogAndContinue).unwrap();
    }

    #[test]
    fn clean_report_settles_under_any_policy() {
        LifecycleReport::clean()
            .settle(ViolationPolicy::Escalate)
            .unwrap();
        LifecycleReport::clean()
            .settle(ViolationPolicy::LogAndContinue)
            .unwrap();
    }

    #[test]
    fn merge_keeps_order() {
        let mut a = LifecycleReport::clean();
        a.push(LifecycleViolation::FreedWhileLocked { page: 3 });
        let mut b = LifecycleReport::clean();
        b.push(LifecycleViolation::LeakedOnDestroy { pages: 2 });
        a.merge(b);
        assert_eq!(a.len(), 2);
        assert_eq!(
            a.violations()[1],
            LifecycleViolation::LeakedOnDestroy { pages: 2 }
        );
        let msg = a.violations()[0].to_string();
        assert!(msg.contains("freed while locked"), "{msg}");
    }
}
