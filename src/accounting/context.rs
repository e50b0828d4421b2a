//! accounting/context — process-scoped accounting state.
//!
//! The context owns the global counter set and a registry that maps a
//! subsystem name to its own counter set. The registry hands out the same
//! `Arc<LeakCounters>` for the same name, so every lifecycle bound to
//! "btree" reports into one place no matter how many instances exist.
//!
//! Initialization point: [`AccountingContext::init`] (or the first call to
//! [`AccountingContext::global`]). Tests usually build a private context with
//! [`AccountingContext::new`] so parallel tests do not see each other's pages.

use log::{debug, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use super::counters::{LeakCounters, LeakSnapshot};

#[derive(Debug, Default)]
pub struct AccountingContext {
    global: Arc<LeakCounters>,
    subsystems: Mutex<BTreeMap<String, Arc<LeakCounters>>>,
}

/// Snapshot of the global set and every registered subsystem.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LeakReport {
    pub global: LeakSnapshot,
    pub subsystems: BTreeMap<String, LeakSnapshot>,
}

impl LeakReport {
    /// Subsystems with something outstanding (or a negative gauge).
    pub fn leaking(&self) -> Vec<(&str, &LeakSnapshot)> {
        self.subsystems
            .iter()
            .filter(|(_, s)| !s.is_balanced())
            .map(|(n, s)| (n.as_str(), s))
            .collect()
    }

    pub fn is_clean(&self) -> bool {
        self.global.is_balanced() && self.leaking().is_empty()
    }
}

static GLOBAL: OnceLock<AccountingContext> = OnceLock::new();

impl AccountingContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide context. Created on first use.
    pub fn global() -> &'static AccountingContext {
        GLOBAL.get_or_init(|| {
            debug!("accounting: global context initialized");
            AccountingContext::new()
        })
    }

    /// Explicit initialization point for hosts that want it at startup.
    pub fn init() -> &'static AccountingContext {
        Self::global()
    }

    pub fn global_counters(&self) -> &Arc<LeakCounters> {
        &self.global
    }

    /// Get or register the counter set of `name`.
    pub fn subsystem_counters(&self, name: &str) -> Arc<LeakCounters> {
        let mut reg = self
            .subsystems
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(c) = reg.get(name) {
            return c.clone();
        }
        debug!("accounting: register subsystem {}", name);
        let c = Arc::new(LeakCounters::new());
        reg.insert(name.to_string(), c.clone());
        c
    }

    /// Snapshot of an already registered subsystem.
    pub fn subsystem_snapshot(&self, name: &str) -> Option<LeakSnapshot> {
        let reg = self
            .subsystems
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        reg.get(name).map(|c| c.snapshot())
    }

    pub fn subsystem_names(&self) -> Vec<String> {
        let reg = self
            .subsystems
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        reg.keys().cloned().collect()
    }

    pub fn snapshot(&self) -> LeakReport {
        let reg = self
            .subsystems
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        LeakReport {
            global: self.global.snapshot(),
            subsystems: reg.iter().map(|(n, c)| (n.clone(), c.snapshot())).collect(),
        }
    }

    /// Log every unbalanced counter set at warn level. Returns true when clean.
    ///
    /// Meant for shutdown paths and leak tests; it never fails.
    pub fn check_leaks(&self) -> bool {
        let report = self.snapshot();
        if !report.global.is_balanced() {
            warn!(
                "leaks: global allocated_pages={} locked_pages={} memory_leaks={} cache_leaks={}",
                report.global.allocated_pages,
                report.global.locked_pages,
                report.global.memory_leaks,
                report.global.cache_leaks
            );
        }
        for (name, s) in report.leaking() {
            warn!(
                "leaks: subsystem {} allocated_pages={} locked_pages={} memory_leaks={} cache_leaks={}",
                name, s.allocated_pages, s.locked_pages, s.memory_leaks, s.cache_leaks
            );
        }
        report.is_clean()
    }

    /// Zero the global set and every registered subsystem.
    pub fn reset(&self) {
        self.global.reset();
        let reg = self
            .subsystems
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for c in reg.values() {
            c.reset();
        }
    }
}
