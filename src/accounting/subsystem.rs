//! accounting/subsystem — per-subsystem instrumentation.
//!
//! A [`PageAccounting`] value is the capability a lifecycle carries to report
//! into "its" counters. `LeakAccounting::bind(ctx, "segbmap")` returns an
//! instance whose updates land both in the `segbmap` set and in the global
//! set, so a leak shows up with its origin attached. `NoAccounting` has the
//! same shape and compiles down to nothing.
//!
//! Callers never pick a variant: they name [`DefaultAccounting`], which the
//! `leak-accounting` cargo feature resolves at build time.

use log::debug;
use std::fmt;
use std::sync::Arc;

use super::context::AccountingContext;
use super::counters::{Counter, LeakCounters, LeakSnapshot};
use crate::page::{LifecycleReport, LifecycleViolation};

pub trait PageAccounting: Clone + Send + Sync + fmt::Debug + 'static {
    /// Produce the instance bound to `subsystem` inside `ctx`.
    fn bind(ctx: &AccountingContext, subsystem: &str) -> Self
    where
        Self: Sized;

    fn subsystem(&self) -> &str;

    /// An object was acquired through this subsystem (global + own sets).
    fn acquired(&self, counter: Counter, object: u64, report: &mut LifecycleReport);

    /// An object acquired through this subsystem went back (global + own sets).
    fn released(&self, counter: Counter, object: u64, report: &mut LifecycleReport);

    /// Start attributing an object obtained elsewhere (own set only).
    fn attributed(&self, counter: Counter, object: u64, report: &mut LifecycleReport);

    /// Stop attributing an object to this subsystem (own set only).
    fn detached(&self, counter: Counter, object: u64, report: &mut LifecycleReport);

    /// Record a violation into `report` (and into the counters, if any).
    fn violation(&self, violation: LifecycleViolation, report: &mut LifecycleReport);

    /// Own counters, `None` for the pass-through variant.
    fn snapshot(&self) -> Option<LeakSnapshot>;
}

#[cfg(feature = "leak-accounting")]
pub type DefaultAccounting = LeakAccounting;

#[cfg(not(feature = "leak-accounting"))]
pub type DefaultAccounting = NoAccounting;

// ---------------- full accounting ----------------

#[derive(Clone)]
pub struct LeakAccounting {
    name: Arc<str>,
    own: Arc<LeakCounters>,
    global: Arc<LeakCounters>,
}

impl fmt::Debug for LeakAccounting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeakAccounting")
            .field("subsystem", &self.name)
            .field("own", &self.own.snapshot())
            .finish()
    }
}

impl LeakAccounting {
    pub fn global_snapshot(&self) -> LeakSnapshot {
        self.global.snapshot()
    }

    fn check_negative(
        &self,
        scope: &str,
        counter: Counter,
        value: i64,
        report: &mut LifecycleReport,
    ) {
        if value < 0 {
            self.violation(
                LifecycleViolation::NegativeCounter {
                    subsystem: scope.to_string(),
                    counter,
                    value,
                },
                report,
            );
        }
    }
}

impl PageAccounting for LeakAccounting {
    fn bind(ctx: &AccountingContext, subsystem: &str) -> Self {
        Self {
            name: Arc::from(subsystem),
            own: ctx.subsystem_counters(subsystem),
            global: ctx.global_counters().clone(),
        }
    }

    fn subsystem(&self) -> &str {
        &self.name
    }

    fn acquired(&self, counter: Counter, object: u64, report: &mut LifecycleReport) {
        // A lock taken while the gauge is already negative means an earlier
        // unlock had no matching lock.
        if counter == Counter::LockedPages {
            let before = self.global.get(counter);
            self.check_negative("global", counter, before, report);
        }
        let g = self.global.increment(counter);
        let s = self.own.increment(counter);
        debug!(
            "{}: object {:#x}, {} {} (global {})",
            self.name, object, counter, s, g
        );
    }

    fn released(&self, counter: Counter, object: u64, report: &mut LifecycleReport) {
        let g = self.global.decrement(counter);
        let s = self.own.decrement(counter);
        debug!(
            "{}: object {:#x}, {} {} (global {})",
            self.name, object, counter, s, g
        );
        self.check_negative("global", counter, g, report);
        let name = self.name.clone();
        self.check_negative(&name, counter, s, report);
    }

    fn attributed(&self, counter: Counter, object: u64, _report: &mut LifecycleReport) {
        let s = self.own.increment(counter);
        debug!("{}: object {:#x}, {} {}", self.name, object, counter, s);
    }

    fn detached(&self, counter: Counter, object: u64, report: &mut LifecycleReport) {
        let s = self.own.decrement(counter);
        debug!("{}: object {:#x}, {} {}", self.name, object, counter, s);
        let name = self.name.clone();
        self.check_negative(&name, counter, s, report);
    }

    fn violation(&self, violation: LifecycleViolation, report: &mut LifecycleReport) {
        self.own.record_violation();
        self.global.record_violation();
        report.push(violation);
    }

    fn snapshot(&self) -> Option<LeakSnapshot> {
        Some(self.own.snapshot())
    }
}

// ---------------- pass-through ----------------

#[derive(Clone, Debug)]
pub struct NoAccounting {
    name: Arc<str>,
}

impl PageAccounting for NoAccounting {
    fn bind(_ctx: &AccountingContext, subsystem: &str) -> Self {
        Self {
            name: Arc::from(subsystem),
        }
    }

    fn subsystem(&self) -> &str {
        &self.name
    }

    #[inline(always)]
    fn acquired(&self, _counter: Counter, _object: u64, _report: &mut LifecycleReport) {}

    #[inline(always)]
    fn released(&self, _counter: Counter, _object: u64, _report: &mut LifecycleReport) {}

    #[inline(always)]
    fn attributed(&self, _counter: Counter, _object: u64, _report: &mut LifecycleReport) {}

    #[inline(always)]
    fn detached(&self, _counter: Counter, _object: u64, _report: &mut LifecycleReport) {}

    #[inline(always)]
    fn violation(&self, violation: LifecycleViolation, report: &mut LifecycleReport) {
        report.push(violation);
    }

    fn snapshot(&self) -> Option<LeakSnapshot> {
        None
    }
}
