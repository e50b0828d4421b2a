//! accounting/counters — atomic leak counters.
//!
//! One `LeakCounters` set exists for the whole process (owned by the
//! [`AccountingContext`](super::AccountingContext)) plus one per named subsystem.
//! Values are signed on purpose: a negative value means more releases than
//! acquisitions were recorded, which is a lifecycle bug and is reported as such.
//! Updates use relaxed atomics; the counters never order access to page bytes.

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Which gauge of a counter set an update applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Counter {
    AllocatedPages,
    LockedPages,
    MemoryLeaks,
    CacheLeaks,
}

impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Counter::AllocatedPages => "allocated_pages",
            Counter::LockedPages => "locked_pages",
            Counter::MemoryLeaks => "memory_leaks",
            Counter::CacheLeaks => "cache_leaks",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Default)]
pub struct LeakCounters {
    allocated_pages: AtomicI64,
    locked_pages: AtomicI64,
    memory_leaks: AtomicI64,
    cache_leaks: AtomicI64,
    violations: AtomicU64,
}

/// Point-in-time copy of a counter set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LeakSnapshot {
    pub allocated_pages: i64,
    pub locked_pages: i64,
    pub memory_leaks: i64,
    pub cache_leaks: i64,
    pub violations: u64,
}

impl LeakSnapshot {
    /// Nothing outstanding and no gauge below zero.
    pub fn is_balanced(&self) -> bool {
        self.allocated_pages == 0
            && self.locked_pages == 0
            && self.memory_leaks == 0
            && self.cache_leaks == 0
    }

    /// Difference against an earlier snapshot (self - base).
    pub fn since(&self, base: &LeakSnapshot) -> LeakSnapshot {
        LeakSnapshot {
            allocated_pages: self.allocated_pages - base.allocated_pages,
            locked_pages: self.locked_pages - base.locked_pages,
            memory_leaks: self.memory_leaks - base.memory_leaks,
            cache_leaks: self.cache_leaks - base.cache_leaks,
            violations: self.violations.saturating_sub(base.violations),
        }
    }

    pub fn get(&self, counter: Counter) -> i64 {
        match counter {
            Counter::AllocatedPages => self.allocated_pages,
            Counter::LockedPages => self.locked_pages,
            Counter::MemoryLeaks => self.memory_leaks,
            Counter::CacheLeaks => self.cache_leaks,
        }
    }
}

impl LeakCounters {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    fn slot(&self, counter: Counter) -> &AtomicI64 {
        match counter {
            Counter::AllocatedPages => &self.allocated_pages,
            Counter::LockedPages => &self.locked_pages,
            Counter::MemoryLeaks => &self.memory_leaks,
            Counter::CacheLeaks => &self.cache_leaks,
        }
    }

    /// Add one; returns the new value.
    #[inline]
    pub fn increment(&self, counter: Counter) -> i64 {
        self.slot(counter).fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Subtract one; returns the new value, which may be negative.
    #[inline]
    pub fn decrement(&self, counter: Counter) -> i64 {
        self.slot(counter).fetch_sub(1, Ordering::Relaxed) - 1
    }

    #[inline]
    pub fn get(&self, counter: Counter) -> i64 {
        self.slot(counter).load(Ordering::Relaxed)
    }

    #[inline]
    pub fn record_violation(&self) {
        self.violations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn violations(&self) -> u64 {
        self.violations.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> LeakSnapshot {
        LeakSnapshot {
            allocated_pages: self.allocated_pages.load(Ordering::Relaxed),
            locked_pages: self.locked_pages.load(Ordering::Relaxed),
            memory_leaks: self.memory_leaks.load(Ordering::Relaxed),
            cache_leaks: self.cache_leaks.load(Ordering::Relaxed),
            violations: self.violations.load(Ordering::Relaxed),
        }
    }

    /// Zero every gauge. Meant for test harnesses between scenarios.
    pub fn reset(&self) {
        self.allocated_pages.store(0, Ordering::Relaxed);
        self.locked_pages.store(0, Ordering::Relaxed);
        self.memory_leaks.store(0, Ordering::Relaxed);
        self.cache_leaks.store(0, Ordering::Relaxed);
        self.violations.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn increment_decrement_can_go_negative() {
        let c = LeakCounters::new();
        assert_eq!(c.increment(Counter::LockedPages), 1);
        assert_eq!(c.decrement(Counter::LockedPages), 0);
        assert_eq!(c.decrement(Counter::LockedPages), -1);
        assert!(!c.snapshot().is_balanced());
        c.reset();
        assert!(c.snapshot().is_balanced());
    }

    #[test]
    fn concurrent_updates_are_not_lost() {
        let c = Arc::new(LeakCounters::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let c = c.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..10_000 {
                    c.increment(Counter::AllocatedPages);
                }
                for _ in 0..9_000 {
                    c.decrement(Counter::AllocatedPages);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(c.get(Counter::AllocatedPages), 8 * 1_000);
    }

    #[test]
    fn snapshot_delta() {
        let c = LeakCounters::new();
        c.increment(Counter::MemoryLeaks);
        let base = c.snapshot();
        c.increment(Counter::MemoryLeaks);
        c.increment(Counter::CacheLeaks);
        c.record_violation();
        let d = c.snapshot().since(&base);
        assert_eq!(d.memory_leaks, 1);
        assert_eq!(d.cache_leaks, 1);
        assert_eq!(d.violations, 1);
        assert_eq!(d.get(Counter::AllocatedPages), 0);
    }
}
