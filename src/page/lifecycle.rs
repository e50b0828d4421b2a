//! page/lifecycle — instrumented page operations bound to one subsystem.
//!
//! `PageLifecycle<A>` is generic over the accounting capability. One instance
//! per subsystem; instances bound to the same name share counters through the
//! [`AccountingContext`] registry. With `A = NoAccounting` every accounting
//! call is an empty inline function and the lifecycle reduces to refcount,
//! lock bit and storage handling.
//!
//! Violations never abort an operation. Operations whose outcome is only
//! bookkeeping return a [`LifecycleReport`]; `settle()` applies the configured
//! [`ViolationPolicy`].

use log::{debug, error, warn};
use std::sync::Arc;
use std::time::Duration;

use super::alloc::{AllocFlags, HeapPageAllocator, RawPageAllocator};
use super::frame::Page;
use super::report::{LifecycleReport, LifecycleViolation, ViolationPolicy};
use crate::accounting::{AccountingContext, Counter, DefaultAccounting, PageAccounting};
use crate::config::FlashConfig;
use crate::consts::WAITED_TOO_LONG_MSECS;
use crate::error::{PageError, Result};

pub struct PageLifecycle<A: PageAccounting = DefaultAccounting> {
    allocator: Arc<dyn RawPageAllocator>,
    accounting: A,
    wait_warn: Duration,
    policy: ViolationPolicy,
}

impl<A: PageAccounting> PageLifecycle<A> {
    pub fn new(allocator: Arc<dyn RawPageAllocator>, accounting: A) -> Self {
        Self {
            allocator,
            accounting,
            wait_warn: Duration::from_millis(WAITED_TOO_LONG_MSECS),
            policy: ViolationPolicy::build_default(),
        }
    }

    /// Lifecycle for `subsystem`, reporting into `ctx`.
    pub fn bind(
        ctx: &AccountingContext,
        subsystem: &str,
        allocator: Arc<dyn RawPageAllocator>,
    ) -> Self {
        Self::new(allocator, A::bind(ctx, subsystem))
    }

    /// Heap-backed lifecycle built from `cfg`.
    pub fn from_config(cfg: &FlashConfig, ctx: &AccountingContext, subsystem: &str) -> Result<Self> {
        let allocator = Arc::new(HeapPageAllocator::from_config(cfg)?);
        Ok(Self::bind(ctx, subsystem, allocator)
            .with_wait_warn(cfg.wait_warn())
            .with_policy(cfg.violation_policy))
    }

    pub fn with_policy(mut self, policy: ViolationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_wait_warn(mut self, threshold: Duration) -> Self {
        self.wait_warn = threshold;
        self
    }

    pub fn subsystem(&self) -> &str {
        self.accounting.subsystem()
    }

    pub fn accounting(&self) -> &A {
        &self.accounting
    }

    pub fn page_size(&self) -> usize {
        self.allocator.page_size()
    }

    pub fn policy(&self) -> ViolationPolicy {
        self.policy
    }

    pub fn settle(&self, report: LifecycleReport) -> Result<()> {
        report.settle(self.policy)
    }

    // Violations raised by operations that return a value instead of a report.
    fn note(&self, report: LifecycleReport) {
        for v in report.violations() {
            warn!("{}: {}", self.subsystem(), v);
        }
    }

    // ---------------- pages ----------------

    pub fn allocate(&self, flags: AllocFlags) -> Result<Page> {
        let storage = match self.allocator.acquire() {
            Some(s) => s,
            None => {
                error!("{}: unable to allocate memory page", self.subsystem());
                return Err(PageError::OutOfMemory);
            }
        };
        let page = Page::from_storage(storage);
        if flags.zeroed {
            page.zero()?;
        }

        let mut report = LifecycleReport::clean();
        self.accounting
            .acquired(Counter::AllocatedPages, page.id(), &mut report);
        self.note(report);

        debug!(
            "{}: page {:#x} allocated, count {}",
            self.subsystem(),
            page.id(),
            page.ref_count()
        );
        Ok(page)
    }

    /// Take another reference; the returned handle must be released too.
    /// A freed frame is not revived: the violation is recorded and the
    /// returned handle stays dead.
    pub fn retain(&self, page: &Page) -> Page {
        if page.is_freed() {
            let mut report = LifecycleReport::clean();
            self.accounting.violation(
                LifecycleViolation::UseAfterFree { page: page.id() },
                &mut report,
            );
            self.note(report);
            return page.share();
        }
        let count = page.get_ref();
        debug!("{}: page {:#x}, count {}", self.subsystem(), page.id(), count);
        page.share()
    }

    /// Drop one reference. The frame goes back to the allocator at zero.
    pub fn release(&self, page: Page) -> LifecycleReport {
        let mut report = LifecycleReport::clean();
        if page.is_freed() {
            self.accounting.violation(
                LifecycleViolation::UseAfterFree { page: page.id() },
                &mut report,
            );
            return report;
        }

        let count = page.put_ref();
        debug!("{}: page {:#x}, count {}", self.subsystem(), page.id(), count);
        if count > 1 {
            self.accounting.violation(
                LifecycleViolation::RefCountOutOfRange {
                    page: page.id(),
                    count,
                    op: "release",
                },
                &mut report,
            );
        }
        if count == 0 {
            let locked = self.check_not_locked(&page, &mut report);
            self.destroy_frame(&page, &mut report);
            if locked {
                self.unlock_dead(&page, &mut report);
            }
        }
        report
    }

    /// Block until the page lock is held by the caller.
    pub fn lock(&self, page: &Page) -> LifecycleReport {
        let waited = page.lock_blocking();
        if waited > self.wait_warn {
            error!(
                "{}: page {:#x} lock waited too long: {} ms",
                self.subsystem(),
                page.id(),
                waited.as_millis()
            );
        }
        let mut report = LifecycleReport::clean();
        // the frame may have been freed while we were parked on it
        if page.is_freed() {
            page.unlock_bit();
            self.accounting.violation(
                LifecycleViolation::UseAfterFree { page: page.id() },
                &mut report,
            );
            return report;
        }
        self.accounting
            .acquired(Counter::LockedPages, page.id(), &mut report);
        report
    }

    pub fn try_lock(&self, page: &Page) -> bool {
        if !page.try_lock_bit() {
            return false;
        }
        let mut report = LifecycleReport::clean();
        if page.is_freed() {
            page.unlock_bit();
            self.accounting.violation(
                LifecycleViolation::UseAfterFree { page: page.id() },
                &mut report,
            );
            self.note(report);
            return false;
        }
        self.accounting
            .acquired(Counter::LockedPages, page.id(), &mut report);
        self.note(report);
        true
    }

    /// Account a page that was locked outside this lifecycle.
    pub fn account_locked(&self, page: &Page) -> LifecycleReport {
        let mut report = LifecycleReport::clean();
        if !page.is_locked() {
            self.accounting
                .violation(LifecycleViolation::NotLocked { page: page.id() }, &mut report);
            return report;
        }
        self.accounting
            .acquired(Counter::LockedPages, page.id(), &mut report);
        report
    }

    pub fn unlock(&self, page: &Page) -> LifecycleReport {
        let mut report = LifecycleReport::clean();
        if !page.unlock_bit() {
            self.accounting
                .violation(LifecycleViolation::NotLocked { page: page.id() }, &mut report);
            return report;
        }
        self.accounting
            .released(Counter::LockedPages, page.id(), &mut report);
        report
    }

    /// Return the frame to the allocator regardless of outstanding references.
    pub fn free(&self, page: Page) -> LifecycleReport {
        let mut report = LifecycleReport::clean();
        if page.is_freed() {
            self.accounting
                .violation(LifecycleViolation::DoubleFree { page: page.id() }, &mut report);
            return report;
        }

        let locked = self.check_not_locked(&page, &mut report);

        let count = page.ref_count();
        if count != 1 {
            self.accounting.violation(
                LifecycleViolation::RefCountOutOfRange {
                    page: page.id(),
                    count,
                    op: "free",
                },
                &mut report,
            );
        }

        page.clear_refs();
        self.destroy_frame(&page, &mut report);
        if locked {
            self.unlock_dead(&page, &mut report);
        }
        report
    }

    // A frame must not lose its storage while locked.
    fn check_not_locked(&self, page: &Page, report: &mut LifecycleReport) -> bool {
        if !page.is_locked() {
            return false;
        }
        self.accounting.violation(
            LifecycleViolation::FreedWhileLocked { page: page.id() },
            report,
        );
        true
    }

    // Storage is already gone here, so a woken waiter sees a freed frame.
    fn unlock_dead(&self, page: &Page, report: &mut LifecycleReport) {
        if page.unlock_bit() {
            self.accounting
                .released(Counter::LockedPages, page.id(), report);
        }
    }

    fn destroy_frame(&self, page: &Page, report: &mut LifecycleReport) {
        match page.take_storage() {
            Some(storage) => {
                self.allocator.reclaim(storage);
                self.accounting
                    .released(Counter::AllocatedPages, page.id(), report);
                debug!("{}: page {:#x} freed", self.subsystem(), page.id());
            }
            None => self
                .accounting
                .violation(LifecycleViolation::DoubleFree { page: page.id() }, report),
        }
    }

    /// Attribute a page obtained elsewhere to this subsystem.
    pub fn account_page(&self, page: &Page) -> LifecycleReport {
        let mut report = LifecycleReport::clean();
        self.accounting
            .attributed(Counter::AllocatedPages, page.id(), &mut report);
        report
    }

    pub fn forget_page(&self, page: &Page) -> LifecycleReport {
        let mut report = LifecycleReport::clean();
        self.accounting
            .detached(Counter::AllocatedPages, page.id(), &mut report);
        report
    }

    // ---------------- heap buffers ----------------

    /// Empty buffer with room for `size` bytes.
    pub fn alloc_buffer(&self, size: usize) -> Result<Vec<u8>> {
        let mut buf: Vec<u8> = Vec::new();
        if let Err(e) = buf.try_reserve_exact(size) {
            error!("{}: unable to allocate {} bytes: {}", self.subsystem(), size, e);
            return Err(PageError::OutOfMemory);
        }
        let mut report = LifecycleReport::clean();
        self.accounting
            .acquired(Counter::MemoryLeaks, buf.as_ptr() as u64, &mut report);
        self.note(report);
        Ok(buf)
    }

    /// `size` zero bytes.
    pub fn alloc_zeroed_buffer(&self, size: usize) -> Result<Vec<u8>> {
        let mut buf = self.alloc_buffer(size)?;
        buf.resize(size, 0);
        Ok(buf)
    }

    /// Zeroed room for `n` elements of `size` bytes.
    pub fn alloc_array(&self, n: usize, size: usize) -> Result<Vec<u8>> {
        let total = n.checked_mul(size).ok_or_else(|| {
            PageError::invalid(format!("array of {} x {} bytes overflows", n, size))
        })?;
        self.alloc_zeroed_buffer(total)
    }

    pub fn free_buffer(&self, buf: Vec<u8>) -> LifecycleReport {
        let mut report = LifecycleReport::clean();
        self.accounting
            .released(Counter::MemoryLeaks, buf.as_ptr() as u64, &mut report);
        drop(buf);
        report
    }

    // ---------------- cache objects ----------------

    pub fn cache_object_acquired(&self, object: u64) -> LifecycleReport {
        let mut report = LifecycleReport::clean();
        self.accounting
            .acquired(Counter::CacheLeaks, object, &mut report);
        report
    }

    pub fn cache_object_released(&self, object: u64) -> LifecycleReport {
        let mut report = LifecycleReport::clean();
        self.accounting
            .released(Counter::CacheLeaks, object, &mut report);
        report
    }
}

impl<A: PageAccounting> std::fmt::Debug for PageLifecycle<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageLifecycle")
            .field("accounting", &self.accounting)
            .field("allocator", &self.allocator)
            .field("wait_warn", &self.wait_warn)
            .field("policy", &self.policy)
            .finish()
    }
}
