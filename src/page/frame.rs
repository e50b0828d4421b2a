//! page/frame — the page handle and its frame.
//!
//! A [`Page`] is a handle to a shared [`PageFrame`]. The frame carries the
//! reference count, the lock bit, a "new" flag (clear until `set_new`), a private tag and the
//! (owner, logical index) mapping. Storage lives behind a mutex as
//! `Option<Box<[u8]>>`: once the frame is freed the slot is `None`, so a stale
//! handle gets `UseAfterFree` instead of touching recycled memory.
//!
//! `Page` is deliberately not `Clone`. Extra handles come from
//! `PageLifecycle::retain`, which keeps the reference count honest.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::report::LifecycleViolation;
use crate::error::{PageError, Result};

static NEXT_PAGE_ID: AtomicU64 = AtomicU64::new(1);

const NO_OWNER: u64 = u64::MAX;

pub struct PageFrame {
    id: u64,
    size: usize,
    data: Mutex<Option<Box<[u8]>>>,
    refs: AtomicU32,
    locked: Mutex<bool>,
    unlocked: Condvar,
    new: AtomicBool,
    has_private: AtomicBool,
    private: AtomicU64,
    owner: AtomicU64,
    index: AtomicU64,
}

pub struct Page(Arc<PageFrame>);

impl Page {
    pub(crate) fn from_storage(storage: Box<[u8]>) -> Self {
        let size = storage.len();
        Page(Arc::new(PageFrame {
            id: NEXT_PAGE_ID.fetch_add(1, Ordering::Relaxed),
            size,
            data: Mutex::new(Some(storage)),
            refs: AtomicU32::new(1),
            locked: Mutex::new(false),
            unlocked: Condvar::new(),
            new: AtomicBool::new(false),
            has_private: AtomicBool::new(false),
            private: AtomicU64::new(0),
            owner: AtomicU64::new(NO_OWNER),
            index: AtomicU64::new(0),
        }))
    }

    /// Another handle to the same frame. Refcount is the caller's business.
    pub(crate) fn share(&self) -> Page {
        Page(self.0.clone())
    }

    /// Process-unique id, used in diagnostics.
    #[inline]
    pub fn id(&self) -> u64 {
        self.0.id
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.0.size
    }

    #[inline]
    pub fn ref_count(&self) -> u32 {
        self.0.refs.load(Ordering::Acquire)
    }

    pub fn is_freed(&self) -> bool {
        self.data().is_none()
    }

    pub fn same_frame(a: &Page, b: &Page) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    // ---------------- flags & tags ----------------

    pub fn is_new(&self) -> bool {
        self.0.new.load(Ordering::Acquire)
    }

    pub fn set_new(&self, new: bool) {
        self.0.new.store(new, Ordering::Release);
    }

    pub fn private(&self) -> Option<u64> {
        if self.0.has_private.load(Ordering::Acquire) {
            Some(self.0.private.load(Ordering::Acquire))
        } else {
            None
        }
    }

    pub fn set_private(&self, tag: u64) {
        self.0.private.store(tag, Ordering::Release);
        self.0.has_private.store(true, Ordering::Release);
    }

    pub fn clear_private(&self) {
        self.0.has_private.store(false, Ordering::Release);
        self.0.private.store(0, Ordering::Release);
    }

    /// Link the page to logical block `index` of `owner`.
    pub fn set_mapping(&self, owner: u64, index: u64) {
        self.0.index.store(index, Ordering::Release);
        self.0.owner.store(owner, Ordering::Release);
    }

    pub fn owner(&self) -> Option<u64> {
        match self.0.owner.load(Ordering::Acquire) {
            NO_OWNER => None,
            o => Some(o),
        }
    }

    pub fn index(&self) -> u64 {
        self.0.index.load(Ordering::Acquire)
    }

    // ---------------- reference count ----------------

    pub(crate) fn get_ref(&self) -> u32 {
        self.0.refs.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Drop one reference; returns the post-decrement count (saturates at 0).
    pub(crate) fn put_ref(&self) -> u32 {
        let prev = self
            .0
            .refs
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |r| {
                Some(r.saturating_sub(1))
            })
            .unwrap_or_else(|r| r);
        prev.saturating_sub(1)
    }

    pub(crate) fn clear_refs(&self) {
        self.0.refs.store(0, Ordering::Release);
    }

    // ---------------- lock bit ----------------

    fn lock_state(&self) -> MutexGuard<'_, bool> {
        self.0.locked.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_locked(&self) -> bool {
        *self.lock_state()
    }

    /// Block until the lock bit is ours. Returns how long we waited.
    pub(crate) fn lock_blocking(&self) -> Duration {
        let start = Instant::now();
        let mut locked = self.lock_state();
        while *locked {
            locked = self
                .0
                .unlocked
                .wait(locked)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *locked = true;
        start.elapsed()
    }

    pub(crate) fn try_lock_bit(&self) -> bool {
        let mut locked = self.lock_state();
        if *locked {
            return false;
        }
        *locked = true;
        true
    }

    /// Clear the lock bit and wake one waiter. False if it was not set.
    pub(crate) fn unlock_bit(&self) -> bool {
        let mut locked = self.lock_state();
        if !*locked {
            return false;
        }
        *locked = false;
        drop(locked);
        self.0.unlocked.notify_one();
        true
    }

    // ---------------- storage ----------------

    fn data(&self) -> MutexGuard<'_, Option<Box<[u8]>>> {
        self.0.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn take_storage(&self) -> Option<Box<[u8]>> {
        self.data().take()
    }

    fn use_after_free(&self) -> PageError {
        PageError::Lifecycle(LifecycleViolation::UseAfterFree { page: self.id() })
    }

    fn check_range(&self, offset: usize, len: usize) -> Result<()> {
        let end = offset.checked_add(len).ok_or(PageError::OutOfBounds {
            index: usize::MAX,
            len: self.size(),
        })?;
        if end > self.size() {
            return Err(PageError::OutOfBounds {
                index: end,
                len: self.size(),
            });
        }
        Ok(())
    }

    /// Run `f` over the page bytes.
    pub fn with_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> Result<R> {
        let guard = self.data();
        match guard.as_deref() {
            Some(bytes) => Ok(f(bytes)),
            None => Err(self.use_after_free()),
        }
    }

    /// Run `f` over the page bytes, mutably. Exclusive access against other
    /// writers is the page lock's job, not this method's.
    pub fn with_bytes_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> Result<R> {
        let mut guard = self.data();
        match guard.as_deref_mut() {
            Some(bytes) => Ok(f(bytes)),
            None => Err(self.use_after_free()),
        }
    }

    pub fn write_at(&self, offset: usize, src: &[u8]) -> Result<()> {
        self.check_range(offset, src.len())?;
        self.with_bytes_mut(|b| b[offset..offset + src.len()].copy_from_slice(src))
    }

    pub fn read_at(&self, offset: usize, dst: &mut [u8]) -> Result<()> {
        self.check_range(offset, dst.len())?;
        self.with_bytes(|b| dst.copy_from_slice(&b[offset..offset + dst.len()]))
    }

    pub fn fill(&self, value: u8) -> Result<()> {
        self.with_bytes_mut(|b| b.fill(value))
    }

    pub fn zero(&self) -> Result<()> {
        self.fill(0)
    }

    /// Copy `len` bytes from `src[src_off..]` into `dst[dst_off..]`.
    pub fn copy_range(
        dst: &Page,
        dst_off: usize,
        src: &Page,
        src_off: usize,
        len: usize,
    ) -> Result<()> {
        src.check_range(src_off, len)?;
        dst.check_range(dst_off, len)?;
        if Page::same_frame(dst, src) {
            return dst.with_bytes_mut(|b| b.copy_within(src_off..src_off + len, dst_off));
        }
        let mut tmp = vec![0u8; len];
        src.read_at(src_off, &mut tmp)?;
        dst.write_at(dst_off, &tmp)
    }
}

/// Copy the whole of `src` into `dst`. Pages must have the same size.
pub fn copy_page(dst: &Page, src: &Page) -> Result<()> {
    if dst.size() != src.size() {
        return Err(PageError::OutOfBounds {
            index: src.size(),
            len: dst.size(),
        });
    }
    Page::copy_range(dst, 0, src, 0, src.size())
}

/// Two pages can share one extent: same owner, same "new" state and
/// adjacent logical indexes (in either order).
pub fn can_be_merged_into_extent(a: &Page, b: &Page) -> bool {
    match (a.owner(), b.owner()) {
        (Some(oa), Some(ob)) if oa == ob => {}
        _ => return false,
    }
    if a.is_new() != b.is_new() {
        return false;
    }
    a.index().abs_diff(b.index()) == 1
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("id", &self.id())
            .field("size", &self.size())
            .field("refs", &self.ref_count())
            .field("new", &self.is_new())
            .field("owner", &self.owner())
            .field("index", &self.index())
            .finish()
    }
}
