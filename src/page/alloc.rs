//! page/alloc — the raw page allocator capability.
//!
//! The lifecycle never allocates page storage on its own; it asks a
//! [`RawPageAllocator`] supplied by the host. `HeapPageAllocator` is the
//! default host: boxed slices from the global allocator, an optional page
//! limit (so exhaustion is reachable in tests and tools) and a small pool of
//! recycled frames.
//!
//! Recycled frames are handed out as-is. Callers that need zeroes ask for
//! `AllocFlags::ZEROED`; the lifecycle does the fill.

use log::debug;
use std::collections::TryReserveError;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::config::FlashConfig;
use crate::error::Result;

pub trait RawPageAllocator: Send + Sync + fmt::Debug {
    fn page_size(&self) -> usize;

    /// One page of storage, `None` when the host is out of pages.
    fn acquire(&self) -> Option<Box<[u8]>>;

    /// Give storage obtained from `acquire` back.
    fn reclaim(&self, storage: Box<[u8]>);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocFlags {
    pub zeroed: bool,
}

impl AllocFlags {
    pub const NONE: AllocFlags = AllocFlags { zeroed: false };
    pub const ZEROED: AllocFlags = AllocFlags { zeroed: true };
}

pub struct HeapPageAllocator {
    page_size: usize,
    limit: Option<usize>,
    pool_cap: usize,
    pool: Mutex<Vec<Box<[u8]>>>,
    outstanding: AtomicUsize,
}

impl HeapPageAllocator {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            limit: None,
            pool_cap: 0,
            pool: Mutex::new(Vec::new()),
            outstanding: AtomicUsize::new(0),
        }
    }

    pub fn from_config(cfg: &FlashConfig) -> Result<Self> {
        cfg.validate()?;
        Ok(Self::new(cfg.page_size)
            .with_limit(cfg.page_limit)
            .with_pool(cfg.pool_pages))
    }

    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_pool(mut self, pages: usize) -> Self {
        self.pool_cap = pages;
        self
    }

    /// Pages handed out and not reclaimed yet.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    pub fn pooled(&self) -> usize {
        self.pool.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn fresh(&self) -> std::result::Result<Box<[u8]>, TryReserveError> {
        let mut v: Vec<u8> = Vec::new();
        v.try_reserve_exact(self.page_size)?;
        v.resize(self.page_size, 0);
        Ok(v.into_boxed_slice())
    }
}

impl RawPageAllocator for HeapPageAllocator {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn acquire(&self) -> Option<Box<[u8]>> {
        // Reserve a slot under the limit first; give it back on failure.
        let reserved = self
            .outstanding
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| match self.limit {
                Some(limit) if n >= limit => None,
                _ => Some(n + 1),
            });
        if reserved.is_err() {
            debug!("heap allocator: page limit {:?} reached", self.limit);
            return None;
        }

        let recycled = self
            .pool
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();
        if let Some(storage) = recycled {
            return Some(storage);
        }

        match self.fresh() {
            Ok(storage) => Some(storage),
            Err(e) => {
                debug!("heap allocator: {}", e);
                self.outstanding.fetch_sub(1, Ordering::AcqRel);
                None
            }
        }
    }

    fn reclaim(&self, storage: Box<[u8]>) {
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
        if storage.len() != self.page_size {
            return;
        }
        let mut pool = self.pool.lock().unwrap_or_else(PoisonError::into_inner);
        if pool.len() < self.pool_cap {
            pool.push(storage);
        }
    }
}

impl fmt::Debug for HeapPageAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeapPageAllocator")
            .field("page_size", &self.page_size)
            .field("limit", &self.limit)
            .field("outstanding", &self.outstanding())
            .field("pooled", &self.pooled())
            .finish()
    }
}
