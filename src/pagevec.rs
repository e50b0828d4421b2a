//! pagevec — bounded, dense vector of pages backing one I/O unit.
//!
//! Capacity is a single byte (1..=255): one vector models one metadata
//! fragment written inside a log segment, which never spans more than a
//! handful of pages. Entries are kept dense and in insertion order.
//!
//! The vector is not internally synchronized. One thread fills and drains a
//! given instance; distinct vectors are independent.

use log::{debug, error, warn};
use std::slice;
use thiserror::Error;

use crate::accounting::PageAccounting;
use crate::error::{PageError, Result};
use crate::page::{AllocFlags, LifecycleReport, LifecycleViolation, Page, PageLifecycle};

#[derive(Debug, Default)]
pub struct PageVector {
    capacity: u8,
    pages: Vec<Page>,
}

/// `add` on a full vector: the page comes back to the caller.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct Rejected {
    pub page: Page,
    pub error: PageError,
}

impl Rejected {
    pub fn into_parts(self) -> (Page, PageError) {
        (self.page, self.error)
    }
}

impl PageVector {
    pub fn create(capacity: u8) -> Result<Self> {
        if capacity == 0 {
            error!("page vector: invalid capacity 0");
            return Err(PageError::invalid("page vector capacity must be 1..=255"));
        }
        Ok(Self {
            capacity,
            pages: Vec::with_capacity(capacity as usize),
        })
    }

    fn has_storage(&self) -> bool {
        self.capacity > 0
    }

    fn reset(&mut self, op: &str) {
        if !self.pages.is_empty() {
            warn!(
                "page vector: {} drops {} pages without freeing them",
                op,
                self.pages.len()
            );
        }
        self.pages.clear();
    }

    /// Reset count to 0, keeping storage.
    pub fn init(&mut self) {
        self.reset("init");
    }

    /// Like `init`, but the vector must have been created.
    pub fn reinit(&mut self) -> Result<()> {
        if !self.has_storage() {
            error!("page vector: reinit without storage");
            return Err(PageError::invalid("page vector has no storage"));
        }
        self.reset("reinit");
        Ok(())
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.pages.len()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity as usize
    }

    #[inline]
    pub fn space(&self) -> usize {
        self.capacity() - self.count()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.space() == 0
    }

    pub fn get(&self, index: usize) -> Option<&Page> {
        self.pages.get(index)
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn iter(&self) -> slice::Iter<'_, Page> {
        self.pages.iter()
    }

    fn exhausted(&self) -> PageError {
        PageError::Exhausted {
            capacity: self.capacity,
        }
    }

    /// Allocate a zeroed page through `lc` and append it.
    pub fn allocate<A: PageAccounting>(&mut self, lc: &PageLifecycle<A>) -> Result<&Page> {
        if self.is_full() {
            error!(
                "page vector: no space (count {}, capacity {})",
                self.count(),
                self.capacity
            );
            return Err(self.exhausted());
        }
        let page = lc.allocate(AllocFlags::ZEROED)?;
        debug!(
            "page vector: page {:#x} added, count {}",
            page.id(),
            self.count() + 1
        );
        self.pages.push(page);
        let last = self.pages.len() - 1;
        Ok(&self.pages[last])
    }

    /// Append an owned page. On a full vector the page is handed back.
    pub fn add(&mut self, page: Page) -> std::result::Result<(), Rejected> {
        if self.is_full() {
            warn!(
                "page vector: no space for page {:#x} (capacity {})",
                page.id(),
                self.capacity
            );
            let error = self.exhausted();
            return Err(Rejected { page, error });
        }
        self.pages.push(page);
        Ok(())
    }

    /// Take the page at `index` out; later entries shift down.
    pub fn remove(&mut self, index: usize) -> Result<Page> {
        if index >= self.count() {
            error!(
                "page vector: remove index {} >= count {}",
                index,
                self.count()
            );
            return Err(PageError::OutOfBounds {
                index,
                len: self.count(),
            });
        }
        Ok(self.pages.remove(index))
    }

    /// Free every held page through `lc` and leave the vector empty.
    pub fn release<A: PageAccounting>(&mut self, lc: &PageLifecycle<A>) -> LifecycleReport {
        let mut report = LifecycleReport::clean();
        if self.pages.is_empty() {
            return report;
        }
        debug!("page vector: release {} pages", self.count());
        for page in self.pages.drain(..) {
            report.merge(lc.free(page));
        }
        report
    }

    /// Drop the storage. Pages still held are reported and stay accounted.
    pub fn destroy(mut self) -> LifecycleReport {
        let mut report = LifecycleReport::clean();
        if !self.pages.is_empty() {
            error!(
                "page vector: destroyed with {} pages still held",
                self.pages.len()
            );
            report.push(LifecycleViolation::LeakedOnDestroy {
                pages: self.pages.len(),
            });
        }
        self.pages = Vec::new();
        self.capacity = 0;
        report
    }
}

impl<'a> IntoIterator for &'a PageVector {
    type Item = &'a Page;
    type IntoIter = slice::Iter<'a, Page>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
