//! Conversions between file-system pages and memory pages.
//!
//! The on-disk page size (`fs_page_shift`) may be smaller, equal or larger
//! than the memory page size (`mem_page_shift`, 4 KiB by default).

use serde::Serialize;

use crate::consts::MEM_PAGE_SHIFT;
use crate::error::{PageError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageGeometry {
    pub fs_page_shift: u32,
    pub mem_page_shift: u32,
}

impl PageGeometry {
    /// Geometry for an fs page of `fs_page_size` bytes over 4 KiB memory pages.
    pub fn new(fs_page_size: usize) -> Result<Self> {
        Self::with_mem_page(fs_page_size, 1usize << MEM_PAGE_SHIFT)
    }

    pub fn with_mem_page(fs_page_size: usize, mem_page_size: usize) -> Result<Self> {
        if !fs_page_size.is_power_of_two() || !mem_page_size.is_power_of_two() {
            return Err(PageError::invalid(format!(
                "page sizes must be powers of two (fs {}, mem {})",
                fs_page_size, mem_page_size
            )));
        }
        Ok(Self {
            fs_page_shift: fs_page_size.trailing_zeros(),
            mem_page_shift: mem_page_size.trailing_zeros(),
        })
    }

    pub fn fs_page_size(&self) -> u64 {
        1u64 << self.fs_page_shift
    }

    pub fn mem_page_size(&self) -> u64 {
        1u64 << self.mem_page_shift
    }

    /// Saturates at `u32::MAX`.
    pub fn phys_to_mem_page_count(&self, phys_pages: u32) -> u32 {
        let bytes = self.fs_page_size().saturating_mul(phys_pages as u64);
        u32::try_from(bytes >> self.mem_page_shift).unwrap_or(u32::MAX)
    }

    /// Saturates at `u32::MAX`.
    pub fn mem_to_phys_page_count(&self, mem_pages: u32) -> u32 {
        let bytes = self.mem_page_size().saturating_mul(mem_pages as u64);
        u32::try_from(bytes >> self.fs_page_shift).unwrap_or(u32::MAX)
    }

    /// Index of the first memory page of physical page `index`.
    pub fn phys_to_mem_page(&self, index: u64) -> u64 {
        if self.fs_page_shift >= self.mem_page_shift {
            index << (self.fs_page_shift - self.mem_page_shift)
        } else {
            index >> (self.mem_page_shift - self.fs_page_shift)
        }
    }

    /// Index of the physical page holding memory page `index`.
    pub fn mem_to_phys_page(&self, index: u64) -> u64 {
        if self.fs_page_shift >= self.mem_page_shift {
            index >> (self.fs_page_shift - self.mem_page_shift)
        } else {
            index << (self.mem_page_shift - self.fs_page_shift)
        }
    }

    /// Memory page holding byte `write_offset` of a log starting at
    /// physical page `start_page`.
    pub fn write_offset_to_mem_page_index(&self, start_page: u16, write_offset: u32) -> u64 {
        let first = self.phys_to_mem_page(start_page as u64);
        ((first << self.mem_page_shift) + write_offset as u64) >> self.mem_page_shift
    }
}
