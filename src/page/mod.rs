//! page — page frames and their instrumented lifecycle.
//!
//! Submodules:
//! - frame.rs     — `Page` handle: refcount, lock bit, flags, bounded byte access.
//! - alloc.rs     — `RawPageAllocator` host capability + `HeapPageAllocator`.
//! - lifecycle.rs — `PageLifecycle`: allocate/retain/release/lock/unlock/free.
//! - report.rs    — `LifecycleViolation`, `LifecycleReport`, `ViolationPolicy`.

pub mod alloc;
pub mod frame;
pub mod lifecycle;
pub mod report;

// ---------------- re-exports ----------------

pub use alloc::{AllocFlags, HeapPageAllocator, RawPageAllocator};
pub use frame::{can_be_merged_into_extent, copy_page, Page};
pub use lifecycle::PageLifecycle;
pub use report::{LifecycleReport, LifecycleViolation, ViolationPolicy};
