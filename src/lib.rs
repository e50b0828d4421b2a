//! flashpage — page lifecycle and integrity layer of a log-structured flash
//! file system.
//!
//! - accounting — leak counters, accounting context, subsystem instrumentation
//! - page       — page frames, host allocator, `PageLifecycle`, violation reports
//! - pagevec    — bounded page vector (one I/O unit)
//! - integrity  — CRC32 and magic/version checks of metadata blocks
//! - hash       — directory-entry name keys
//! - wait, geometry, config, consts, error

pub mod consts;
pub mod error;
pub mod config;

pub mod accounting;
pub mod page;
pub mod pagevec;

pub mod integrity;
pub mod hash;

pub mod wait;
pub mod geometry;

// Удобные реэкспорты
pub use accounting::{
    AccountingContext, Counter, DefaultAccounting, LeakAccounting, LeakReport, LeakSnapshot,
    NoAccounting, PageAccounting,
};
pub use config::{ConfigBuilder, FlashConfig};
pub use error::{PageError, Result};
pub use geometry::PageGeometry;
pub use hash::{full_name_hash, generate_key, NameHashKey};
pub use integrity::{
    compute_checksum, inspect_block, is_valid, seal_block, validate_magic, BlockStatus,
    MetadataCheck, Revision, Signature,
};
pub use page::{
    AllocFlags, HeapPageAllocator, LifecycleReport, LifecycleViolation, Page, PageLifecycle,
    RawPageAllocator, ViolationPolicy,
};
pub use pagevec::{PageVector, Rejected};
pub use wait::Completion;
