//! Error taxonomy of the page layer.
//!
//! Integrity failures are not errors: checksum and magic mismatches come back
//! as `bool` / [`crate::integrity::BlockStatus`]. Lifecycle violations travel in a
//! [`crate::page::LifecycleReport`] and only become a [`PageError`] when the
//! report is settled under an escalating policy.

use thiserror::Error;

use crate::page::LifecycleViolation;

#[derive(Debug, Error)]
pub enum PageError {
    /// The host allocator has no page (or buffer) left. Never retried here.
    #[error("out of memory")]
    OutOfMemory,

    /// The container is full; the caller has to start a new one.
    #[error("page vector is full (capacity {capacity})")]
    Exhausted { capacity: u8 },

    #[error("index {index} out of bounds (len {len})")]
    OutOfBounds { index: usize, len: usize },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("wait timed out after {waited_ms} ms")]
    Timeout { waited_ms: u64 },

    #[error("lifecycle violation: {0}")]
    Lifecycle(#[from] LifecycleViolation),
}

impl PageError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        PageError::InvalidArgument(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, PageError>;
