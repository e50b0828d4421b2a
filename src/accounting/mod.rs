//! accounting — leak counters, the accounting context and subsystem instrumentation.
//!
//! - counters.rs  — `LeakCounters` / `LeakSnapshot` (atomic gauges).
//! - context.rs   — `AccountingContext`: global set + registry of subsystem sets.
//! - subsystem.rs — `PageAccounting` capability: `LeakAccounting`, `NoAccounting`,
//!   and the build-time `DefaultAccounting` alias.

pub mod counters;
pub mod context;
pub mod subsystem;

pub use context::{AccountingContext, LeakReport};
pub use counters::{Counter, LeakCounters, LeakSnapshot};
pub use subsystem::{DefaultAccounting, LeakAccounting, NoAccounting, PageAccounting};
