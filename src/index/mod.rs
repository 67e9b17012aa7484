//! Index maintenance — the two ways the store tracks ground truth.
//!
//! [`rescan`](rescan::rescan) rebuilds everything; [`apply_batch`]
//! (incremental) edits only what a change batch touches. Both run as a
//! single transaction and either fully apply or leave the store untouched.

pub mod incremental;
pub mod rescan;
pub mod types;

pub use incremental::apply_batch;
pub use rescan::{rescan, CancelToken};
pub use types::{FileRecord, ScanStats, UsageEdge};
