//! Snapshot retention and lifecycle core
//!
//! This crate provides:
//! - Retention policy model and validation
//! - Snapshot metadata records (typed, timestamped)
//! - Classification of new snapshots into retention types
//! - The retention engine (pure deletion selection)
//! - Typed capability traits for snapshot storage and offsite backup

pub mod classify;
pub mod error;
pub mod policy;
pub mod retention;
pub mod snapshot;
pub mod storage;

// Re-exports
pub use classify::{classify, same_period, RunContext};
pub use error::{Error, PolicyError, Result};
pub use policy::{Bucket, PolicyOptions, RetentionPolicy};
pub use retention::select_for_deletion;
pub use snapshot::{SnapshotRecord, SnapshotType};
pub use storage::{BackupTarget, SnapshotStorage, StorageError, StorageErrorKind, StorageOp};
