//! Classification of new snapshots into retention types

use crate::policy::Bucket;
use crate::snapshot::{SnapshotRecord, SnapshotType};
use chrono::{DateTime, Datelike, FixedOffset, Timelike};
use std::fmt;

/// Declared granularity of the current invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunContext {
    /// A scheduler tick for the given bucket boundary
    Scheduled(Bucket),
    /// An operator request
    Manual,
}

impl fmt::Display for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunContext::Scheduled(bucket) => write!(f, "{}", bucket),
            RunContext::Manual => f.write_str("manual"),
        }
    }
}

/// Type for the snapshot about to be created.
///
/// The context decides directly; the scheduler is trusted to fire each
/// granularity once per period. An empty history always yields `init` so
/// every volume has exactly one permanent anchor. No deduplication happens
/// here.
pub fn classify(context: RunContext, history: &[SnapshotRecord]) -> SnapshotType {
    if history.is_empty() {
        return SnapshotType::Init;
    }
    match context {
        RunContext::Scheduled(bucket) => SnapshotType::from(bucket),
        RunContext::Manual => SnapshotType::Manual,
    }
}

/// Whether `a` and `b` fall in the same calendar period of `bucket`,
/// evaluated in the offset of `a`. Weeks are ISO weeks (Monday start).
pub fn same_period(bucket: Bucket, a: DateTime<FixedOffset>, b: DateTime<FixedOffset>) -> bool {
    let b = b.with_timezone(&a.timezone());
    match bucket {
        Bucket::Hourly => a.date_naive() == b.date_naive() && a.hour() == b.hour(),
        Bucket::Daily => a.date_naive() == b.date_naive(),
        Bucket::Weekly => a.iso_week() == b.iso_week(),
        Bucket::Monthly => a.year() == b.year() && a.month() == b.month(),
        Bucket::Yearly => a.year() == b.year(),
    }
}
