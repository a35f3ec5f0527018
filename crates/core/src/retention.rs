//! Retention engine: decides which snapshots of a volume expire
//!
//! Number-based retention keeps the newest `keep` records of each bucket.
//! An optional age filter then also expires any bucketed record older than
//! the policy's maximum age. `init` and `manual` records are never selected.

use crate::error::PolicyError;
use crate::policy::{self, Bucket, PolicyOptions, RetentionPolicy};
use crate::snapshot::SnapshotRecord;
use chrono::{DateTime, FixedOffset};
use std::cmp::Ordering;
use tracing::debug;

/// Select the records of `history` to delete under the raw `options`.
///
/// Validates the options first. The result is ordered oldest first, which
/// is the order deletions must be applied in. `history` is not modified.
pub fn select_for_deletion(
    history: &[SnapshotRecord],
    options: &PolicyOptions,
    now: DateTime<FixedOffset>,
) -> Result<Vec<SnapshotRecord>, PolicyError> {
    let policy = policy::validate(options)?;
    Ok(select_with_policy(history, &policy, now))
}

/// Same as [`select_for_deletion`] with an already validated policy.
pub fn select_with_policy(
    history: &[SnapshotRecord],
    policy: &RetentionPolicy,
    now: DateTime<FixedOffset>,
) -> Vec<SnapshotRecord> {
    selected_indices(history, policy, now)
        .into_iter()
        .map(|i| history[i].clone())
        .collect()
}

/// Indices into `history` selected for deletion, oldest first.
pub fn selected_indices(
    history: &[SnapshotRecord],
    policy: &RetentionPolicy,
    now: DateTime<FixedOffset>,
) -> Vec<usize> {
    let mut doomed = vec![false; history.len()];

    for bucket in Bucket::ALL {
        let mut members: Vec<usize> = history
            .iter()
            .enumerate()
            .filter(|(_, r)| r.kind().bucket() == Some(bucket))
            .map(|(i, _)| i)
            .collect();

        // Newest first
        members.sort_by(|&a, &b| chronological(history, b, a));

        let keep = policy.keep(bucket);
        let expired = members.len().saturating_sub(keep);
        if expired > 0 {
            debug!(%bucket, keep, members = members.len(), expired, "bucket over keep count");
        }
        for &i in members.iter().skip(keep) {
            doomed[i] = true;
        }
    }

    if let Some(max_age) = policy.max_age() {
        for (i, record) in history.iter().enumerate() {
            if record.kind().is_protected() || doomed[i] {
                continue;
            }
            if now.signed_duration_since(record.created()) > max_age {
                debug!(snapshot = record.name(), "older than max age");
                doomed[i] = true;
            }
        }
    }

    let mut selected: Vec<usize> = (0..history.len()).filter(|&i| doomed[i]).collect();
    selected.sort_by(|&a, &b| chronological(history, a, b));
    selected
}

/// Total order on history positions: creation time, then insertion order.
fn chronological(history: &[SnapshotRecord], a: usize, b: usize) -> Ordering {
    history[a]
        .created()
        .cmp(&history[b].created())
        .then(a.cmp(&b))
}
