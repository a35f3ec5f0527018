//! Typed capability interfaces for the copy-on-write storage layer and the
//! offsite backup target.
//!
//! The lifecycle engine only ever talks to these traits. Process execution,
//! stderr parsing and timeouts live in the implementing crate.

use async_trait::async_trait;
use std::fmt;
use std::path::Path;

/// Operation that produced a [`StorageError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageOp {
    Create,
    Delete,
    Diff,
    CreateSubvolume,
    Inspect,
    Upload,
}

impl fmt::Display for StorageOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StorageOp::Create => "create",
            StorageOp::Delete => "delete",
            StorageOp::Diff => "diff",
            StorageOp::CreateSubvolume => "create-subvolume",
            StorageOp::Inspect => "inspect",
            StorageOp::Upload => "upload",
        };
        f.write_str(s)
    }
}

/// Closed set of failure causes a capability may report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorKind {
    NotFound,
    PermissionDenied,
    NoSpace,
    /// Source or target is in use.
    Busy,
    /// The call did not finish within the configured bound.
    Timeout,
    /// The underlying tool exited nonzero for another reason.
    CommandFailed,
    Io,
}

impl fmt::Display for StorageErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StorageErrorKind::NotFound => "not found",
            StorageErrorKind::PermissionDenied => "permission denied",
            StorageErrorKind::NoSpace => "no space left",
            StorageErrorKind::Busy => "busy",
            StorageErrorKind::Timeout => "timed out",
            StorageErrorKind::CommandFailed => "command failed",
            StorageErrorKind::Io => "i/o error",
        };
        f.write_str(s)
    }
}

/// Error returned by a storage or backup capability.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{op} {kind}: {message}")]
pub struct StorageError {
    pub op: StorageOp,
    pub kind: StorageErrorKind,
    pub message: String,
}

impl StorageError {
    pub fn new(op: StorageOp, kind: StorageErrorKind, message: impl Into<String>) -> Self {
        Self {
            op,
            kind,
            message: message.into(),
        }
    }
}

/// Snapshot primitive of a copy-on-write volume.
#[async_trait]
pub trait SnapshotStorage: Send + Sync {
    /// Take a read-only snapshot of `source` at `destination`.
    async fn create(&self, source: &Path, destination: &Path) -> Result<(), StorageError>;

    /// Delete the snapshot (subvolume) at `path`.
    async fn delete(&self, path: &Path) -> Result<(), StorageError>;

    /// Write the incremental stream from `parent` to `snapshot` into `output`.
    ///
    /// With no parent the stream is a full send of `snapshot`.
    async fn diff(
        &self,
        parent: Option<&Path>,
        snapshot: &Path,
        output: &Path,
    ) -> Result<(), StorageError>;

    /// Create an empty subvolume, used for the snapshot storage location.
    async fn create_subvolume(&self, path: &Path) -> Result<(), StorageError>;

    /// Whether `path` is a subvolume.
    async fn subvolume_exists(&self, path: &Path) -> Result<bool, StorageError>;
}

/// Offsite upload target.
///
/// Uploads are idempotent by `remote_id`: repeating one overwrites or is a
/// no-op, never a duplicate.
#[async_trait]
pub trait BackupTarget: Send + Sync {
    async fn upload(&self, file: &Path, remote_id: &str) -> Result<(), StorageError>;
}
