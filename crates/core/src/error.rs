//! Error kinds shared by every snapshot manager component.

use crate::storage::StorageError;
use std::path::PathBuf;

/// Result type used throughout the snapshot manager.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the lifecycle engine.
///
/// Every `Failed` transition in the volume manager carries one of these so
/// the operator report can name the originating cause.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The retention configuration is malformed.
    #[error("invalid retention policy: {0}")]
    InvalidPolicy(#[from] PolicyError),

    /// A create/delete/diff call against the snapshot storage failed.
    #[error("storage operation failed: {0}")]
    StorageOperationFailed(#[source] StorageError),

    /// The backup capability returned an error.
    #[error("upload of '{remote_id}' failed: {source}")]
    UploadFailed {
        remote_id: String,
        #[source]
        source: StorageError,
    },

    /// The durable write of the config store failed.
    #[error("failed to persist config store at {path}: {message}")]
    PersistenceFailed { path: PathBuf, message: String },

    /// The persisted store could not be read or is internally inconsistent.
    #[error("invalid config store: {0}")]
    InvalidStore(String),

    #[error("no volume config named '{0}'")]
    VolumeNotFound(String),

    #[error("volume '{volume}' has no snapshot named '{name}'")]
    SnapshotNotFound { volume: String, name: String },

    /// Deleting an `init` or `manual` snapshot requires an explicit force.
    #[error("snapshot '{name}' is a protected {kind} snapshot; pass --force to delete it")]
    ProtectedSnapshot { name: String, kind: &'static str },

    #[error("volume '{volume}' already has a snapshot named '{name}'")]
    DuplicateSnapshot { volume: String, name: String },

    #[error("volume config '{0}' already exists")]
    VolumeExists(String),
}

impl Error {
    /// Short machine-readable kind, used in run summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidPolicy(_) => "InvalidPolicy",
            Error::StorageOperationFailed(_) => "StorageOperationFailed",
            Error::UploadFailed { .. } => "UploadFailed",
            Error::PersistenceFailed { .. } => "PersistenceFailed",
            Error::InvalidStore(_) => "InvalidStore",
            Error::VolumeNotFound(_) => "VolumeNotFound",
            Error::SnapshotNotFound { .. } => "SnapshotNotFound",
            Error::ProtectedSnapshot { .. } => "ProtectedSnapshot",
            Error::DuplicateSnapshot { .. } => "DuplicateSnapshot",
            Error::VolumeExists(_) => "VolumeExists",
        }
    }
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        Error::StorageOperationFailed(err)
    }
}

/// Reasons a retention policy fails validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    #[error("keep count for '{bucket}' is negative ({count})")]
    NegativeCount { bucket: String, count: i64 },

    #[error("keep count for '{bucket}' is too large ({count})")]
    CountOverflow { bucket: String, count: i64 },

    #[error("unrecognized retention option '{0}'")]
    UnknownKey(String),

    #[error("max-age-hours must be positive, got {0}")]
    InvalidMaxAge(i64),
}
