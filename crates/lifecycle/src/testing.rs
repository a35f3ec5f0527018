//! In-memory capability fakes for lifecycle tests

use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset};
use sbm_core::snapshot::parse_timestamp;
use sbm_core::{BackupTarget, SnapshotStorage, StorageError, StorageErrorKind, StorageOp};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// `2024-01-01T00:00:00+00:00` plus `hours`
pub fn at(hours: i64) -> DateTime<FixedOffset> {
    parse_timestamp("2024-01-01T00:00:00+00:00").unwrap() + Duration::hours(hours)
}

#[derive(Default)]
struct State {
    subvolumes: BTreeSet<PathBuf>,
    fail_creates: bool,
    /// Delete call number (1-based, counted from when it was armed) that fails
    fail_delete_at: Option<usize>,
    delete_calls: usize,
    /// Every delete fails with this kind and leaves the subvolume in place
    fail_deletes: Option<StorageErrorKind>,
}

/// Tracks which subvolumes exist
#[derive(Default)]
pub struct FakeStorage {
    state: Mutex<State>,
}

impl FakeStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_subvolume(&self, path: impl Into<PathBuf>) {
        self.state.lock().unwrap().subvolumes.insert(path.into());
    }

    pub fn has(&self, path: impl AsRef<Path>) -> bool {
        self.state.lock().unwrap().subvolumes.contains(path.as_ref())
    }

    /// Every existing subvolume path, sorted
    pub fn existing(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .subvolumes
            .iter()
            .map(|p| p.display().to_string())
            .collect()
    }

    pub fn fail_creates(&self) {
        self.state.lock().unwrap().fail_creates = true;
    }

    pub fn fail_deletes_with(&self, kind: StorageErrorKind) {
        self.state.lock().unwrap().fail_deletes = Some(kind);
    }

    pub fn fail_delete_on_call(&self, n: usize) {
        let mut state = self.state.lock().unwrap();
        state.delete_calls = 0;
        state.fail_delete_at = Some(n);
    }
}

#[async_trait]
impl SnapshotStorage for FakeStorage {
    async fn create(&self, _source: &Path, destination: &Path) -> Result<(), StorageError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_creates {
            return Err(StorageError::new(StorageOp::Create, StorageErrorKind::NoSpace, "no space left on device"));
        }
        if !state.subvolumes.insert(destination.to_path_buf()) {
            return Err(StorageError::new(StorageOp::Create, StorageErrorKind::CommandFailed, "target exists"));
        }
        Ok(())
    }

    async fn delete(&self, path: &Path) -> Result<(), StorageError> {
        let mut state = self.state.lock().unwrap();
        state.delete_calls += 1;
        if let Some(kind) = state.fail_deletes {
            return Err(StorageError::new(StorageOp::Delete, kind, format!("cannot delete {}", path.display())));
        }
        if state.fail_delete_at == Some(state.delete_calls) {
            return Err(StorageError::new(StorageOp::Delete, StorageErrorKind::Busy, "device or resource busy"));
        }
        if !state.subvolumes.remove(path) {
            return Err(StorageError::new(
                StorageOp::Delete,
                StorageErrorKind::NotFound,
                format!("{} does not exist", path.display()),
            ));
        }
        Ok(())
    }

    async fn diff(&self, parent: Option<&Path>, snapshot: &Path, output: &Path) -> Result<(), StorageError> {
        let body = format!("{:?} -> {}", parent, snapshot.display());
        std::fs::write(output, body).map_err(|e| StorageError::new(StorageOp::Diff, StorageErrorKind::Io, e.to_string()))
    }

    async fn create_subvolume(&self, path: &Path) -> Result<(), StorageError> {
        self.state.lock().unwrap().subvolumes.insert(path.to_path_buf());
        Ok(())
    }

    async fn subvolume_exists(&self, path: &Path) -> Result<bool, StorageError> {
        Ok(self.has(path))
    }
}

/// Records remote ids of successful uploads
#[derive(Default)]
pub struct RecordingUploader {
    uploaded: Mutex<Vec<String>>,
    fail: bool,
}

impl RecordingUploader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn uploaded(&self) -> Vec<String> {
        self.uploaded.lock().unwrap().clone()
    }
}

#[async_trait]
impl BackupTarget for RecordingUploader {
    async fn upload(&self, file: &Path, remote_id: &str) -> Result<(), StorageError> {
        if self.fail {
            return Err(StorageError::new(StorageOp::Upload, StorageErrorKind::CommandFailed, "bucket unreachable"));
        }
        assert!(file.exists(), "staging file missing: {}", file.display());
        self.uploaded.lock().unwrap().push(remote_id.to_string());
        Ok(())
    }
}
