//! Volume manager: one volume's create → upload → prune → persist cycle
//!
//! Ordering is what keeps the persisted store conservative:
//! - a record is appended only after the storage create call succeeded
//! - deletions run oldest first and each record is dropped from memory only
//!   after its own delete call succeeded
//! - the store is saved atomically once the volume's mutations are done,
//!   including after a failure that left earlier steps applied

use crate::report::{CreatedSnapshot, CycleState, VolumeReport};
use chrono::{DateTime, FixedOffset};
use sbm_core::retention::select_with_policy;
use sbm_core::{
    classify, same_period, BackupTarget, Error, Result, RunContext, SnapshotRecord,
    SnapshotStorage, StorageError, StorageErrorKind, StorageOp,
};
use sbm_journal::{ConfigStore, VolumeConfig};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Offsite backup wiring
pub struct Backup<'a> {
    pub target: &'a dyn BackupTarget,
    /// Where send streams are written before upload
    pub staging_dir: PathBuf,
}

/// Whether a scheduled run may skip creation when its period already has a
/// snapshot of the same type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dedup {
    SkipSamePeriod,
    Always,
}

/// Runs lifecycle operations against one storage backend
pub struct VolumeManager<'a> {
    storage: &'a dyn SnapshotStorage,
    backup: Option<Backup<'a>>,
}

impl<'a> VolumeManager<'a> {
    pub fn new(storage: &'a dyn SnapshotStorage) -> Self {
        Self {
            storage,
            backup: None,
        }
    }

    pub fn with_backup(mut self, backup: Backup<'a>) -> Self {
        self.backup = Some(backup);
        self
    }

    /// Run a full cycle for `volume` and persist the result.
    ///
    /// Never returns early with an error: every failure ends up in the
    /// report with the stage it happened in.
    pub async fn run_cycle(
        &self,
        store: &mut ConfigStore,
        volume: &str,
        context: RunContext,
        now: DateTime<FixedOffset>,
        dedup: Dedup,
    ) -> VolumeReport {
        let mut report = VolumeReport::new(volume);
        let mutated = match store.volume_mut(volume) {
            Ok(config) => self.mutate(config, context, now, dedup, &mut report).await,
            Err(e) => {
                report.fail(CycleState::Creating, e);
                return report;
            }
        };

        if mutated {
            debug!(volume, "persisting");
            match store.save() {
                Ok(()) => report.persisted = true,
                Err(e) => report.fail(CycleState::Persisting, e),
            }
        }

        if report.failures.is_empty() {
            report.state = CycleState::Done;
            info!(volume, deleted = report.deleted.len(), "cycle done");
        } else {
            for failure in &report.failures {
                warn!(volume, %failure, "cycle failed");
            }
        }
        report
    }

    /// In-memory part of the cycle. Returns whether `config` changed.
    async fn mutate(
        &self,
        config: &mut VolumeConfig,
        context: RunContext,
        now: DateTime<FixedOffset>,
        dedup: Dedup,
        report: &mut VolumeReport,
    ) -> bool {
        // Creating
        let policy = match config.policy() {
            Ok(policy) => policy,
            Err(e) => {
                report.fail(CycleState::Creating, e.into());
                return false;
            }
        };

        let parent = config.newest().cloned();
        let mut created = None;
        if should_skip(config, context, now, dedup) {
            info!(volume = config.name(), %context, "snapshot already taken this period; skipping creation");
            report.skipped_creation = true;
        } else {
            match self.create(config, context, now).await {
                Ok(record) => {
                    report.created = Some(CreatedSnapshot {
                        name: record.name().to_string(),
                        kind: record.kind(),
                    });
                    created = Some(record);
                }
                Err(e) => {
                    report.fail(CycleState::Creating, e);
                    return false;
                }
            }
        }
        let mut mutated = created.is_some();

        // Uploading
        if let (Some(backup), Some(record)) = (&self.backup, &created) {
            match self.upload(backup, config.name(), parent.as_ref(), record).await {
                Ok(remote_id) => report.uploaded = Some(remote_id),
                Err(e) => {
                    // Keep the parent chain intact for the next run
                    report.fail(CycleState::Uploading, e);
                    return mutated;
                }
            }
        }

        // Pruning
        let doomed = select_with_policy(config.snapshots(), &policy, now);
        debug!(volume = config.name(), selected = doomed.len(), "retention selection");
        for (i, record) in doomed.iter().enumerate() {
            match self.storage.delete(record.path()).await {
                Ok(()) => {
                    config.remove(record.name());
                    report.deleted.push(record.name().to_string());
                    mutated = true;
                }
                Err(e) => {
                    report.remaining = doomed[i..].iter().map(|r| r.name().to_string()).collect();
                    warn!(
                        volume = config.name(),
                        deleted = report.deleted.len(),
                        remaining = report.remaining.len(),
                        "pruning stopped"
                    );
                    report.fail(CycleState::Pruning, e.into());
                    break;
                }
            }
        }

        mutated
    }

    async fn create(
        &self,
        config: &mut VolumeConfig,
        context: RunContext,
        now: DateTime<FixedOffset>,
    ) -> Result<SnapshotRecord> {
        let kind = classify(context, config.snapshots());
        let record = SnapshotRecord::new(config.name(), config.snapshot_dir(), now, kind);
        config.ensure_insertable(&record)?;

        self.storage.create(config.path(), record.path()).await?;
        info!(volume = config.name(), snapshot = record.name(), %kind, "created snapshot");

        config.push(record.clone())?;
        Ok(record)
    }

    async fn upload(
        &self,
        backup: &Backup<'_>,
        volume: &str,
        parent: Option<&SnapshotRecord>,
        record: &SnapshotRecord,
    ) -> Result<String> {
        let remote_id = remote_id(volume, parent, record);
        let staging = backup.staging_dir.join(format!("{}.send", record.name()));

        if let Err(e) = tokio::fs::create_dir_all(&backup.staging_dir).await {
            return Err(Error::UploadFailed {
                remote_id,
                source: StorageError::new(
                    StorageOp::Upload,
                    StorageErrorKind::Io,
                    format!("cannot create {}: {}", backup.staging_dir.display(), e),
                ),
            });
        }

        let result = self.send_and_upload(backup, parent, record, &staging, &remote_id).await;
        match tokio::fs::remove_file(&staging).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %staging.display(), error = %e, "failed to remove staging file"),
        }
        result.map(|()| remote_id)
    }

    async fn send_and_upload(
        &self,
        backup: &Backup<'_>,
        parent: Option<&SnapshotRecord>,
        record: &SnapshotRecord,
        staging: &Path,
        remote_id: &str,
    ) -> Result<()> {
        self.storage
            .diff(parent.map(|p| p.path()), record.path(), staging)
            .await?;
        backup
            .target
            .upload(staging, remote_id)
            .await
            .map_err(|source| Error::UploadFailed {
                remote_id: remote_id.to_string(),
                source,
            })?;
        info!(remote_id, "uploaded snapshot stream");
        Ok(())
    }

    /// Delete one snapshot on operator request.
    ///
    /// `init` and `manual` snapshots need `force`.
    pub async fn delete_snapshot(
        &self,
        store: &mut ConfigStore,
        volume: &str,
        name: &str,
        force: bool,
    ) -> Result<SnapshotRecord> {
        let config = store.volume_mut(volume)?;
        let record = config
            .find(name)
            .cloned()
            .ok_or_else(|| Error::SnapshotNotFound {
                volume: volume.to_string(),
                name: name.to_string(),
            })?;

        if record.kind().is_protected() && !force {
            return Err(Error::ProtectedSnapshot {
                name: name.to_string(),
                kind: record.kind().as_str(),
            });
        }

        self.storage.delete(record.path()).await?;
        config.remove(name);
        info!(volume, snapshot = name, "deleted snapshot");

        store.save()?;
        Ok(record)
    }

    /// Register a new volume: prepare its snapshot storage location, take
    /// the `init` snapshot and persist.
    pub async fn create_volume(
        &self,
        store: &mut ConfigStore,
        mut config: VolumeConfig,
        now: DateTime<FixedOffset>,
    ) -> Result<SnapshotRecord> {
        if store.get(config.name()).is_some() {
            return Err(Error::VolumeExists(config.name().to_string()));
        }
        config.policy()?;

        if !self.storage.subvolume_exists(config.path()).await? {
            return Err(Error::StorageOperationFailed(StorageError::new(
                StorageOp::Inspect,
                StorageErrorKind::NotFound,
                format!("{} is not a subvolume", config.path().display()),
            )));
        }
        if !self.storage.subvolume_exists(config.snapshot_dir()).await? {
            self.storage.create_subvolume(config.snapshot_dir()).await?;
        }

        let record = self.create(&mut config, RunContext::Manual, now).await?;
        store.insert(config)?;
        store.save()?;
        Ok(record)
    }

    /// Remove a volume from the store, optionally deleting its snapshots
    /// and storage location first.
    ///
    /// A snapshot whose delete reports it missing is forgotten with a
    /// warning, but only once storage confirms it is no longer a subvolume.
    /// Any other delete failure is persisted as far as it got and returned.
    pub async fn delete_volume(
        &self,
        store: &mut ConfigStore,
        volume: &str,
        delete_snapshots: bool,
    ) -> Result<VolumeConfig> {
        if delete_snapshots {
            let config = store.volume_mut(volume)?;
            let records: Vec<SnapshotRecord> = config.snapshots().to_vec();
            let mut failure = None;

            for record in &records {
                if let Err(e) = self.delete_or_confirm_gone(record.path()).await {
                    failure = Some(e);
                    break;
                }
                config.remove(record.name());
            }

            if failure.is_none() {
                let dir = config.snapshot_dir().to_path_buf();
                if let Err(e) = self.delete_or_confirm_gone(&dir).await {
                    failure = Some(e);
                }
            }

            if let Some(e) = failure {
                store.save()?;
                return Err(e.into());
            }
        }

        let removed = store.remove(volume)?;
        store.save()?;
        info!(volume, "removed volume config");
        Ok(removed)
    }

    /// Delete `path`, accepting a not-found failure only when the subvolume
    /// is verifiably absent.
    async fn delete_or_confirm_gone(&self, path: &Path) -> std::result::Result<(), StorageError> {
        match self.storage.delete(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind == StorageErrorKind::NotFound => {
                if self.storage.subvolume_exists(path).await? {
                    return Err(e);
                }
                warn!(path = %path.display(), "subvolume already gone; forgetting it");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Write the send stream between two snapshots of `volume` to `output`.
    pub async fn diff(
        &self,
        store: &ConfigStore,
        volume: &str,
        name_a: &str,
        name_b: &str,
        output: &Path,
    ) -> Result<()> {
        let config = store.volume(volume)?;
        let find = |name: &str| {
            config.find(name).ok_or_else(|| Error::SnapshotNotFound {
                volume: volume.to_string(),
                name: name.to_string(),
            })
        };
        let a = find(name_a)?;
        let b = find(name_b)?;

        self.storage.diff(Some(a.path()), b.path(), output).await?;
        Ok(())
    }
}

fn should_skip(
    config: &VolumeConfig,
    context: RunContext,
    now: DateTime<FixedOffset>,
    dedup: Dedup,
) -> bool {
    let bucket = match (context, dedup) {
        (RunContext::Scheduled(bucket), Dedup::SkipSamePeriod) => bucket,
        _ => return false,
    };
    config
        .snapshots()
        .iter()
        .rev()
        .find(|r| r.kind().bucket() == Some(bucket))
        .map_or(false, |newest| same_period(bucket, now, newest.created()))
}

/// `<volume>/<parent>::<snapshot>`, or `<volume>/init::<snapshot>` for a
/// full stream.
pub fn remote_id(volume: &str, parent: Option<&SnapshotRecord>, record: &SnapshotRecord) -> String {
    let base = parent.map(|p| p.name()).unwrap_or("init");
    format!("{}/{}::{}", volume, base, record.name())
}
