//! Per-volume configuration and ordered snapshot history

use sbm_core::policy::{self, PolicyOptions, RetentionPolicy};
use sbm_core::{Error, PolicyError, Result, SnapshotRecord};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Configuration of one volume plus its snapshot history
///
/// `snapshots` is kept in chronological order; ties keep insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct VolumeConfig {
    name: String,
    path: PathBuf,
    snapshot_dir: PathBuf,
    #[serde(default)]
    options: PolicyOptions,
    #[serde(default, with = "ordered_snapshots")]
    snapshots: Vec<SnapshotRecord>,
}

impl VolumeConfig {
    pub fn new(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        snapshot_dir: impl Into<PathBuf>,
        options: PolicyOptions,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            snapshot_dir: snapshot_dir.into(),
            options,
            snapshots: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Source volume path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot storage location
    pub fn snapshot_dir(&self) -> &Path {
        &self.snapshot_dir
    }

    pub fn options(&self) -> &PolicyOptions {
        &self.options
    }

    pub fn set_options(&mut self, options: PolicyOptions) {
        self.options = options;
    }

    /// Validated retention policy for this volume.
    pub fn policy(&self) -> std::result::Result<RetentionPolicy, PolicyError> {
        policy::validate(&self.options)
    }

    pub fn snapshots(&self) -> &[SnapshotRecord] {
        &self.snapshots
    }

    pub fn find(&self, name: &str) -> Option<&SnapshotRecord> {
        self.snapshots.iter().find(|r| r.name() == name)
    }

    /// Most recently created snapshot.
    pub fn newest(&self) -> Option<&SnapshotRecord> {
        self.snapshots.last()
    }

    /// Record a snapshot that now exists on storage.
    ///
    /// A record older than the current newest (wall clock stepped back) is
    /// placed at its chronological position rather than appended.
    pub fn push(&mut self, record: SnapshotRecord) -> Result<()> {
        self.ensure_insertable(&record)?;

        let pos = self
            .snapshots
            .partition_point(|r| r.created() <= record.created());
        if pos < self.snapshots.len() {
            warn!(
                volume = %self.name,
                snapshot = record.name(),
                "snapshot is older than existing history; clock moved backwards?"
            );
        }
        self.snapshots.insert(pos, record);
        Ok(())
    }

    /// Forget a snapshot. Only call once it no longer exists on storage.
    pub fn remove(&mut self, name: &str) -> Option<SnapshotRecord> {
        let pos = self.snapshots.iter().position(|r| r.name() == name)?;
        Some(self.snapshots.remove(pos))
    }

    /// Fails if `record` would duplicate a name or path, or lies outside the
    /// snapshot storage location.
    pub fn ensure_insertable(&self, record: &SnapshotRecord) -> Result<()> {
        if self
            .snapshots
            .iter()
            .any(|r| r.name() == record.name() || r.path() == record.path())
        {
            return Err(Error::DuplicateSnapshot {
                volume: self.name.clone(),
                name: record.name().to_string(),
            });
        }
        if !record.path().starts_with(&self.snapshot_dir) || record.path() == self.snapshot_dir {
            return Err(Error::InvalidStore(format!(
                "snapshot path {} is not under {}",
                record.path().display(),
                self.snapshot_dir.display()
            )));
        }
        Ok(())
    }

    /// Check the structural invariants of a loaded config.
    ///
    /// Restores chronological order if the document listed snapshots out of
    /// order. The retention policy is not checked here so that a bad policy
    /// only fails its own volume's run.
    pub(crate) fn check_loaded(&mut self, key: &str) -> Result<()> {
        if self.name != key {
            return Err(Error::InvalidStore(format!(
                "config table '{}' has name '{}'",
                key, self.name
            )));
        }

        let mut paths = HashSet::new();
        for record in &self.snapshots {
            if !paths.insert(record.path().to_path_buf()) {
                return Err(Error::InvalidStore(format!(
                    "volume '{}' lists path {} twice",
                    self.name,
                    record.path().display()
                )));
            }
            if !record.path().starts_with(&self.snapshot_dir) {
                return Err(Error::InvalidStore(format!(
                    "snapshot {} of volume '{}' is not under {}",
                    record.name(),
                    self.name,
                    self.snapshot_dir.display()
                )));
            }
        }

        if self.snapshots.windows(2).any(|w| w[0].created() > w[1].created()) {
            warn!(volume = %self.name, "snapshots listed out of order; sorting by creation time");
            self.snapshots.sort_by_key(|r| r.created());
        }
        Ok(())
    }
}

/// Snapshots persist as a table keyed by name, in history order.
mod ordered_snapshots {
    use super::*;

    pub fn serialize<S: Serializer>(records: &[SnapshotRecord], s: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = s.serialize_map(Some(records.len()))?;
        for record in records {
            map.serialize_entry(record.name(), record)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Vec<SnapshotRecord>, D::Error> {
        d.deserialize_map(RecordsVisitor)
    }

    struct RecordsVisitor;

    impl<'de> Visitor<'de> for RecordsVisitor {
        type Value = Vec<SnapshotRecord>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a table of snapshot records keyed by name")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Self::Value, A::Error> {
            let mut records = Vec::new();
            let mut seen = HashSet::new();
            while let Some((key, record)) = access.next_entry::<String, SnapshotRecord>()? {
                if key != record.name() {
                    return Err(serde::de::Error::custom(format!(
                        "snapshot table '{}' has name '{}'",
                        key,
                        record.name()
                    )));
                }
                if !seen.insert(key.clone()) {
                    return Err(serde::de::Error::custom(format!("duplicate snapshot '{}'", key)));
                }
                records.push(record);
            }
            Ok(records)
        }
    }
}
