//! Persisted config store
//!
//! The store is a single TOML document:
//! ```toml
//! [configs.home]
//! name = "home"
//! path = "/home"
//! snapshot-dir = "/home/.snapshots"
//!
//! [configs.home.options]
//! keep-daily = 10
//! keep-hourly = 10
//!
//! [configs.home.snapshots."home-2024-01-01T00:00:00.000000+00:00"]
//! name = "home-2024-01-01T00:00:00.000000+00:00"
//! path = "/home/.snapshots/home-2024-01-01T00:00:00.000000+00:00"
//! creation-date-time = "2024-01-01T00:00:00.000000+00:00"
//! type = "init"
//! ```
//!
//! It is read once per invocation, mutated in memory and written back with
//! write-temp-then-rename so concurrent readers only ever see a complete
//! document.

use crate::volume::VolumeConfig;
use sbm_core::{Error, Result};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
struct StoreDocument {
    #[serde(default, with = "ordered_configs")]
    configs: Vec<VolumeConfig>,
}

/// All volume configs of one host, in document order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigStore {
    path: PathBuf,
    volumes: Vec<VolumeConfig>,
}

impl ConfigStore {
    /// Empty store that will be saved to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            volumes: Vec::new(),
        }
    }

    /// Load the store from `path`. A missing file yields an empty store.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(path = %path.display(), "config store not found; starting empty");
            return Ok(Self::new(path));
        }

        let text = fs::read_to_string(path).map_err(|e| {
            Error::InvalidStore(format!("failed to read {}: {}", path.display(), e))
        })?;
        let store = Self::from_toml_str(path, &text)?;
        debug!(path = %path.display(), volumes = store.volumes.len(), "loaded config store");
        Ok(store)
    }

    /// Parse a store document. `path` is where it will be saved.
    pub fn from_toml_str(path: impl Into<PathBuf>, text: &str) -> Result<Self> {
        let doc: StoreDocument =
            toml::from_str(text).map_err(|e| Error::InvalidStore(e.to_string()))?;

        Ok(Self {
            path: path.into(),
            volumes: doc.configs,
        })
    }

    pub fn to_toml_string(&self) -> Result<String> {
        let doc = StoreDocument {
            configs: self.volumes.clone(),
        };
        toml::to_string(&doc).map_err(|e| Error::PersistenceFailed {
            path: self.path.clone(),
            message: e.to_string(),
        })
    }

    /// Durably write the store.
    ///
    /// The previous file is copied to `<path>.bak` first. The new document
    /// is written to a temp file in the same directory, synced, and renamed
    /// over the target.
    pub fn save(&self) -> Result<()> {
        let text = self.to_toml_string()?;
        let fail = |message: String| Error::PersistenceFailed {
            path: self.path.clone(),
            message,
        };

        if self.path.exists() {
            let backup = backup_path(&self.path);
            fs::copy(&self.path, &backup)
                .map_err(|e| fail(format!("failed to back up to {}: {}", backup.display(), e)))?;
        }

        atomic_write(&self.path, text.as_bytes()).map_err(|e| fail(e.to_string()))?;
        info!(path = %self.path.display(), "saved config store");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, name: &str) -> Option<&VolumeConfig> {
        self.volumes.iter().find(|v| v.name() == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut VolumeConfig> {
        self.volumes.iter_mut().find(|v| v.name() == name)
    }

    pub fn volume(&self, name: &str) -> Result<&VolumeConfig> {
        self.get(name)
            .ok_or_else(|| Error::VolumeNotFound(name.to_string()))
    }

    pub fn volume_mut(&mut self, name: &str) -> Result<&mut VolumeConfig> {
        self.get_mut(name)
            .ok_or_else(|| Error::VolumeNotFound(name.to_string()))
    }

    /// Add a new volume after the existing ones.
    pub fn insert(&mut self, volume: VolumeConfig) -> Result<()> {
        if self.get(volume.name()).is_some() {
            return Err(Error::VolumeExists(volume.name().to_string()));
        }
        self.volumes.push(volume);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Result<VolumeConfig> {
        let pos = self
            .volumes
            .iter()
            .position(|v| v.name() == name)
            .ok_or_else(|| Error::VolumeNotFound(name.to_string()))?;
        Ok(self.volumes.remove(pos))
    }

    /// Volume names in document order.
    pub fn names(&self) -> Vec<String> {
        self.volumes.iter().map(|v| v.name().to_string()).collect()
    }

    pub fn volumes(&self) -> impl Iterator<Item = &VolumeConfig> {
        self.volumes.iter()
    }

    pub fn len(&self) -> usize {
        self.volumes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty()
    }
}

/// Configs persist as a table keyed by volume name, in the order the
/// document lists them.
mod ordered_configs {
    use super::*;

    pub fn serialize<S: Serializer>(volumes: &[VolumeConfig], s: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = s.serialize_map(Some(volumes.len()))?;
        for volume in volumes {
            map.serialize_entry(volume.name(), volume)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Vec<VolumeConfig>, D::Error> {
        d.deserialize_map(ConfigsVisitor)
    }

    struct ConfigsVisitor;

    impl<'de> Visitor<'de> for ConfigsVisitor {
        type Value = Vec<VolumeConfig>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a table of volume configs keyed by name")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Self::Value, A::Error> {
            let mut volumes = Vec::new();
            let mut seen = HashSet::new();
            while let Some((key, mut volume)) = access.next_entry::<String, VolumeConfig>()? {
                if !seen.insert(key.clone()) {
                    return Err(serde::de::Error::custom(format!("duplicate config '{}'", key)));
                }
                volume.check_loaded(&key).map_err(serde::de::Error::custom)?;
                volumes.push(volume);
            }
            Ok(volumes)
        }
    }
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".bak");
    PathBuf::from(name)
}

/// Atomic write helper
///
/// Writes data to a temporary file next to `target`, fsyncs it, renames it
/// over `target`, then fsyncs the parent directory.
pub fn atomic_write(target: &Path, data: &[u8]) -> std::io::Result<()> {
    let parent = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)?;

    let mut tmp = tempfile::NamedTempFile::new_in(&parent)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(target).map_err(|e| e.error)?;

    #[cfg(unix)]
    fs::File::open(&parent)?.sync_all()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sbm_core::policy::PolicyOptions;
    use sbm_core::snapshot::parse_timestamp;
    use sbm_core::{SnapshotRecord, SnapshotType};
    use tempfile::TempDir;

    const SAMPLE: &str = r#"[configs.home]
name = "home"
path = "/home"
snapshot-dir = "/home/.snapshots"

[configs.home.options]
keep-daily = 7
keep-hourly = 24
keep-monthly = 6
keep-weekly = 0
keep-yearly = 2

[configs.home.snapshots."home-2024-01-01T00:00:00.000000+00:00"]
name = "home-2024-01-01T00:00:00.000000+00:00"
path = "/home/.snapshots/home-2024-01-01T00:00:00.000000+00:00"
creation-date-time = "2024-01-01T00:00:00.000000+00:00"
type = "init"

[configs.home.snapshots."home-2024-01-01T01:00:00.000017+00:00"]
name = "home-2024-01-01T01:00:00.000017+00:00"
path = "/home/.snapshots/home-2024-01-01T01:00:00.000017+00:00"
creation-date-time = "2024-01-01T01:00:00.000017+00:00"
type = "hourly"
"#;

    fn sample_store(dir: &Path) -> ConfigStore {
        let mut store = ConfigStore::new(dir.join("btrfs-sbm.toml"));
        let options: PolicyOptions = [("keep-hourly".to_string(), 3)].into_iter().collect();
        let mut vol = VolumeConfig::new("data", "/data", "/data/.snapshots", options);
        let ts = parse_timestamp("2024-06-01T12:00:00.123456+02:00").unwrap();
        vol.push(SnapshotRecord::new("data", Path::new("/data/.snapshots"), ts, SnapshotType::Init))
            .unwrap();
        store.insert(vol).unwrap();
        store
    }

    #[test]
    fn test_document_round_trip_is_byte_stable() {
        let store = ConfigStore::from_toml_str("/tmp/x.toml", SAMPLE).unwrap();
        assert_eq!(store.to_toml_string().unwrap(), SAMPLE);

        let home = store.get("home").unwrap();
        assert_eq!(home.snapshots().len(), 2);
        assert_eq!(home.snapshots()[0].kind(), SnapshotType::Init);
        assert_eq!(home.options()["keep-hourly"], 24);
    }

    #[test]
    fn test_save_then_load_is_identity() {
        let dir = TempDir::new().unwrap();
        let store = sample_store(dir.path());
        store.save().unwrap();

        let loaded = ConfigStore::load(store.path()).unwrap();
        assert_eq!(loaded, store);
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::load(&dir.path().join("absent.toml")).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_save_keeps_backup_and_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let mut store = sample_store(dir.path());
        store.save().unwrap();

        store.remove("data").unwrap();
        store.save().unwrap();

        let backup = ConfigStore::from_toml_str(
            store.path(),
            &fs::read_to_string(dir.path().join("btrfs-sbm.toml.bak")).unwrap(),
        )
        .unwrap();
        assert!(backup.get("data").is_some());

        let entries: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(entries.len(), 2, "unexpected files: {:?}", entries);
    }

    #[test]
    fn test_mismatched_key_rejected() {
        let text = SAMPLE.replacen("[configs.home]", "[configs.other]", 1);
        assert!(ConfigStore::from_toml_str("/tmp/x.toml", &text).is_err());
    }

    #[test]
    fn test_invalid_policy_still_loads() {
        let text = SAMPLE.replace("keep-weekly = 0", "keep-weekly = -4");
        let store = ConfigStore::from_toml_str("/tmp/x.toml", &text).unwrap();
        assert!(store.get("home").unwrap().policy().is_err());
    }

    #[test]
    fn test_out_of_order_snapshots_sorted_on_load() {
        let text = r#"[configs.v]
name = "v"
path = "/v"
snapshot-dir = "/v/.snapshots"

[configs.v.snapshots.b]
name = "b"
path = "/v/.snapshots/b"
creation-date-time = "2024-01-02T00:00:00.000000+00:00"
type = "daily"

[configs.v.snapshots.a]
name = "a"
path = "/v/.snapshots/a"
creation-date-time = "2024-01-01T00:00:00.000000+00:00"
type = "init"
"#;
        let store = ConfigStore::from_toml_str("/tmp/x.toml", text).unwrap();
        let names: Vec<_> = store.get("v").unwrap().snapshots().iter().map(|r| r.name().to_string()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_volume_order_is_preserved() {
        let text = r#"[configs.zeta]
name = "zeta"
path = "/zeta"
snapshot-dir = "/zeta/.snapshots"

[configs.zeta.options]
keep-daily = 3

[configs.zeta.snapshots."zeta-2024-01-01T00:00:00.000000+00:00"]
name = "zeta-2024-01-01T00:00:00.000000+00:00"
path = "/zeta/.snapshots/zeta-2024-01-01T00:00:00.000000+00:00"
creation-date-time = "2024-01-01T00:00:00.000000+00:00"
type = "init"

[configs.alpha]
name = "alpha"
path = "/alpha"
snapshot-dir = "/alpha/.snapshots"

[configs.alpha.options]
keep-hourly = 5

[configs.alpha.snapshots."alpha-2024-01-01T00:00:00.000000+00:00"]
name = "alpha-2024-01-01T00:00:00.000000+00:00"
path = "/alpha/.snapshots/alpha-2024-01-01T00:00:00.000000+00:00"
creation-date-time = "2024-01-01T00:00:00.000000+00:00"
type = "init"
"#;
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("btrfs-sbm.toml");
        fs::write(&path, text).unwrap();

        let mut store = ConfigStore::load(&path).unwrap();
        assert_eq!(store.names(), vec!["zeta", "alpha"]);
        assert_eq!(store.to_toml_string().unwrap(), text);

        store.save().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), text);

        store
            .insert(VolumeConfig::new("mid", "/mid", "/mid/.snapshots", PolicyOptions::new()))
            .unwrap();
        store.remove("zeta").unwrap();
        assert_eq!(store.names(), vec!["alpha", "mid"]);
    }

    #[test]
    fn test_insert_existing_fails() {
        let dir = TempDir::new().unwrap();
        let mut store = sample_store(dir.path());
        let dup = VolumeConfig::new("data", "/data", "/data/.snapshots", PolicyOptions::new());
        assert!(matches!(store.insert(dup), Err(Error::VolumeExists(_))));
    }
}
