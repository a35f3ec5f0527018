//! Common utilities for integration tests

pub mod cli;

use std::path::PathBuf;
use tempfile::TempDir;

/// Scratch sysconfig and lock directories for one test
pub struct TestHost {
    _root: TempDir,
    pub sysconfig_dir: PathBuf,
    pub lock_dir: PathBuf,
}

impl TestHost {
    pub fn new() -> Self {
        let root = TempDir::new().unwrap();
        let sysconfig_dir = root.path().join("conf.d");
        let lock_dir = root.path().join("lock");
        std::fs::create_dir_all(&sysconfig_dir).unwrap();
        Self {
            _root: root,
            sysconfig_dir,
            lock_dir,
        }
    }

    pub fn store_path(&self) -> PathBuf {
        self.sysconfig_dir.join("btrfs-sbm.toml")
    }

    pub fn write_store(&self, text: &str) {
        std::fs::write(self.store_path(), text).unwrap();
    }

    pub fn read_store(&self) -> String {
        std::fs::read_to_string(self.store_path()).unwrap()
    }
}

/// Store with one volume holding an init, two hourly and a manual snapshot
pub const HOME_STORE: &str = r#"[configs.home]
name = "home"
path = "/home"
snapshot-dir = "/home/.snapshots"

[configs.home.options]
keep-daily = 10
keep-hourly = 10
keep-monthly = 10
keep-weekly = 0
keep-yearly = 10

[configs.home.snapshots."home-2024-01-01T00:00:00.000000+00:00"]
name = "home-2024-01-01T00:00:00.000000+00:00"
path = "/home/.snapshots/home-2024-01-01T00:00:00.000000+00:00"
creation-date-time = "2024-01-01T00:00:00.000000+00:00"
type = "init"

[configs.home.snapshots."home-2024-01-01T01:00:00.000000+00:00"]
name = "home-2024-01-01T01:00:00.000000+00:00"
path = "/home/.snapshots/home-2024-01-01T01:00:00.000000+00:00"
creation-date-time = "2024-01-01T01:00:00.000000+00:00"
type = "hourly"

[configs.home.snapshots."home-2024-01-01T02:00:00.000000+00:00"]
name = "home-2024-01-01T02:00:00.000000+00:00"
path = "/home/.snapshots/home-2024-01-01T02:00:00.000000+00:00"
creation-date-time = "2024-01-01T02:00:00.000000+00:00"
type = "hourly"

[configs.home.snapshots."home-2024-01-01T02:30:00.000000+00:00"]
name = "home-2024-01-01T02:30:00.000000+00:00"
path = "/home/.snapshots/home-2024-01-01T02:30:00.000000+00:00"
creation-date-time = "2024-01-01T02:30:00.000000+00:00"
type = "manual"
"#;
