//! Engine settings file (`btrfs-sbm-default.toml`)
//!
//! Read-only from the tool's point of view. A missing file means defaults.

use anyhow::{Context, Result};
use sbm_core::{Bucket, PolicyOptions};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const SETTINGS_FILE: &str = "btrfs-sbm-default.toml";
pub const STORE_FILE: &str = "btrfs-sbm.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub defaults: Defaults,
    pub engine: Engine,
    pub backup: BackupSettings,
}

/// Keep counts given to new volume configs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct Defaults {
    pub keep_hourly: u32,
    pub keep_daily: u32,
    pub keep_weekly: u32,
    pub keep_monthly: u32,
    pub keep_yearly: u32,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            keep_hourly: 10,
            keep_daily: 10,
            keep_weekly: 0,
            keep_monthly: 10,
            keep_yearly: 10,
        }
    }
}

impl Defaults {
    pub fn keep(&self, bucket: Bucket) -> u32 {
        match bucket {
            Bucket::Hourly => self.keep_hourly,
            Bucket::Daily => self.keep_daily,
            Bucket::Weekly => self.keep_weekly,
            Bucket::Monthly => self.keep_monthly,
            Bucket::Yearly => self.keep_yearly,
        }
    }

    /// Policy options for a new config, with per-bucket overrides applied.
    pub fn options_with(&self, overrides: &[(Bucket, Option<u32>)]) -> PolicyOptions {
        Bucket::ALL
            .iter()
            .map(|&bucket| {
                let count = overrides
                    .iter()
                    .find(|(b, _)| *b == bucket)
                    .and_then(|(_, c)| *c)
                    .unwrap_or_else(|| self.keep(bucket));
                (bucket.option_key().to_string(), i64::from(count))
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct Engine {
    /// Upper bound on each external command
    pub command_timeout_secs: u64,
    /// Name of the snapshot storage subvolume inside each volume
    pub snapshot_subvol_name: String,
}

impl Default for Engine {
    fn default() -> Self {
        Self {
            command_timeout_secs: 300,
            snapshot_subvol_name: ".snapshots".to_string(),
        }
    }
}

impl Engine {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct BackupSettings {
    pub enabled: bool,
    /// Bucket for the default `b2` uploader
    pub bucket: Option<String>,
    /// Custom upload command; `{file}` and `{remote}` are substituted
    pub command: Option<Vec<String>>,
    pub staging_dir: PathBuf,
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            bucket: None,
            command: None,
            staging_dir: PathBuf::from("/var/tmp/btrfs-sbm"),
        }
    }
}

impl Settings {
    /// Load from `path`; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "settings file not found; using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        let settings: Settings = toml::from_str(&text)
            .with_context(|| format!("Invalid settings file {}", path.display()))?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.engine.command_timeout_secs == 0 {
            anyhow::bail!("engine.command-timeout-secs must be at least 1");
        }
        if self.engine.snapshot_subvol_name.is_empty() || self.engine.snapshot_subvol_name.contains('/') {
            anyhow::bail!(
                "engine.snapshot-subvol-name must be a single path component, got '{}'",
                self.engine.snapshot_subvol_name
            );
        }
        if self.backup.enabled {
            match (&self.backup.bucket, &self.backup.command) {
                (None, None) => anyhow::bail!("backup is enabled but neither backup.bucket nor backup.command is set"),
                (_, Some(cmd)) if cmd.is_empty() => anyhow::bail!("backup.command must not be empty"),
                _ => {}
            }
        }
        Ok(())
    }
}

/// Commented settings file printed by `config example`.
pub const EXAMPLE: &str = r#"# btrfs-sbm engine settings
# Place this file next to btrfs-sbm.toml (default: /etc/conf.d/btrfs-sbm-default.toml)

[defaults]
# Keep counts applied to `config create` unless overridden on the command line.
# A count of 0 keeps no snapshots of that type.
keep-hourly = 10
keep-daily = 10
keep-weekly = 0
keep-monthly = 10
keep-yearly = 10

[engine]
# Every btrfs/upload command is killed if it runs longer than this.
command-timeout-secs = 300
# Snapshot storage subvolume created inside each configured volume.
snapshot-subvol-name = ".snapshots"

[backup]
# Stream each new snapshot offsite (incremental against the previous one).
enabled = false
# Upload with `b2 upload-file <bucket> <file> <remote-id>`
bucket = "my-backup-bucket"
# Or supply your own command; {file} and {remote} are substituted.
# command = ["rclone", "copyto", "{file}", "remote:snapshots/{remote}"]
staging-dir = "/var/tmp/btrfs-sbm"
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let settings = Settings::load(&dir.path().join(SETTINGS_FILE)).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.defaults.keep(Bucket::Weekly), 0);
        assert_eq!(settings.engine.command_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn test_example_parses() {
        let settings: Settings = toml::from_str(EXAMPLE).unwrap();
        settings.validate().unwrap();
        assert!(!settings.backup.enabled);
        assert_eq!(settings.backup.bucket.as_deref(), Some("my-backup-bucket"));
    }

    #[test]
    fn test_partial_file() {
        let settings: Settings = toml::from_str("[defaults]\nkeep-daily = 3\n").unwrap();
        assert_eq!(settings.defaults.keep_daily, 3);
        assert_eq!(settings.defaults.keep_hourly, 10);
        assert_eq!(settings.engine.snapshot_subvol_name, ".snapshots");
    }

    #[test]
    fn test_rejects_unknown_keys_and_bad_values() {
        assert!(toml::from_str::<Settings>("[defaults]\nkeep-minutely = 3\n").is_err());

        let mut settings = Settings::default();
        settings.engine.command_timeout_secs = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.backup.enabled = true;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_options_with_overrides() {
        let defaults = Defaults::default();
        let options = defaults.options_with(&[(Bucket::Daily, Some(3)), (Bucket::Hourly, None)]);
        assert_eq!(options["keep-daily"], 3);
        assert_eq!(options["keep-hourly"], 10);
        assert_eq!(options["keep-weekly"], 0);
        assert_eq!(options.len(), 5);
    }
}
