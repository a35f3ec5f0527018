//! Shared utilities for CLI commands

use crate::settings::{Settings, SETTINGS_FILE, STORE_FILE};
use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, Local};
use owo_colors::OwoColorize;
use sbm_btrfs::{BtrfsCli, CommandUploader};
use sbm_journal::ConfigStore;
use sbm_lifecycle::{Backup, RunSummary, VolumeManager, VolumeReport};
use std::path::{Path, PathBuf};

/// Paths and settings every command needs
pub struct Env {
    pub sysconfig_dir: PathBuf,
    pub settings: Settings,
}

impl Env {
    pub fn load(sysconfig_dir: &Path) -> Result<Self> {
        let settings = Settings::load(&sysconfig_dir.join(SETTINGS_FILE))?;
        Ok(Self {
            sysconfig_dir: sysconfig_dir.to_path_buf(),
            settings,
        })
    }

    pub fn store_path(&self) -> PathBuf {
        self.sysconfig_dir.join(STORE_FILE)
    }

    pub fn load_store(&self) -> Result<ConfigStore> {
        let path = self.store_path();
        ConfigStore::load(&path)
            .with_context(|| format!("Failed to load config store {}", path.display()))
    }

    pub fn storage(&self) -> BtrfsCli {
        BtrfsCli::new(self.settings.engine.command_timeout())
    }

    /// Uploader for the `[backup]` table, if enabled
    pub fn uploader(&self) -> Result<Option<CommandUploader>> {
        let backup = &self.settings.backup;
        if !backup.enabled {
            return Ok(None);
        }
        let timeout = self.settings.engine.command_timeout();
        let uploader = match (&backup.command, &backup.bucket) {
            (Some(command), _) => CommandUploader::new(command.clone(), timeout)?,
            (None, Some(bucket)) => CommandUploader::b2(bucket, timeout),
            (None, None) => anyhow::bail!("backup is enabled but no bucket or command is configured"),
        };
        Ok(Some(uploader))
    }

    /// Volume manager wired to `storage` and the optional uploader
    pub fn manager<'a>(
        &self,
        storage: &'a BtrfsCli,
        uploader: Option<&'a CommandUploader>,
    ) -> VolumeManager<'a> {
        let manager = VolumeManager::new(storage);
        match uploader {
            Some(target) => manager.with_backup(Backup {
                target,
                staging_dir: self.settings.backup.staging_dir.clone(),
            }),
            None => manager,
        }
    }
}

/// Current local time with its UTC offset
pub fn now() -> DateTime<FixedOffset> {
    Local::now().into()
}

/// Format an age as "3 hours ago"
pub fn format_age(created: DateTime<FixedOffset>, now: DateTime<FixedOffset>) -> String {
    let seconds = (now - created).num_seconds();
    if seconds < 0 {
        "in the future".to_string()
    } else if seconds < 60 {
        format!("{} seconds ago", seconds)
    } else if seconds < 3600 {
        format!("{} minutes ago", seconds / 60)
    } else if seconds < 86400 {
        format!("{} hours ago", seconds / 3600)
    } else if seconds < 604800 {
        format!("{} days ago", seconds / 86400)
    } else {
        format!("{} weeks ago", seconds / 604800)
    }
}

/// Print a run summary for humans
pub fn print_summary(summary: &RunSummary) {
    for report in &summary.volumes {
        print_report(report);
    }

    let failed = summary.failed().count();
    println!();
    if failed == 0 {
        println!(
            "{} {} volume(s) processed",
            "✓".green(),
            summary.volumes.len()
        );
    } else {
        println!(
            "{} {} of {} volume(s) failed",
            "✗".red(),
            failed,
            summary.volumes.len()
        );
    }
}

pub fn print_report(report: &VolumeReport) {
    let status = if report.is_success() {
        "ok".green().to_string()
    } else {
        "failed".red().bold().to_string()
    };
    println!("{} [{}]", report.volume.bold(), status);

    match &report.created {
        Some(created) => println!("  created  {} ({})", created.name.cyan(), created.kind),
        None if report.skipped_creation => {
            println!("  {}", "creation skipped: already snapshotted this period".dimmed())
        }
        None => {}
    }
    if let Some(remote) = &report.uploaded {
        println!("  uploaded {}", remote.dimmed());
    }
    for name in &report.deleted {
        println!("  deleted  {}", name.yellow());
    }
    for name in &report.remaining {
        println!("  {} {}", "pending ".red(), name);
    }
    for failure in &report.failures {
        println!("  {} {}", "error:".red().bold(), failure);
    }
}
