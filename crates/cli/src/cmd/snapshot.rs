//! Per-volume snapshot commands

use crate::cmd::run::report;
use crate::util::{self, Env};
use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use sbm_core::{Bucket, RunContext};
use sbm_journal::VolumeConfig;
use sbm_lifecycle::{Dedup, RunCoordinator};

/// Take a snapshot of one volume now, then prune it.
///
/// Without `manual` the snapshot is an `hourly` one.
pub async fn create(env: &Env, volume: &str, manual: bool, json: bool) -> Result<bool> {
    let mut store = env.load_store()?;
    store.volume(volume)?;

    let storage = env.storage();
    let uploader = env.uploader()?;
    let manager = env.manager(&storage, uploader.as_ref());

    let context = if manual {
        RunContext::Manual
    } else {
        RunContext::Scheduled(Bucket::Hourly)
    };
    let summary = RunCoordinator::new(&manager)
        .with_dedup(Dedup::Always)
        .run_volumes(&mut store, &[volume.to_string()], context, util::now())
        .await;

    report(&summary, json)?;
    Ok(summary.is_success())
}

/// List snapshots of one volume, or of every volume.
pub async fn list(env: &Env, volume: Option<&str>) -> Result<()> {
    let store = env.load_store()?;
    let now = util::now();

    match volume {
        Some(name) => print_volume(store.volume(name)?, now),
        None if store.is_empty() => println!("{}", "No volume configs".dimmed()),
        None => {
            for (i, config) in store.volumes().enumerate() {
                if i > 0 {
                    println!();
                }
                print_volume(config, now);
            }
        }
    }
    Ok(())
}

fn print_volume(config: &VolumeConfig, now: chrono::DateTime<chrono::FixedOffset>) {
    println!(
        "{} {} ({} snapshots)",
        config.name().bold(),
        config.path().display().dimmed(),
        config.snapshots().len()
    );
    if config.snapshots().is_empty() {
        println!("  {}", "(none)".dimmed());
        return;
    }
    for record in config.snapshots().iter().rev() {
        println!(
            "  {} {}  {}",
            format!("{:<8}", record.kind().as_str()).yellow(),
            record.name(),
            util::format_age(record.created(), now).dimmed()
        );
    }
}

pub async fn delete(env: &Env, volume: &str, name: &str, force: bool) -> Result<()> {
    let mut store = env.load_store()?;
    let storage = env.storage();
    let manager = env.manager(&storage, None);

    let record = manager
        .delete_snapshot(&mut store, volume, name, force)
        .await
        .with_context(|| format!("Failed to delete snapshot '{}'", name))?;

    println!("{} {} ({})", "Deleted".green(), record.name(), record.kind());
    Ok(())
}
