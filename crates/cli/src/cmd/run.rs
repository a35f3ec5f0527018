//! Scheduled run over every configured volume

use crate::util::{self, Env};
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use sbm_core::{Bucket, RunContext};
use sbm_lifecycle::{RunCoordinator, RunSummary};
use std::time::Duration;

/// Returns whether every volume finished its cycle.
pub async fn run(env: &Env, granularity: Bucket, json: bool) -> Result<bool> {
    let mut store = env.load_store()?;
    if store.is_empty() {
        tracing::warn!(path = %env.store_path().display(), "no volume configs; nothing to do");
    }

    let storage = env.storage();
    let uploader = env.uploader()?;
    let manager = env.manager(&storage, uploader.as_ref());

    let spinner = (!json).then(|| {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(format!("{} run over {} volume(s)", granularity, store.len()));
        pb.enable_steady_tick(Duration::from_millis(120));
        pb
    });

    let summary = RunCoordinator::new(&manager)
        .run(&mut store, RunContext::Scheduled(granularity), util::now())
        .await;

    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    report(&summary, json)?;
    Ok(summary.is_success())
}

pub fn report(summary: &RunSummary, json: bool) -> Result<()> {
    if json {
        let out = serde_json::to_string_pretty(summary).context("Failed to serialize run summary")?;
        println!("{}", out);
    } else {
        util::print_summary(summary);
    }
    Ok(())
}
