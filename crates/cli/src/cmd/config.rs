//! Volume config management

use crate::settings;
use crate::util::{self, Env};
use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use sbm_core::policy::MAX_AGE_KEY;
use sbm_core::Bucket;
use sbm_journal::VolumeConfig;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Options for `config create`
pub struct CreateArgs {
    pub path: PathBuf,
    pub name: Option<String>,
    pub keep: Vec<(Bucket, Option<u32>)>,
    pub max_age_hours: Option<u32>,
}

/// Register a volume and take its `init` snapshot.
pub async fn create(env: &Env, args: CreateArgs) -> Result<()> {
    let path = args
        .path
        .canonicalize()
        .with_context(|| format!("Volume path {} does not exist", args.path.display()))?;
    let name = match args.name {
        Some(name) => name,
        None => volume_name(&path),
    };
    if name.is_empty() || name.contains('/') {
        anyhow::bail!("Invalid volume name '{}'", name);
    }

    let mut options = env.settings.defaults.options_with(&args.keep);
    if let Some(hours) = args.max_age_hours {
        options.insert(MAX_AGE_KEY.to_string(), i64::from(hours));
    }
    let snapshot_dir = path.join(&env.settings.engine.snapshot_subvol_name);
    let config = VolumeConfig::new(&name, &path, snapshot_dir, options);

    let mut store = env.load_store()?;
    let storage = env.storage();
    let manager = env.manager(&storage, None);
    let init = manager
        .create_volume(&mut store, config, util::now())
        .await
        .with_context(|| format!("Failed to create config '{}'", name))?;

    println!("{} config '{}' for {}", "Created".green(), name.bold(), path.display());
    println!("  init snapshot {}", init.name().cyan());
    Ok(())
}

/// Default volume name: last path component, `root` for `/`.
fn volume_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "root".to_string())
}

pub async fn list(env: &Env) -> Result<()> {
    let store = env.load_store()?;
    if store.is_empty() {
        println!("{}", "No volume configs".dimmed());
        return Ok(());
    }

    for config in store.volumes() {
        let policy = match config.policy() {
            Ok(_) => Bucket::ALL
                .iter()
                .map(|b| {
                    let count = config.options().get(b.option_key()).copied().unwrap_or(0);
                    format!("{}={}", b, count)
                })
                .collect::<Vec<_>>()
                .join(" "),
            Err(e) => format!("{} {}", "invalid policy:".red(), e),
        };
        println!(
            "{:<16} {:<32} {:>4} snapshots  {}",
            config.name().bold().to_string(),
            config.path().display().to_string(),
            config.snapshots().len(),
            policy.dimmed()
        );
    }
    Ok(())
}

#[derive(Serialize)]
struct Shown<'a> {
    configs: BTreeMap<&'a str, &'a VolumeConfig>,
}

/// Print one volume's table as it is stored.
pub async fn show(env: &Env, name: &str) -> Result<()> {
    let store = env.load_store()?;
    let config = store.volume(name)?;
    let shown = Shown {
        configs: BTreeMap::from([(config.name(), config)]),
    };
    let text = toml::to_string(&shown).context("Failed to render config")?;
    print!("{}", text);
    Ok(())
}

pub async fn delete(env: &Env, name: &str, delete_snapshots: bool) -> Result<()> {
    let mut store = env.load_store()?;
    let storage = env.storage();
    let manager = env.manager(&storage, None);

    let removed = manager
        .delete_volume(&mut store, name, delete_snapshots)
        .await
        .with_context(|| format!("Failed to delete config '{}'", name))?;

    println!("{} config '{}'", "Deleted".green(), removed.name().bold());
    if !delete_snapshots && !removed.snapshots().is_empty() {
        println!(
            "  {} snapshot(s) left in {}",
            removed.snapshots().len(),
            removed.snapshot_dir().display()
        );
    }
    Ok(())
}

pub fn example() {
    print!("{}", settings::EXAMPLE);
}
