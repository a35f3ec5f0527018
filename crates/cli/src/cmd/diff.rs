//! Export the send stream between two snapshots

use crate::util::Env;
use anyhow::{Context, Result};
use std::path::PathBuf;

pub async fn run(env: &Env, volume: &str, snapshot_a: &str, snapshot_b: &str, output: Option<PathBuf>) -> Result<()> {
    let store = env.load_store()?;
    let storage = env.storage();
    let manager = env.manager(&storage, None);

    match output {
        Some(path) => {
            manager
                .diff(&store, volume, snapshot_a, snapshot_b, &path)
                .await
                .context("Failed to export diff")?;
            eprintln!("Wrote {}", path.display());
        }
        None => {
            let temp = tempfile::NamedTempFile::new().context("Failed to create temp file")?;
            manager
                .diff(&store, volume, snapshot_a, snapshot_b, temp.path())
                .await
                .context("Failed to export diff")?;
            let mut file = temp.reopen().context("Failed to reopen diff output")?;
            std::io::copy(&mut file, &mut std::io::stdout().lock()).context("Failed to write diff to stdout")?;
        }
    }
    Ok(())
}
