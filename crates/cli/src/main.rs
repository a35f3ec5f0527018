//! btrfs snapshot manager - sbm command

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use sbm_core::Bucket;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;

mod cmd;
mod locks;
mod settings;
mod util;

/// Snapshot retention and lifecycle manager for btrfs volumes
#[derive(Parser)]
#[command(name = "sbm")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding btrfs-sbm.toml and btrfs-sbm-default.toml
    #[arg(long, global = true, default_value = "/etc/conf.d")]
    sysconfig_dir: PathBuf,

    /// Directory for the invocation lock file
    #[arg(long, global = true, default_value = "/tmp")]
    lock_dir: PathBuf,

    /// Maximum log level (error, warn, info, debug, trace, off)
    #[arg(long, global = true, default_value = "warn")]
    log_level: LevelFilter,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Snapshot and prune every configured volume for one schedule tick
    Run {
        /// hourly, daily, weekly, monthly or yearly
        granularity: Bucket,
        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage snapshots of one volume
    #[command(subcommand)]
    Snapshot(SnapshotCommands),
    /// Manage volume configs
    #[command(subcommand)]
    Config(ConfigCommands),
    /// Write the send stream from snapshot A to snapshot B
    Diff {
        volume: String,
        snapshot_a: String,
        snapshot_b: String,
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum SnapshotCommands {
    /// Take a snapshot now and prune the volume
    Create {
        volume: String,
        /// Record as a manual snapshot, exempt from pruning
        #[arg(long)]
        manual: bool,
        #[arg(long)]
        json: bool,
    },
    /// List snapshots, newest first
    List {
        /// Volume name (default: all volumes)
        volume: Option<String>,
    },
    /// Delete one snapshot
    Delete {
        volume: String,
        name: String,
        /// Allow deleting init and manual snapshots
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Register a volume and take its init snapshot
    Create(CreateConfig),
    /// List volume configs
    List,
    /// Print one volume config
    Show { name: String },
    /// Remove a volume config
    Delete {
        name: String,
        /// Also delete every snapshot and the snapshot subvolume
        #[arg(long)]
        delete_snapshots: bool,
    },
    /// Print an example settings file
    Example,
}

#[derive(Args)]
struct CreateConfig {
    /// Path of the subvolume to manage
    path: PathBuf,
    /// Config name (default: last path component)
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    keep_hourly: Option<u32>,
    #[arg(long)]
    keep_daily: Option<u32>,
    #[arg(long)]
    keep_weekly: Option<u32>,
    #[arg(long)]
    keep_monthly: Option<u32>,
    #[arg(long)]
    keep_yearly: Option<u32>,
    /// Also expire non-protected snapshots older than this
    #[arg(long)]
    max_age_hours: Option<u32>,
}

impl From<CreateConfig> for cmd::config::CreateArgs {
    fn from(args: CreateConfig) -> Self {
        Self {
            path: args.path,
            name: args.name,
            keep: vec![
                (Bucket::Hourly, args.keep_hourly),
                (Bucket::Daily, args.keep_daily),
                (Bucket::Weekly, args.keep_weekly),
                (Bucket::Monthly, args.keep_monthly),
                (Bucket::Yearly, args.keep_yearly),
            ],
            max_age_hours: args.max_age_hours,
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let _guard = init_logging(cli.log_level, cli.log_file.as_deref())?;

    if let Commands::Config(ConfigCommands::Example) = cli.command {
        cmd::config::example();
        return Ok(ExitCode::SUCCESS);
    }

    let _lock = locks::InvocationLock::acquire(&cli.lock_dir)?;
    let env = util::Env::load(&cli.sysconfig_dir)?;

    let success = match cli.command {
        Commands::Run { granularity, json } => cmd::run::run(&env, granularity, json).await?,
        Commands::Snapshot(snapshot_cmd) => match snapshot_cmd {
            SnapshotCommands::Create { volume, manual, json } => {
                cmd::snapshot::create(&env, &volume, manual, json).await?
            }
            SnapshotCommands::List { volume } => {
                cmd::snapshot::list(&env, volume.as_deref()).await?;
                true
            }
            SnapshotCommands::Delete { volume, name, force } => {
                cmd::snapshot::delete(&env, &volume, &name, force).await?;
                true
            }
        },
        Commands::Config(config_cmd) => {
            match config_cmd {
                ConfigCommands::Create(args) => cmd::config::create(&env, args.into()).await?,
                ConfigCommands::List => cmd::config::list(&env).await?,
                ConfigCommands::Show { name } => cmd::config::show(&env, &name).await?,
                ConfigCommands::Delete { name, delete_snapshots } => {
                    cmd::config::delete(&env, &name, delete_snapshots).await?
                }
                ConfigCommands::Example => cmd::config::example(),
            }
            true
        }
        Commands::Diff { volume, snapshot_a, snapshot_b, output } => {
            cmd::diff::run(&env, &volume, &snapshot_a, &snapshot_b, output).await?;
            true
        }
    };

    Ok(if success { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

/// Install the fmt subscriber, writing to `log_file` when given.
///
/// The returned guard flushes the file writer on drop.
fn init_logging(level: LevelFilter, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let builder = tracing_subscriber::fmt().with_max_level(level);

    match log_file {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
            let file_name = path
                .file_name()
                .with_context(|| format!("Invalid log file path {}", path.display()))?;
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;

            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            builder.with_writer(writer).with_ansi(false).init();
            Ok(Some(guard))
        }
        None => {
            builder.with_writer(std::io::stderr).init();
            Ok(None)
        }
    }
}
