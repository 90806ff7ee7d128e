//! lcmd — the cluster-group-lcm daemon.
//!
//! Single binary around the rollout controller:
//! - State store (redb)
//! - Reconcile scheduler with per-group backoff
//! - One-shot tooling: load records, print plans and statuses
//!
//! # Usage
//!
//! ```text
//! lcmd --config /etc/lcm/lcm.toml run
//! lcmd apply -f records.json
//! lcmd plan ztp/g1
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::watch;
use tracing::info;

mod commands;
mod scheduler;

#[derive(Parser)]
#[command(
    name = "lcmd",
    about = "cluster-group-lcm: staged policy rollouts across cluster groups",
    version,
    propagate_version = true
)]
struct Cli {
    /// Path to lcm.toml. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory for persistent state (overrides the config file).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Reconcile every group periodically until Ctrl-C.
    Run {
        /// Seconds between passes (overrides the config file).
        #[arg(long)]
        interval: Option<u64>,
    },
    /// Load groups, sites, common sets or policies from a JSON file.
    Apply {
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Print a group's batch plan.
    Plan {
        /// <namespace>/<group>
        group: String,
    },
    /// Print a group's observed status.
    Status {
        /// <namespace>/<group>
        group: String,
    },
    /// Run a single reconciliation pass for one group.
    Reconcile {
        /// <namespace>/<group>
        group: String,
    },
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new("info,lcmd=debug,lcm_rollout=debug")
    });
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let mut config = match &cli.config {
        Some(path) => lcm_core::LcmConfig::from_file(path)?,
        None => lcm_core::LcmConfig::default(),
    };
    if let Some(dir) = cli.data_dir {
        config.store.data_dir = dir;
    }

    std::fs::create_dir_all(&config.store.data_dir)?;
    let db_path = config.store.db_path();
    let store = lcm_state::StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");

    match cli.command {
        Command::Run { interval } => {
            if let Some(secs) = interval {
                config.scheduler.interval_secs = secs;
            }
            run(store, config).await
        }
        Command::Apply { file } => {
            let count = commands::apply(&store, &file)?;
            println!("applied {count} objects");
            Ok(())
        }
        Command::Plan { group } => {
            println!("{}", commands::plan(store, &config, &group)?);
            Ok(())
        }
        Command::Status { group } => {
            println!("{}", commands::status(&store, &group)?);
            Ok(())
        }
        Command::Reconcile { group } => {
            println!("{}", commands::reconcile(store, &config, &group)?);
            Ok(())
        }
    }
}

async fn run(store: lcm_state::StateStore, config: lcm_core::LcmConfig) -> anyhow::Result<()> {
    info!("cluster-group-lcm daemon starting");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = scheduler::Scheduler::new(store, &config);
    let handle = tokio::spawn(scheduler.run(shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);
    handle.await?;

    info!("cluster-group-lcm daemon stopped");
    Ok(())
}
