//! Echoloop launcher — run the cognitive loop against a mock provider
//!
//! Usage:
//!   echoloop --cycles 2 --storage /tmp/echoloop-state
//!
//! Restores from the latest snapshot when one exists, drives the configured
//! number of full cycles, then writes a checkpoint and prints status.

use clap::Parser;
use echoloop_core::{Specialization, StepHandler};
use echoloop_runtime::config::RuntimeConfig;
use echoloop_runtime::{persist, MockReasoner, Scheduler};
use echoloop_state::SnapshotStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "echoloop", about = "Cyclic multi-engine cognitive scheduler")]
struct Cli {
    /// Path to config file (TOML).
    #[arg(long, default_value = "echoloop.toml")]
    config: String,

    /// Number of engines (overrides config).
    #[arg(long)]
    engines: Option<usize>,

    /// Full 12-step cycles to run.
    #[arg(long, default_value_t = 2)]
    cycles: u64,

    /// Snapshot storage directory (overrides config).
    #[arg(long)]
    storage: Option<PathBuf>,

    /// Dump default config as TOML and exit.
    #[arg(long)]
    dump_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.dump_config {
        println!("{}", RuntimeConfig::default().to_toml());
        return Ok(());
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "echoloop=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = RuntimeConfig::load(Path::new(&cli.config));
    if let Some(engines) = cli.engines {
        config.engines = engines;
    }
    if let Some(storage) = cli.storage {
        config.snapshot.storage_dir = storage;
    }

    println!("╔══════════════════════════════════════════════════╗");
    println!("║          ECHOLOOP COGNITIVE SCHEDULER            ║");
    println!("╠══════════════════════════════════════════════════╣");
    println!("║  {} engines · 12-step cycle · 3 phases            ║", config.engines);
    println!("║  state dir: {:<36} ║", config.snapshot.storage_dir.display().to_string());
    println!("╚══════════════════════════════════════════════════╝");

    let handlers: Vec<Arc<dyn StepHandler>> = (0..config.engines)
        .map(|i| {
            Arc::new(MockReasoner::new(Specialization::for_index(i))) as Arc<dyn StepHandler>
        })
        .collect();

    let scheduler = Arc::new(Scheduler::new(config.clone(), handlers)?);
    let store = Arc::new(SnapshotStore::open(config.snapshot.clone())?);

    persist::restore_latest_or_fresh(&scheduler, &store).await;

    let auto_save = if config.auto_save_secs > 0 {
        Some(persist::spawn_auto_save(
            scheduler.clone(),
            store.clone(),
            std::time::Duration::from_secs(config.auto_save_secs),
            tokio_util::sync::CancellationToken::new(),
        ))
    } else {
        None
    };

    for _ in 0..cli.cycles * u64::from(echoloop_core::CYCLE_LENGTH) {
        scheduler.step().await?;
    }

    if let Some(task) = auto_save {
        task.abort();
    }

    let checkpoint = persist::create_checkpoint(&scheduler, &store, "end of run").await?;
    println!("{}", serde_json::to_string_pretty(&scheduler.status().await)?);
    println!("checkpoint: {}", checkpoint.path.display());

    Ok(())
}
