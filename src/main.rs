use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pricekeep::config::{default_config_path, ResolvedConfig};
use pricekeep::market_data::{IdentityResolver, PriceSourceRegistry};
use pricekeep::models::{AssetType, Id};
use pricekeep::refresh::{CycleRun, RefreshOrchestrator, RefreshScheduler};
use pricekeep::storage::{AssetStore, JsonFileAssetStore};
use serde_json::json;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "pricekeep")]
#[command(about = "Keeps asset prices current from market sources")]
struct Cli {
    /// Path to config file (defaults to ./pricekeep.toml, then the platform data dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the resolved configuration and price sources
    Config,
    /// List assets with their price state
    Assets,
    /// Run one refresh cycle over the assets that are due
    Refresh,
    /// Refresh a single asset now
    RefreshAsset {
        /// Asset id
        id: String,
    },
    /// Run refresh cycles on a schedule until interrupted
    Daemon,
    /// Check whether an asset type may be changed to another
    CanConvert { from: String, to: String },
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

struct Runtime {
    registry: PriceSourceRegistry,
    orchestrator: Arc<RefreshOrchestrator>,
}

fn build_runtime(config: &ResolvedConfig) -> Result<Runtime> {
    let store = Arc::new(
        JsonFileAssetStore::open(&config.data_dir)
            .with_context(|| format!("Failed to open data dir {}", config.data_dir.display()))?,
    );

    let mut registry = PriceSourceRegistry::new(&config.data_dir);
    registry.load()?;
    let resolver = Arc::new(IdentityResolver::new(registry.build(&config.nav_feed)?));

    let orchestrator = Arc::new(RefreshOrchestrator::from_config(
        store as Arc<dyn AssetStore>,
        resolver,
        config,
    ));

    Ok(Runtime {
        registry,
        orchestrator,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_level(true)
                .json(),
        )
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(default_config_path);
    let config = ResolvedConfig::load_or_default(&config_path)
        .with_context(|| format!("Failed to load config: {}", config_path.display()))?;

    match cli.command {
        Command::Config => {
            let runtime = build_runtime(&config)?;
            let sources: Vec<_> = runtime
                .registry
                .sources()
                .iter()
                .map(|s| {
                    json!({
                        "name": s.name,
                        "type": s.config.source_type,
                        "priority": s.config.priority,
                        "asset_types": s.config.served_types(),
                    })
                })
                .collect();
            print_json(&json!({
                "config_file": config_path,
                "config": config,
                "price_sources": sources,
            }))?;
        }
        Command::Assets => {
            let store = JsonFileAssetStore::open(&config.data_dir)?;
            let mut assets = store.list_assets().await?;
            assets.sort_by(|a, b| a.display_name.cmp(&b.display_name));
            print_json(&assets)?;
        }
        Command::Refresh => {
            let runtime = build_runtime(&config)?;
            match runtime.orchestrator.run_cycle().await {
                CycleRun::Completed(report) => print_json(&report)?,
                CycleRun::AlreadyRunning => print_json(&json!({ "skipped": "cycle already running" }))?,
            }
        }
        Command::RefreshAsset { id } => {
            let id = Id::parse(id)?;
            let runtime = build_runtime(&config)?;
            let outcome = runtime.orchestrator.refresh_asset(&id).await?;
            print_json(&outcome)?;
        }
        Command::Daemon => {
            let runtime = build_runtime(&config)?;
            let mut scheduler =
                RefreshScheduler::from_config(Arc::clone(&runtime.orchestrator), &config.refresh);
            scheduler.start()?;
            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl-C")?;
            tracing::info!("Shutdown requested, waiting for in-flight lookups");
            scheduler.stop().await?;
        }
        Command::CanConvert { from, to } => {
            let from = AssetType::parse(&from)?;
            let to = AssetType::parse(&to)?;
            let store = JsonFileAssetStore::open(&config.data_dir)?;
            let result = store.rules().validate_conversion(from, to);
            print_json(&json!({
                "from": from,
                "to": to,
                "allowed": result.is_ok(),
                "error": result.err().map(|e| e.to_string()),
            }))?;
        }
    }

    Ok(())
}
