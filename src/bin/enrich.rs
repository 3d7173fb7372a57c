//! # Contact Enrichment CLI
//!
//! Runs a CSV through the enrichment pipeline, sweeps orphaned work, or prints
//! the resolved configuration.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use contact_enrichment::config::ConfigManager;
use contact_enrichment::database::{InMemoryJobStore, JobStore, PgJobStore};
use contact_enrichment::enrichment::HttpEnrichmentClient;
use contact_enrichment::events::EventPublisher;
use contact_enrichment::intake::IntakeService;
use contact_enrichment::logging::init_structured_logging;
use contact_enrichment::orchestration::StalenessDetector;
use contact_enrichment::EnrichmentConfig;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "enrich")]
#[command(about = "Bulk contact enrichment")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration directory (default: config)
    #[arg(short, long, global = true)]
    config_dir: Option<PathBuf>,

    /// Environment section to merge (default: ENRICHMENT_ENV, APP_ENV or development)
    #[arg(short, long, global = true)]
    environment: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enrich every contact in a CSV file and wait for the job to finish
    Run {
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Run one staleness sweep against the PostgreSQL store
    Sweep,

    /// Print the resolved configuration with secrets masked
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_structured_logging();

    let environment = cli
        .environment
        .unwrap_or_else(ConfigManager::detect_environment);
    let manager = ConfigManager::load_from_directory_with_env(cli.config_dir, &environment)
        .context("failed to load configuration")?;

    match cli.command {
        Commands::Run { file } => run_file(manager.config(), &file).await,
        Commands::Sweep => sweep(manager.config()).await,
        Commands::CheckConfig => {
            let report = json!({
                "environment": manager.environment(),
                "config_directory": manager.config_directory().display().to_string(),
                "config": manager.debug_config(),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}

async fn build_store(config: &EnrichmentConfig) -> Result<Arc<dyn JobStore>> {
    if config.database.url.is_some() {
        let store = PgJobStore::connect(&config.database)
            .await
            .context("failed to connect to PostgreSQL")?;
        Ok(Arc::new(store))
    } else {
        warn!("No database.url configured, using the in-memory store");
        Ok(Arc::new(InMemoryJobStore::new()))
    }
}

async fn run_file(config: &EnrichmentConfig, file: &Path) -> Result<()> {
    let filename = file
        .file_name()
        .and_then(|name| name.to_str())
        .context("input path has no usable file name")?
        .to_string();
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;

    let store = build_store(config).await?;
    let events = EventPublisher::new(config.events.channel_capacity);
    let client = HttpEnrichmentClient::new(&config.enrichment)?;
    let intake = IntakeService::from_config(config, store.clone(), Arc::new(client), events.clone())?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = config.staleness.enabled.then(|| {
        let detector = StalenessDetector::new(store.clone(), config.staleness.clone(), events);
        tokio::spawn(async move { detector.run(shutdown_rx).await })
    });

    let (receipt, handle) = intake.accept_upload(&filename, &bytes).await?;
    info!(job_id = receipt.job_id, total_count = receipt.total_count, "{}", receipt.message);

    let outcome = handle.wait().await;

    let _ = shutdown_tx.send(true);
    if let Some(sweeper) = sweeper {
        let _ = sweeper.await;
    }

    let status = intake.job_status(receipt.job_id).await?;
    let results = intake.job_results(receipt.job_id).await?;
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "receipt": receipt,
            "status": status,
            "results": results,
        }))?
    );

    outcome.map(|_| ()).context("enrichment job did not complete")
}

async fn sweep(config: &EnrichmentConfig) -> Result<()> {
    if config.database.url.is_none() {
        bail!("sweep needs database.url or DATABASE_URL; the in-memory store has nothing to sweep");
    }

    let store = build_store(config).await?;
    let detector = StalenessDetector::new(
        store,
        config.staleness.clone(),
        EventPublisher::new(config.events.channel_capacity),
    );
    let report = detector.sweep_once().await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
