//! Whale Watch CLI
//!
//! `backfill` walks the configured history window, `update` polls the recent
//! window, `diagnose` introspects the endpoint. Logs go to stderr; stdout
//! carries only the JSON report.
//!
//! Exit codes: 0 success (including a failed fetch, which is reported),
//! 2 configuration error, 3 runtime error (store save, HTTP client setup,
//! failed diagnose).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use whale_watch::{
    config::{ConfigError, StoreBackend, WatchConfig},
    pipeline::Pipeline,
    scrapers::{SchemaVersion, SubgraphClient},
    signals::open_store,
};

#[derive(Parser, Debug)]
#[command(name = "whale-watch")]
#[command(version, about = "Ingest and classify whale trades from a prediction-market subgraph")]
struct Args {
    /// TOML config file (defaults to ./whale_watch.toml when present)
    #[arg(long, global = true, env = "WHALE_WATCH_CONFIG")]
    config: Option<PathBuf>,

    /// GraphQL endpoint override
    #[arg(long, global = true, env = "WHALE_WATCH_ENDPOINT")]
    endpoint: Option<String>,

    /// Upstream feed schema
    #[arg(long, global = true, value_enum, env = "WHALE_WATCH_SCHEMA")]
    schema: Option<SchemaVersion>,

    /// Store location override
    #[arg(long, global = true, env = "WHALE_WATCH_STORE")]
    store: Option<PathBuf>,

    #[arg(long, global = true, value_enum)]
    backend: Option<StoreBackend>,

    /// Seed file applied only when the store is empty
    #[arg(long, global = true)]
    bootstrap: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// One-shot historical ingestion
    Backfill {
        /// History window in days
        #[arg(long)]
        days: Option<i64>,
    },

    /// Incremental poll of the recent window
    Update {
        #[arg(long)]
        window_minutes: Option<i64>,
    },

    /// Report which trade collections the endpoint exposes
    Diagnose,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    dotenv().ok();
    init_tracing();

    let args = Args::parse();

    let config = match build_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("❌ Configuration error: {}", e);
            std::process::exit(2);
        }
    };

    if let Err(e) = run(&args.command, &config).await {
        error!("❌ {:#}", e);
        std::process::exit(3);
    }
}

/// Config file, then CLI/env overrides, then validation
fn build_config(args: &Args) -> Result<WatchConfig, ConfigError> {
    let mut config = WatchConfig::resolve(args.config.as_deref())?;

    if let Some(endpoint) = &args.endpoint {
        config.feed.endpoint = endpoint.clone();
    }
    if let Some(schema) = args.schema {
        config.feed.schema = schema;
    }
    if let Some(store) = &args.store {
        config.store.path = store.clone();
    }
    if let Some(backend) = args.backend {
        config.store.backend = backend;
    }
    if let Some(bootstrap) = &args.bootstrap {
        config.store.bootstrap_path = Some(bootstrap.clone());
    }
    match args.command {
        Command::Backfill { days: Some(days) } => config.backfill_window_days = days,
        Command::Update {
            window_minutes: Some(minutes),
        } => config.poll_window_minutes = minutes,
        _ => {}
    }

    config.validate()?;
    Ok(config)
}

async fn run(command: &Command, config: &WatchConfig) -> Result<()> {
    let client = SubgraphClient::new(
        config.feed.endpoint.clone(),
        config.feed.schema.adapter(),
        config.request_timeout(),
    )
    .context("Failed to build subgraph client")?;

    if let Command::Diagnose = command {
        info!("🔍 Introspecting {}", config.feed.endpoint);
        let report = client
            .diagnose()
            .await
            .with_context(|| format!("Introspection of {} failed", config.feed.endpoint))?;
        return print_report(&report);
    }

    let store = open_store(&config.store)
        .with_context(|| format!("Failed to open store at {}", config.store.path.display()))?;
    let pipeline = Pipeline::new(config, &client, store.as_ref());
    let now = chrono::Utc::now().timestamp();

    info!(
        "🐋 Whale Watch ({} schema) -> {}",
        config.feed.schema,
        store.describe()
    );

    let report = match command {
        Command::Backfill { .. } => pipeline.backfill(now).await,
        _ => pipeline.update(now).await,
    }
    .context("Failed to persist trade store")?;

    print_report(&report)
}

fn print_report<T: Serialize>(report: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "whale_watch=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
