// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # PegVault Node
//!
//! Entry point for the `pegvault-node` binary. Parses CLI arguments,
//! initializes logging and metrics, wires the vault engine to its sled
//! database, oracle feed, and trustline registry, and serves the REST API.
//!
//! The binary supports three subcommands:
//!
//! - `run`     — start the engine node
//! - `vault`   — print one vault from the database, offline
//! - `version` — print build version information

mod api;
mod cli;
mod logging;
mod metrics;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tokio::signal;

use pegvault_protocol::asset::{CurrencyCode, StablecoinIdentity};
use pegvault_protocol::config::EngineConfig;
use pegvault_protocol::credential::TrustlineRegistry;
use pegvault_protocol::oracle::FeedOracle;
use pegvault_protocol::settlement::OutboxEmitter;
use pegvault_protocol::storage::{VaultDb, VaultStore};
use pegvault_protocol::Engine;

use cli::{Commands, PegVaultCli};
use logging::LogFormat;
use metrics::NodeMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = PegVaultCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Vault(args) => show_vault(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

fn open_db(data_dir: &Path) -> Result<VaultDb> {
    let db_path = data_dir.join("db");
    std::fs::create_dir_all(&db_path)
        .with_context(|| format!("failed to create database directory: {}", db_path.display()))?;
    VaultDb::open(&db_path)
        .with_context(|| format!("failed to open database at {}", db_path.display()))
}

/// Builds the engine configuration from CLI arguments.
fn engine_config(args: &cli::RunArgs) -> Result<EngineConfig> {
    let currency: CurrencyCode = args
        .currency
        .parse()
        .with_context(|| format!("invalid currency: {}", args.currency))?;

    let mut config = EngineConfig::new(args.engine_account);
    config.stablecoin = StablecoinIdentity {
        issuer: args.issuer.unwrap_or(args.engine_account),
        currency,
    };
    config
        .risk
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid risk parameters: {}", e))?;
    Ok(config)
}

/// Starts the engine node: API server and metrics endpoint.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(
        "pegvault_node=info,pegvault_protocol=info,tower_http=debug",
        LogFormat::from_str_lossy(&args.log_format),
    );

    let config = engine_config(&args)?;
    tracing::info!(
        rpc_port = args.rpc_port,
        metrics_port = args.metrics_port,
        data_dir = %args.data_dir.display(),
        engine = %config.engine_account,
        issuer = %config.stablecoin.issuer,
        currency = %config.stablecoin.currency,
        "starting pegvault-node"
    );

    // --- Persistent storage ---
    let db = open_db(&args.data_dir)?;
    tracing::info!(transfers = db.transfer_count(), "database opened");

    // --- Oracle ---
    let mut oracle = FeedOracle::new();
    if let Some(secs) = args.oracle_max_age_secs {
        let secs = i64::try_from(secs).context("oracle max age out of range")?;
        oracle = oracle.with_max_age(chrono::Duration::seconds(secs));
    }
    if let Some(rate) = args.initial_rate {
        anyhow::ensure!(rate.is_positive(), "initial rate must be positive, got {}", rate);
        oracle.publish(rate);
        tracing::info!(%rate, "initial rate published");
    } else {
        tracing::warn!("no initial rate; deposits are rejected until one is published");
    }
    let oracle = Arc::new(oracle);

    // --- Credentials ---
    let trustlines = Arc::new(TrustlineRegistry::with_required_limit(args.required_trustline));

    // --- Engine ---
    let engine = Arc::new(Engine::new(
        config,
        Arc::new(db.clone()),
        oracle.clone(),
        trustlines.clone(),
        Arc::new(OutboxEmitter::new(db.clone())),
    ));

    // --- Metrics ---
    let node_metrics =
        Arc::new(NodeMetrics::new().context("failed to register prometheus metrics")?);

    // --- Application state ---
    let app_state = api::AppState {
        version: format!(
            "{} (protocol {})",
            env!("CARGO_PKG_VERSION"),
            pegvault_protocol::config::PROTOCOL_VERSION,
        ),
        engine,
        oracle,
        trustlines,
        db: db.clone(),
        metrics: Arc::clone(&node_metrics),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.rpc_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind RPC listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    db.flush().context("failed to flush database")?;
    tracing::info!("pegvault-node stopped");
    Ok(())
}

/// Prints one vault as JSON.
fn show_vault(args: cli::VaultArgs) -> Result<()> {
    let db = open_db(&args.data_dir)?;
    let vault = db
        .get(&args.key)
        .with_context(|| format!("failed to read vault {}", args.key))?
        .ok_or_else(|| anyhow::anyhow!("no vault at {}", args.key))?;

    let out = serde_json::json!({
        "key": args.key,
        "invoice_id": hex::encode_upper(args.key.to_invoice_id()),
        "debt": vault.debt,
        "collateral": vault.collateral,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("pegvault-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol      {}", pegvault_protocol::config::PROTOCOL_VERSION);
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
