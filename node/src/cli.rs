//! # CLI Interface
//!
//! Defines the command-line argument structure for `pegvault-node` using
//! `clap` derive. Supports three subcommands: `run`, `vault`, and `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use pegvault_protocol::amount::Amount;
use pegvault_protocol::config::{
    DEFAULT_CURRENCY, DEFAULT_METRICS_PORT, DEFAULT_RPC_PORT, REQUIRED_TRUSTLINE_LIMIT,
};
use pegvault_protocol::vault::{AccountId, VaultKey};

/// PegVault engine node.
///
/// Accepts deposit notifications over HTTP, runs them through the vault
/// engine, records outbound settlement transfers, and exposes Prometheus
/// metrics.
#[derive(Parser, Debug)]
#[command(
    name = "pegvault-node",
    about = "PegVault collateralized stablecoin engine node",
    version,
    propagate_version = true
)]
pub struct PegVaultCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the engine node.
    Run(RunArgs),
    /// Print one vault from a stopped node's database.
    Vault(VaultArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Directory holding the vault database and settlement outbox.
    ///
    /// Created on first run if it does not exist.
    #[arg(long, short = 'd', env = "PEGVAULT_DATA_DIR", default_value = ".pegvault")]
    pub data_dir: PathBuf,

    /// Port for the REST API.
    #[arg(long, env = "PEGVAULT_RPC_PORT", default_value_t = DEFAULT_RPC_PORT)]
    pub rpc_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "PEGVAULT_METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// The engine's own ledger account, 40 hex chars.
    #[arg(long, env = "PEGVAULT_ENGINE_ACCOUNT")]
    pub engine_account: AccountId,

    /// Stablecoin issuer. Defaults to the engine account.
    #[arg(long, env = "PEGVAULT_ISSUER")]
    pub issuer: Option<AccountId>,

    /// Stablecoin currency: a 3-letter code or 40 hex chars.
    #[arg(long, env = "PEGVAULT_CURRENCY", default_value = DEFAULT_CURRENCY)]
    pub currency: String,

    /// Rate to publish at startup. Without it deposits fail until a rate
    /// is PUT to `/oracle/rate`.
    #[arg(long, env = "PEGVAULT_INITIAL_RATE")]
    pub initial_rate: Option<Amount>,

    /// Reject rates older than this many seconds.
    #[arg(long, env = "PEGVAULT_ORACLE_MAX_AGE_SECS")]
    pub oracle_max_age_secs: Option<u64>,

    /// Minimum trustline limit an account needs to deal with the engine.
    #[arg(long, env = "PEGVAULT_REQUIRED_TRUSTLINE", default_value_t = REQUIRED_TRUSTLINE_LIMIT)]
    pub required_trustline: u64,

    /// Log output format: "pretty" or "json".
    #[arg(long, env = "PEGVAULT_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,
}

/// Arguments for the `vault` subcommand.
#[derive(Parser, Debug)]
pub struct VaultArgs {
    /// Vault key (48 hex chars) or invoice id (64 hex chars).
    pub key: VaultKey,

    #[arg(long, short = 'd', env = "PEGVAULT_DATA_DIR", default_value = ".pegvault")]
    pub data_dir: PathBuf,
}
