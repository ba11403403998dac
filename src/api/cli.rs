use clap::{Parser, Subcommand};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use crate::blockchain::{RpcClient, ScanError, ScanReport};
use crate::config::AppConfig;
use crate::error::{ConfigError, RpcError};
use crate::index::MemoryIndex;
use crate::models::{validate_address, Transaction};
use crate::observer::Observer;

/// Widest block range a single backfill command will scan
pub const MAX_BACKFILL_BLOCKS: u64 = 10_000;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),
    #[error("Scan failed: {0}")]
    Scan(#[from] ScanError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Invalid address '{0}'")]
    InvalidAddress(String),
    #[error("Block range {from}..={to} is empty or wider than {max} blocks")]
    InvalidRange { from: u64, to: u64, max: u64 },
    #[error("Failed to render output: {0}")]
    Output(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "observer-cli")]
#[command(about = "One-shot queries against a chain node using the wallet observer")]
#[command(version)]
pub struct Cli {
    /// Node JSON-RPC endpoint (overrides configuration)
    #[arg(long, global = true)]
    pub rpc_url: Option<String>,

    /// Per-request deadline in milliseconds (overrides configuration)
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the node's current block height
    CurrentBlock,
    /// Print an address's balance in ether at the latest block
    Balance {
        /// Account address, with or without `0x`
        address: String,
    },
    /// Scan a block range for the given addresses and print the matches as JSON
    Backfill {
        #[arg(long)]
        from: u64,
        #[arg(long)]
        to: u64,
        /// Address to match; repeat for several
        #[arg(long = "address", required = true)]
        addresses: Vec<String>,
    },
    /// Print a sample configuration file
    SampleConfig,
}

#[derive(Debug, Serialize)]
struct BackfillOutput {
    report: ScanReport,
    transactions: BTreeMap<String, Vec<Transaction>>,
}

pub struct CliHandler {
    config: AppConfig,
}

impl CliHandler {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    /// Apply command-line overrides on top of the loaded configuration
    pub fn from_cli(mut config: AppConfig, cli: &Cli) -> Result<Self, CliError> {
        if let Some(url) = &cli.rpc_url {
            config.rpc.endpoint = url.clone();
        }
        if let Some(timeout_ms) = cli.timeout_ms {
            config.rpc.timeout_ms = timeout_ms;
        }
        config.validate()?;
        Ok(Self::new(config))
    }

    fn observer(&self) -> Result<Observer, CliError> {
        let client = RpcClient::new(self.config.rpc.endpoint.clone(), self.config.request_timeout())?;
        Ok(Observer::new(
            Arc::new(client),
            Arc::new(MemoryIndex::new()),
            self.config.request_timeout(),
        ))
    }

    /// Run `command` and return what should be printed
    pub async fn execute_command(&self, command: &Commands) -> Result<String, CliError> {
        match command {
            Commands::CurrentBlock => {
                let height = self.observer()?.get_current_block().await?;
                Ok(height.to_string())
            }
            Commands::Balance { address } => self.balance(address).await,
            Commands::Backfill { from, to, addresses } => self.backfill(*from, *to, addresses).await,
            Commands::SampleConfig => Ok(AppConfig::generate_sample_config()?),
        }
    }

    async fn balance(&self, raw: &str) -> Result<String, CliError> {
        let address = validate_address(raw).map_err(|_| CliError::InvalidAddress(raw.to_string()))?;
        let wei = self.observer()?.get_balance(address.as_str()).await?;
        Ok(format!("Balance of address {}: {} ETH", address, wei.to_ether_string()))
    }

    async fn backfill(&self, from: u64, to: u64, addresses: &[String]) -> Result<String, CliError> {
        if from > to || to - from >= MAX_BACKFILL_BLOCKS {
            return Err(CliError::InvalidRange {
                from,
                to,
                max: MAX_BACKFILL_BLOCKS,
            });
        }

        let validated = addresses
            .iter()
            .map(|raw| validate_address(raw).map_err(|_| CliError::InvalidAddress(raw.clone())))
            .collect::<Result<Vec<_>, _>>()?;

        let observer = self.observer()?;
        for address in &validated {
            observer.subscribe(address.as_str());
        }

        let report = observer.backfill(from, to).await?;
        let transactions = validated
            .iter()
            .map(|address| (address.to_string(), observer.get_transactions(address.as_str())))
            .collect();

        Ok(serde_json::to_string_pretty(&BackfillOutput { report, transactions })?)
    }
}
