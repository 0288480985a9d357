//! Incentra node binary.
//!
//! Opens the RocksDB state, serves the incentives module over JSON-RPC and,
//! when an interval is configured, ends an epoch on every tick.

use std::path::PathBuf;
use std::process;

use clap::Parser;
use incentra_core::constants::{DEFAULT_EPOCH_IDENTIFIER, DEFAULT_NATIVE_DENOM, DEFAULT_RPC_PORT};
use incentra_node_lib::{Node, NodeConfig, start_rpc_server};
use tracing::{error, info, warn};

/// Incentra node: usage-proportional contract incentives.
#[derive(Parser, Debug)]
#[command(
    name = "incentra-node",
    version,
    about = "Incentra node with RocksDB storage and JSON-RPC server"
)]
struct Args {
    /// Data directory for state storage
    #[arg(long, default_value = None)]
    data_dir: Option<PathBuf>,

    /// RPC server bind address
    #[arg(long, default_value = "127.0.0.1")]
    rpc_bind: String,

    /// RPC server port
    #[arg(long, default_value_t = DEFAULT_RPC_PORT)]
    rpc_port: u16,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log output format ("text" or "json")
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Native denomination, exempt from the supply check
    #[arg(long, default_value = DEFAULT_NATIVE_DENOM)]
    native_denom: String,

    /// Identifier reported by the epoch ticker
    #[arg(long, default_value = DEFAULT_EPOCH_IDENTIFIER)]
    epoch_identifier: String,

    /// Seconds between epoch ends (0 disables the ticker)
    #[arg(long, default_value_t = 0)]
    epoch_interval_secs: u64,

    /// Genesis file imported when the database is first created
    #[arg(long)]
    genesis: Option<PathBuf>,
}

impl Args {
    /// Convert CLI args into a NodeConfig.
    fn into_config(self) -> (NodeConfig, String) {
        let default_data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("incentra");

        let config = NodeConfig {
            data_dir: self.data_dir.unwrap_or(default_data_dir),
            rpc_bind: self.rpc_bind,
            rpc_port: self.rpc_port,
            log_level: self.log_level,
            native_denom: self.native_denom,
            epoch_identifier: self.epoch_identifier,
            epoch_interval_secs: self.epoch_interval_secs,
            genesis_file: self.genesis,
        };

        (config, self.log_format)
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let (config, log_format) = args.into_config();

    init_logging(&config.log_level, &log_format);

    info!("Incentra Node v{}", env!("CARGO_PKG_VERSION"));
    info!("data_dir: {:?}", config.data_dir);
    info!("rpc_addr: {}", config.rpc_addr());
    info!("native_denom: {}", config.native_denom);
    match config.epoch_interval() {
        Some(period) => info!(
            "epoch ticker: {:?} every {:?}",
            config.epoch_identifier, period
        ),
        None => info!("epoch ticker: disabled"),
    }

    if let Err(e) = std::fs::create_dir_all(&config.data_dir) {
        error!("failed to create data_dir: {}", e);
        process::exit(1);
    }

    let node = match Node::open(config.clone()) {
        Ok(n) => n,
        Err(e) => {
            error!("failed to open node: {}", e);
            process::exit(1);
        }
    };

    match (node.incentives(), node.epoch_number()) {
        (Ok(incentives), Ok(epoch)) => info!(
            incentives = incentives.len(),
            epoch,
            pool = %node.pool_address(),
            "node initialized"
        ),
        (Err(e), _) | (_, Err(e)) => warn!("failed to read initial state: {}", e),
    }

    let rpc_handle = match start_rpc_server(&config.rpc_addr(), node.clone()).await {
        Ok(handle) => {
            info!("RPC server listening on {}", config.rpc_addr());
            handle
        }
        Err(e) => {
            error!("failed to start RPC server: {}", e);
            process::exit(1);
        }
    };

    info!("Incentra node running (Ctrl+C to stop)");

    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl+C: {}", e);
        }
        info!("received Ctrl+C, shutting down...");
    };

    let ticker = async {
        node.run_epochs().await;
        // A disabled ticker returns immediately; keep serving RPC.
        std::future::pending::<()>().await;
    };

    tokio::select! {
        _ = ticker => {
            info!("epoch ticker exited");
        }
        _ = shutdown_signal => {
            info!("shutdown signal received");
        }
    }

    rpc_handle.stop().ok();
    info!("RPC server stopped");
    if let Err(e) = node.flush() {
        error!("failed to flush storage: {}", e);
    }
    info!("Incentra node shutdown complete");
}

/// Initialize tracing subscriber with the given log level and output format.
///
/// Pass `format = "json"` for structured JSON output. Any other value
/// defaults to human-readable text.
fn init_logging(level_str: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_str));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_level(true))
            .init();
    }
}
