//! Node configuration for the Incentra node.
//!
//! Provides [`NodeConfig`] with defaults for data directory, RPC binding,
//! native denomination, and the epoch schedule. Values are overridden by
//! command-line flags in the node binary.

use std::path::PathBuf;
use std::time::Duration;

use incentra_core::constants::{DEFAULT_EPOCH_IDENTIFIER, DEFAULT_NATIVE_DENOM, DEFAULT_RPC_PORT};

/// Configuration for a node instance.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Root directory for all persistent data.
    pub data_dir: PathBuf,
    /// IP address for the JSON-RPC server to bind to.
    pub rpc_bind: String,
    /// Port for the JSON-RPC server.
    pub rpc_port: u16,
    /// Log level filter string (e.g. "info", "debug", "incentra_core=trace").
    pub log_level: String,
    /// The chain's native denomination, exempt from the supply check.
    pub native_denom: String,
    /// Identifier the epoch ticker reports when an epoch ends.
    pub epoch_identifier: String,
    /// Seconds between epoch ends. Zero disables the ticker.
    pub epoch_interval_secs: u64,
    /// Genesis file imported when the database is created.
    pub genesis_file: Option<PathBuf>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("incentra");

        Self {
            data_dir,
            rpc_bind: "127.0.0.1".to_string(),
            rpc_port: DEFAULT_RPC_PORT,
            log_level: "info".to_string(),
            native_denom: DEFAULT_NATIVE_DENOM.to_string(),
            epoch_identifier: DEFAULT_EPOCH_IDENTIFIER.to_string(),
            epoch_interval_secs: 0,
            genesis_file: None,
        }
    }
}

impl NodeConfig {
    /// Path to the RocksDB state directory.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("statedata")
    }

    /// Socket address string for the RPC server.
    pub fn rpc_addr(&self) -> String {
        format!("{}:{}", self.rpc_bind, self.rpc_port)
    }

    /// Ticker period, if the ticker is enabled.
    pub fn epoch_interval(&self) -> Option<Duration> {
        (self.epoch_interval_secs > 0).then(|| Duration::from_secs(self.epoch_interval_secs))
    }
}
