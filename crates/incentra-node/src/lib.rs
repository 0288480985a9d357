//! # incentra-node: RocksDB storage, RPC, and the epoch ticker.
//!
//! Composes the incentives module into a running node:
//! - [`storage::RocksStore`]: persistent registry, usage ledger and bank
//! - [`node::Node`]: routes module operations through the keeper with
//!   atomic commits
//! - [`rpc`]: JSON-RPC server for external access
//! - [`config::NodeConfig`]: node configuration

pub mod config;
pub mod error;
pub mod node;
pub mod rpc;
pub mod storage;

pub use config::NodeConfig;
pub use error::NodeError;
pub use node::Node;
pub use rpc::start_rpc_server;
pub use storage::{RocksStore, StagedBank};
