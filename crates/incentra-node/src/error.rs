//! Errors raised by the node layer on top of the module errors.

use std::path::PathBuf;

use thiserror::Error;

use incentra_core::error::{BankError, GenesisError, IncentiveError, ParseError};

#[derive(Error, Debug)]
pub enum NodeError {
    #[error(transparent)]
    Incentive(#[from] IncentiveError),
    #[error(transparent)]
    Bank(#[from] BankError),
    #[error("invalid configuration: {0}")]
    Config(#[from] ParseError),
    #[error("genesis file {}: {source}", .path.display())]
    GenesisFile {
        path: PathBuf,
        source: GenesisError,
    },
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("rpc server: {0}")]
    Rpc(String),
}
