//! Error types for the incentives module.
use thiserror::Error;

use crate::decimal::Rate;
use crate::types::{Address, Denom};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid address length: {0} bytes")] InvalidAddressLength(usize),
    #[error("invalid hex: {0}")] InvalidHex(String),
    #[error("invalid denom: {0:?}")] InvalidDenom(String),
    #[error("invalid rate: {0:?}")] InvalidRate(String),
    #[error("rate has more than {max} decimal places: {value:?}")] RatePrecision { value: String, max: u32 },
    #[error("rate out of range: {0:?}")] RateOutOfRange(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BankError {
    #[error("insufficient funds: {account} has {have}{denom}, needs {need}{denom}")] InsufficientFunds { account: Address, denom: Denom, have: u64, need: u64 },
    #[error("balance overflow for {account} in {denom}")] BalanceOverflow { account: Address, denom: Denom },
    #[error("recipient is blocked from receiving funds: {0}")] BlockedRecipient(Address),
    #[error("bank storage: {0}")] Storage(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParamsError {
    #[error("allocation limit must be positive")] ZeroAllocationLimit,
    #[error("allocation limit {0} exceeds 1.0")] AllocationLimitAboveOne(Rate),
    #[error("epoch identifier must not be empty")] EmptyEpochIdentifier,
}

/// Structural problems with an incentive, independent of chain state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidIncentive {
    #[error("incentive has no allocations")] NoAllocations,
    #[error("duplicate allocation denom: {0}")] DuplicateDenom(Denom),
    #[error("allocation rate for {0} must be positive")] ZeroRate(Denom),
    #[error("allocation rate for {denom} exceeds 1.0: {rate}")] RateAboveOne { denom: Denom, rate: Rate },
    #[error("epochs must be positive")] ZeroEpochs,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenesisError {
    #[error("invalid params: {0}")] Params(#[from] ParamsError),
    #[error("invalid incentive {contract}: {source}")] Incentive { contract: Address, source: InvalidIncentive },
    #[error("duplicate incentive: {0}")] DuplicateIncentive(Address),
    #[error("total allocation for {denom} exceeds 1.0: {total}")] OverAllocated { denom: Denom, total: Rate },
    #[error("genesis json: {0}")] Json(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IncentiveError {
    #[error("incentives are disabled by governance")] Disabled,
    #[error("incentive already registered: {contract}")] AlreadyRegistered { contract: Address },
    #[error("incentive not found: {contract}")] NotFound { contract: Address },
    #[error("denom {denom} has no circulating supply")] UnknownDenom { denom: Denom },
    #[error("allocation for {denom} ({rate}) exceeds the allocation limit {limit}")] RateTooHigh { denom: Denom, rate: Rate, limit: Rate },
    #[error("total allocation for {denom} would exceed 1.0: {total}")] OverAllocated { denom: Denom, total: Rate },
    #[error("transfer of {amount}{denom} to {recipient} for {contract} failed: {source}")] TransferFailure { contract: Address, denom: Denom, recipient: Address, amount: u64, source: BankError },
    #[error(transparent)] InvalidIncentive(#[from] InvalidIncentive),
    #[error(transparent)] Params(#[from] ParamsError),
    #[error(transparent)] Genesis(#[from] GenesisError),
    #[error(transparent)] Bank(#[from] BankError),
    #[error("arithmetic overflow")] ArithmeticOverflow,
    #[error("storage: {0}")] Storage(String),
}
