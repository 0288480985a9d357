//! Protocol constants. Rates are fixed-point with 18 decimal places.

/// Module name. The pooled reward account is derived from it.
pub const MODULE_NAME: &str = "incentives";

/// Number of decimal places carried by a [`Rate`](crate::decimal::Rate).
pub const RATE_DECIMALS: u32 = 18;

/// Raw value of a rate equal to 1.0.
pub const RATE_PRECISION: u64 = 1_000_000_000_000_000_000;

/// Default per-allocation ceiling: 5%.
pub const DEFAULT_ALLOCATION_LIMIT: u64 = RATE_PRECISION / 20;

/// Default epoch identifier the distribution hook listens to.
pub const DEFAULT_EPOCH_IDENTIFIER: &str = "week";

/// Default native (mintable) denomination, exempt from the supply check.
pub const DEFAULT_NATIVE_DENOM: &str = "aincentra";

/// Length in bytes of contract and participant addresses.
pub const ADDRESS_LEN: usize = 20;

/// Denomination length bounds (inclusive).
pub const MIN_DENOM_LEN: usize = 3;
pub const MAX_DENOM_LEN: usize = 128;

/// Default JSON-RPC port of the node.
pub const DEFAULT_RPC_PORT: u16 = 26_680;
