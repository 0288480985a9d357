//! # incentra-core
//! Foundation types, storage traits, and the incentive state machine.
//!
//! - [`state::IncentiveStore`]: keyed registry, usage ledger, and params
//! - [`validation::AllocationValidator`]: registration rules
//! - [`distribution::DistributionEngine`]: per-epoch proportional payouts
//! - [`keeper::Keeper`]: the public entry points composing the above

pub mod bank;
pub mod constants;
pub mod decimal;
pub mod distribution;
pub mod error;
pub mod genesis;
pub mod keeper;
pub mod params;
pub mod state;
pub mod traits;
pub mod types;
pub mod validation;

pub use decimal::Rate;
pub use error::IncentiveError;
pub use keeper::Keeper;
pub use params::Params;
pub use types::{Address, Allocation, Denom, Incentive, UsageMeter};
