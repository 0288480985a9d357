//! Module parameters, changed only through governance.

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_ALLOCATION_LIMIT, DEFAULT_EPOCH_IDENTIFIER};
use crate::decimal::Rate;
use crate::error::ParamsError;

/// Global configuration of the incentives module.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct Params {
    /// Master switch for registration, usage metering, and the epoch hook.
    pub enable_incentives: bool,
    /// Upper bound on any single allocation rate.
    pub allocation_limit: Rate,
    /// Epoch identifier whose end triggers a distribution.
    pub epoch_identifier: String,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            enable_incentives: true,
            allocation_limit: Rate::from_raw(DEFAULT_ALLOCATION_LIMIT),
            epoch_identifier: DEFAULT_EPOCH_IDENTIFIER.to_string(),
        }
    }
}

impl Params {
    /// Check that the allocation limit lies in `(0, 1]` and the epoch
    /// identifier is non-empty.
    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.allocation_limit.is_zero() {
            return Err(ParamsError::ZeroAllocationLimit);
        }
        if self.allocation_limit > Rate::ONE {
            return Err(ParamsError::AllocationLimitAboveOne(self.allocation_limit));
        }
        if self.epoch_identifier.trim().is_empty() {
            return Err(ParamsError::EmptyEpochIdentifier);
        }
        Ok(())
    }
}
