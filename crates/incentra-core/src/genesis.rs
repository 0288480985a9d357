//! Genesis state: the module's params and registry at chain start.
//!
//! Usage meters are not part of genesis; every chain starts a fresh cycle.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::decimal::Rate;
use crate::error::GenesisError;
use crate::params::Params;
use crate::types::Incentive;
use crate::validation::allocation_totals;

/// Exported or imported module state.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct GenesisState {
    pub params: Params,
    #[serde(default)]
    pub incentives: Vec<Incentive>,
}

impl GenesisState {
    pub fn new(params: Params, incentives: Vec<Incentive>) -> Self {
        Self { params, incentives }
    }

    /// Stateless checks: valid params, each incentive well formed, no
    /// duplicate contracts, and per-denom rate sums within 1.0.
    pub fn validate(&self) -> Result<(), GenesisError> {
        self.params.validate()?;

        let mut seen = BTreeSet::new();
        for incentive in &self.incentives {
            if !seen.insert(incentive.contract) {
                return Err(GenesisError::DuplicateIncentive(incentive.contract));
            }
            incentive
                .validate()
                .map_err(|source| GenesisError::Incentive {
                    contract: incentive.contract,
                    source,
                })?;
        }

        for (denom, total) in allocation_totals(&self.incentives) {
            if total > Rate::ONE {
                return Err(GenesisError::OverAllocated { denom, total });
            }
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, GenesisError> {
        serde_json::to_string_pretty(self).map_err(|e| GenesisError::Json(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, GenesisError> {
        serde_json::from_str(json).map_err(|e| GenesisError::Json(e.to_string()))
    }
}
