//! Registration checks for new incentives.
//!
//! Every check is a read against the store and the supply oracle; nothing is
//! written here. Rules run in a fixed order and the first failure wins:
//!
//! 1. incentives enabled
//! 2. contract not already registered
//! 3. allocation shape (non-empty, unique denoms, nonzero rates, epochs > 0)
//! 4. every non-native denom has circulating supply
//! 5. every rate within the allocation limit
//! 6. per denom, registered rates plus the new rate stay within 1.0

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::decimal::Rate;
use crate::error::{IncentiveError, InvalidIncentive};
use crate::state::IncentiveStore;
use crate::traits::{NativeDenom, SupplyOracle};
use crate::types::{Address, Allocation, Denom, Incentive, validate_allocations};

/// Validates registration requests against current module state.
#[derive(Clone)]
pub struct AllocationValidator {
    native_denom: Arc<dyn NativeDenom>,
}

impl AllocationValidator {
    pub fn new(native_denom: Arc<dyn NativeDenom>) -> Self {
        Self { native_denom }
    }

    /// The chain's native denomination, exempt from the supply check.
    pub fn native_denom(&self) -> Denom {
        self.native_denom.native_denom()
    }

    /// Check whether `contract` may register `allocations` for `epochs`.
    pub fn validate<S, B>(
        &self,
        store: &S,
        supply: &B,
        contract: &Address,
        allocations: &[Allocation],
        epochs: u32,
    ) -> Result<(), IncentiveError>
    where
        S: IncentiveStore + ?Sized,
        B: SupplyOracle + ?Sized,
    {
        let params = store.params()?;
        if !params.enable_incentives {
            return Err(IncentiveError::Disabled);
        }
        if store.contains_incentive(contract)? {
            return Err(IncentiveError::AlreadyRegistered {
                contract: *contract,
            });
        }

        validate_allocations(allocations)?;
        if epochs == 0 {
            return Err(IncentiveError::from(InvalidIncentive::ZeroEpochs));
        }

        let native = self.native_denom();
        for allocation in allocations {
            if allocation.denom != native && !supply.has_supply(&allocation.denom)? {
                return Err(IncentiveError::UnknownDenom {
                    denom: allocation.denom.clone(),
                });
            }
        }

        for allocation in allocations {
            if allocation.rate > params.allocation_limit {
                return Err(IncentiveError::RateTooHigh {
                    denom: allocation.denom.clone(),
                    rate: allocation.rate,
                    limit: params.allocation_limit,
                });
            }
        }

        let totals = allocation_totals(&store.iter_incentives()?);
        for allocation in allocations {
            let existing = totals.get(&allocation.denom).copied().unwrap_or(Rate::ZERO);
            let total = existing.saturating_add(allocation.rate);
            if total > Rate::ONE {
                return Err(IncentiveError::OverAllocated {
                    denom: allocation.denom.clone(),
                    total,
                });
            }
        }

        Ok(())
    }
}

/// Sum of registered nonzero rates per denom, ordered by denom.
pub fn allocation_totals(incentives: &[Incentive]) -> BTreeMap<Denom, Rate> {
    let mut totals = BTreeMap::new();
    for allocation in incentives.iter().flat_map(|i| &i.allocations) {
        if allocation.rate.is_zero() {
            continue;
        }
        let entry = totals.entry(allocation.denom.clone()).or_insert(Rate::ZERO);
        *entry = entry.saturating_add(allocation.rate);
    }
    totals
}
