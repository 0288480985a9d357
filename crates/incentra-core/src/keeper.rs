//! The incentives keeper: the module's public operations and queries.
//!
//! The keeper holds no state of its own. Every call takes the store it acts
//! on (and the bank, where funds are involved), so the host decides how
//! storage is shared and when writes are committed.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::constants::MODULE_NAME;
use crate::decimal::Rate;
use crate::distribution::{DistributionEngine, DistributionReport};
use crate::error::IncentiveError;
use crate::genesis::GenesisState;
use crate::params::Params;
use crate::state::{IncentiveStore, StateBatch};
use crate::traits::{BalanceOracle, NativeDenom, SupplyOracle, TransferService};
use crate::types::{Address, Allocation, Denom, Incentive, UsageMeter};
use crate::validation::{AllocationValidator, allocation_totals};

/// Entry point for every incentives operation.
#[derive(Clone)]
pub struct Keeper {
    validator: AllocationValidator,
    engine: DistributionEngine,
}

impl Keeper {
    /// Create a keeper paying rewards from the module's pooled account.
    pub fn new(native_denom: Arc<dyn NativeDenom>) -> Self {
        Self::with_pool(native_denom, Address::module(MODULE_NAME))
    }

    /// Create a keeper paying rewards from `pool`.
    pub fn with_pool(native_denom: Arc<dyn NativeDenom>, pool: Address) -> Self {
        Self {
            validator: AllocationValidator::new(native_denom),
            engine: DistributionEngine::new(pool),
        }
    }

    /// The pooled account funding all incentives.
    pub fn pool_address(&self) -> Address {
        *self.engine.pool()
    }

    pub fn native_denom(&self) -> Denom {
        self.validator.native_denom()
    }

    // --- params ---

    pub fn params<S>(&self, store: &S) -> Result<Params, IncentiveError>
    where
        S: IncentiveStore + ?Sized,
    {
        store.params()
    }

    /// Replace the module params after validating them.
    pub fn set_params<S>(&self, store: &mut S, params: Params) -> Result<(), IncentiveError>
    where
        S: IncentiveStore + ?Sized,
    {
        params.validate()?;
        store.set_params(params)?;
        info!("incentive params updated");
        Ok(())
    }

    // --- registry ---

    /// Validate and register a new incentive with zero usage.
    pub fn register_incentive<S, B>(
        &self,
        store: &mut S,
        supply: &B,
        contract: Address,
        allocations: Vec<Allocation>,
        epochs: u32,
    ) -> Result<Incentive, IncentiveError>
    where
        S: IncentiveStore + ?Sized,
        B: SupplyOracle + ?Sized,
    {
        self.validator
            .validate(&*store, supply, &contract, &allocations, epochs)?;

        let incentive = Incentive::new(contract, allocations, epochs);
        store.create_incentive(incentive.clone())?;
        info!(
            contract = %contract,
            allocations = incentive.allocations.len(),
            epochs,
            "incentive registered"
        );
        Ok(incentive)
    }

    /// Remove the incentive for `contract` together with its usage meters.
    /// Returns the removed incentive.
    pub fn cancel_incentive<S>(
        &self,
        store: &mut S,
        contract: &Address,
    ) -> Result<Incentive, IncentiveError>
    where
        S: IncentiveStore + ?Sized,
    {
        let incentive = store
            .get_incentive(contract)?
            .ok_or(IncentiveError::NotFound {
                contract: *contract,
            })?;

        let mut batch = StateBatch::new();
        batch.delete_incentive(*contract);
        batch.delete_usage_for(*contract);
        store.apply(batch)?;
        info!(contract = %contract, "incentive cancelled");
        Ok(incentive)
    }

    // --- usage ---

    /// Record `delta` units of usage by `participant` against `contract`.
    ///
    /// Returns `false` without writing anything when incentives are
    /// disabled, the contract has no incentive, or `delta` is zero.
    pub fn report_usage<S>(
        &self,
        store: &mut S,
        contract: &Address,
        participant: &Address,
        delta: u64,
    ) -> Result<bool, IncentiveError>
    where
        S: IncentiveStore + ?Sized,
    {
        if delta == 0 || !store.params()?.enable_incentives {
            return Ok(false);
        }
        let Some(mut incentive) = store.get_incentive(contract)? else {
            return Ok(false);
        };

        let usage = store
            .get_usage(contract, participant)?
            .unwrap_or(0)
            .checked_add(delta)
            .ok_or(IncentiveError::ArithmeticOverflow)?;
        incentive.total_usage = incentive
            .total_usage
            .checked_add(delta)
            .ok_or(IncentiveError::ArithmeticOverflow)?;

        let mut batch = StateBatch::new();
        batch.put_usage(*contract, *participant, usage);
        batch.put_incentive(incentive);
        store.apply(batch)?;
        debug!(contract = %contract, participant = %participant, delta, usage, "usage recorded");
        Ok(true)
    }

    // --- distribution ---

    /// Distribute rewards for every incentive.
    ///
    /// Each incentive's registry and ledger writes are applied as soon as
    /// its transfers succeed. On error the incentives already paid stay
    /// consumed and the rest are left untouched, so a retry never pays the
    /// same usage twice. Hosts that stage bank writes get all-or-nothing
    /// behaviour by passing a [`CacheStore`](crate::state::CacheStore) and
    /// committing only on success.
    pub fn distribute_incentives<S, B>(
        &self,
        store: &mut S,
        bank: &B,
    ) -> Result<DistributionReport, IncentiveError>
    where
        S: IncentiveStore + ?Sized,
        B: BalanceOracle + TransferService + ?Sized,
    {
        self.engine.run(store, bank)
    }

    /// Epoch hook. Distributes when `epoch_identifier` is the configured
    /// one and incentives are enabled; otherwise returns `None`.
    pub fn after_epoch_end<S, B>(
        &self,
        store: &mut S,
        bank: &B,
        epoch_identifier: &str,
        epoch_number: u64,
    ) -> Result<Option<DistributionReport>, IncentiveError>
    where
        S: IncentiveStore + ?Sized,
        B: BalanceOracle + TransferService + ?Sized,
    {
        let params = store.params()?;
        if !params.enable_incentives || params.epoch_identifier != epoch_identifier {
            debug!(epoch_identifier, epoch_number, "epoch end ignored");
            return Ok(None);
        }
        info!(epoch_identifier, epoch_number, "distributing incentives");
        self.distribute_incentives(store, bank).map(Some)
    }

    // --- genesis ---

    /// Validate `genesis` and write params and incentives in one batch.
    ///
    /// Genesis incentives replace stored ones with the same contract. The
    /// merged registry must still keep every denom's total rate at or below
    /// 1.0, otherwise nothing is written.
    pub fn init_genesis<S>(&self, store: &mut S, genesis: &GenesisState) -> Result<(), IncentiveError>
    where
        S: IncentiveStore + ?Sized,
    {
        genesis.validate()?;
        let mut merged: BTreeMap<Address, Incentive> = store
            .iter_incentives()?
            .into_iter()
            .map(|i| (i.contract, i))
            .collect();
        for incentive in &genesis.incentives {
            merged.insert(incentive.contract, incentive.clone());
        }
        let merged: Vec<Incentive> = merged.into_values().collect();
        for (denom, total) in allocation_totals(&merged) {
            if total > Rate::ONE {
                return Err(IncentiveError::OverAllocated { denom, total });
            }
        }

        let mut batch = StateBatch::new();
        batch.put_params(genesis.params.clone());
        for incentive in &genesis.incentives {
            batch.put_incentive(incentive.clone());
        }
        store.apply(batch)?;
        info!(incentives = genesis.incentives.len(), "genesis imported");
        Ok(())
    }

    pub fn export_genesis<S>(&self, store: &S) -> Result<GenesisState, IncentiveError>
    where
        S: IncentiveStore + ?Sized,
    {
        Ok(GenesisState::new(store.params()?, store.iter_incentives()?))
    }

    // --- queries ---

    pub fn incentive<S>(&self, store: &S, contract: &Address) -> Result<Incentive, IncentiveError>
    where
        S: IncentiveStore + ?Sized,
    {
        store
            .get_incentive(contract)?
            .ok_or(IncentiveError::NotFound {
                contract: *contract,
            })
    }

    pub fn incentives<S>(&self, store: &S) -> Result<Vec<Incentive>, IncentiveError>
    where
        S: IncentiveStore + ?Sized,
    {
        store.iter_incentives()
    }

    pub fn usage_meter<S>(
        &self,
        store: &S,
        contract: &Address,
        participant: &Address,
    ) -> Result<Option<UsageMeter>, IncentiveError>
    where
        S: IncentiveStore + ?Sized,
    {
        Ok(store
            .get_usage(contract, participant)?
            .map(|usage| UsageMeter {
                contract: *contract,
                participant: *participant,
                usage,
            }))
    }

    pub fn usage_meters<S>(
        &self,
        store: &S,
        contract: &Address,
    ) -> Result<Vec<UsageMeter>, IncentiveError>
    where
        S: IncentiveStore + ?Sized,
    {
        store.iter_usage(contract)
    }

    /// Sum of registered rates per denom.
    pub fn allocation_meters<S>(&self, store: &S) -> Result<BTreeMap<Denom, Rate>, IncentiveError>
    where
        S: IncentiveStore + ?Sized,
    {
        Ok(allocation_totals(&store.iter_incentives()?))
    }

    /// Sum of registered rates for `denom`; zero if nothing is allocated.
    pub fn allocation_meter<S>(&self, store: &S, denom: &Denom) -> Result<Rate, IncentiveError>
    where
        S: IncentiveStore + ?Sized,
    {
        Ok(self
            .allocation_meters(store)?
            .get(denom)
            .copied()
            .unwrap_or(Rate::ZERO))
    }
}
