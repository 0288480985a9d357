//! Incentive storage interface, write batches, and in-memory implementations.
//!
//! Provides the [`IncentiveStore`] trait covering the three keyspaces of the
//! module (params, incentive registry, usage ledger). All writes go through
//! [`IncentiveStore::apply`] with a [`StateBatch`], which implementations
//! must apply atomically and in order.
//!
//! - [`MemoryStore`]: `BTreeMap`-backed store for tests and embedders
//! - [`CacheStore`]: write overlay on top of any store; its batch is
//!   committed to the parent in one step (or dropped)
//!
//! The production node uses RocksDB (incentra-node).

use std::collections::{BTreeMap, BTreeSet};

use crate::error::IncentiveError;
use crate::params::Params;
use crate::types::{Address, Incentive, UsageMeter};

/// A single write against the module keyspaces.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StateOp {
    PutParams(Params),
    PutIncentive(Incentive),
    DeleteIncentive(Address),
    PutUsage {
        contract: Address,
        participant: Address,
        usage: u64,
    },
    /// Remove every usage meter recorded for the contract.
    DeleteUsageFor(Address),
}

/// An ordered list of writes applied atomically.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StateBatch {
    ops: Vec<StateOp>,
}

impl StateBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_params(&mut self, params: Params) {
        self.ops.push(StateOp::PutParams(params));
    }

    pub fn put_incentive(&mut self, incentive: Incentive) {
        self.ops.push(StateOp::PutIncentive(incentive));
    }

    pub fn delete_incentive(&mut self, contract: Address) {
        self.ops.push(StateOp::DeleteIncentive(contract));
    }

    pub fn put_usage(&mut self, contract: Address, participant: Address, usage: u64) {
        self.ops.push(StateOp::PutUsage {
            contract,
            participant,
            usage,
        });
    }

    pub fn delete_usage_for(&mut self, contract: Address) {
        self.ops.push(StateOp::DeleteUsageFor(contract));
    }

    /// Append all ops of `other` after the ops already in this batch.
    pub fn extend(&mut self, other: StateBatch) {
        self.ops.extend(other.ops);
    }

    pub fn ops(&self) -> &[StateOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<StateOp> {
        self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Storage for params, the incentive registry, and the usage ledger.
///
/// Iteration methods return entries sorted by key bytes so that every
/// replica computing over the same state produces the same output.
///
/// Not internally synchronized for writes: callers hold exclusive access
/// (`&mut self`) for the duration of an operation.
pub trait IncentiveStore: Send + Sync {
    /// Current module params. Stores that were never initialized return
    /// [`Params::default`].
    fn params(&self) -> Result<Params, IncentiveError>;

    /// Look up the incentive registered for `contract`.
    fn get_incentive(&self, contract: &Address) -> Result<Option<Incentive>, IncentiveError>;

    /// All registered incentives, ascending by contract address.
    fn iter_incentives(&self) -> Result<Vec<Incentive>, IncentiveError>;

    /// Cumulative usage of `participant` against `contract` in this cycle.
    fn get_usage(
        &self,
        contract: &Address,
        participant: &Address,
    ) -> Result<Option<u64>, IncentiveError>;

    /// All usage meters of `contract`, ascending by participant address.
    fn iter_usage(&self, contract: &Address) -> Result<Vec<UsageMeter>, IncentiveError>;

    /// Apply every op of `batch` in order, all or nothing.
    fn apply(&mut self, batch: StateBatch) -> Result<(), IncentiveError>;

    /// Whether an incentive is registered for `contract`.
    ///
    /// Default implementation delegates to [`get_incentive`](Self::get_incentive).
    fn contains_incentive(&self, contract: &Address) -> Result<bool, IncentiveError> {
        Ok(self.get_incentive(contract)?.is_some())
    }

    /// Overwrite the module params.
    fn set_params(&mut self, params: Params) -> Result<(), IncentiveError> {
        let mut batch = StateBatch::new();
        batch.put_params(params);
        self.apply(batch)
    }

    /// Insert a new incentive.
    ///
    /// # Errors
    ///
    /// - [`IncentiveError::AlreadyRegistered`] if the contract already has one
    fn create_incentive(&mut self, incentive: Incentive) -> Result<(), IncentiveError> {
        if self.contains_incentive(&incentive.contract)? {
            return Err(IncentiveError::AlreadyRegistered {
                contract: incentive.contract,
            });
        }
        let mut batch = StateBatch::new();
        batch.put_incentive(incentive);
        self.apply(batch)
    }

    /// Remove the incentive for `contract`. Deleting a missing key is a no-op.
    fn delete_incentive(&mut self, contract: &Address) -> Result<(), IncentiveError> {
        let mut batch = StateBatch::new();
        batch.delete_incentive(*contract);
        self.apply(batch)
    }

    /// Add `delta` to the meter of `(contract, participant)`, creating it at
    /// `delta` if absent. Returns the new cumulative value.
    fn accumulate_usage(
        &mut self,
        contract: &Address,
        participant: &Address,
        delta: u64,
    ) -> Result<u64, IncentiveError> {
        let current = self.get_usage(contract, participant)?.unwrap_or(0);
        let updated = current
            .checked_add(delta)
            .ok_or(IncentiveError::ArithmeticOverflow)?;
        let mut batch = StateBatch::new();
        batch.put_usage(*contract, *participant, updated);
        self.apply(batch)?;
        Ok(updated)
    }

    /// Remove every usage meter of `contract` in one step.
    fn delete_usage_for(&mut self, contract: &Address) -> Result<(), IncentiveError> {
        let mut batch = StateBatch::new();
        batch.delete_usage_for(*contract);
        self.apply(batch)
    }
}

/// In-memory incentive storage.
///
/// Stores everything in `BTreeMap`s, so iteration order is the key order.
/// No persistence.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    params: Params,
    incentives: BTreeMap<Address, Incentive>,
    usage: BTreeMap<(Address, Address), u64>,
}

impl MemoryStore {
    /// Create an empty store with default params.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store with the given params.
    pub fn with_params(params: Params) -> Self {
        Self {
            params,
            ..Self::default()
        }
    }

    /// Number of registered incentives.
    pub fn incentive_count(&self) -> usize {
        self.incentives.len()
    }

    /// Number of usage meters across all contracts.
    pub fn usage_count(&self) -> usize {
        self.usage.len()
    }

    fn apply_op(&mut self, op: StateOp) {
        match op {
            StateOp::PutParams(params) => self.params = params,
            StateOp::PutIncentive(incentive) => {
                self.incentives.insert(incentive.contract, incentive);
            }
            StateOp::DeleteIncentive(contract) => {
                self.incentives.remove(&contract);
            }
            StateOp::PutUsage {
                contract,
                participant,
                usage,
            } => {
                self.usage.insert((contract, participant), usage);
            }
            StateOp::DeleteUsageFor(contract) => {
                let keys: Vec<_> = self
                    .usage
                    .range((contract, Address::ZERO)..=(contract, Address::MAX))
                    .map(|(k, _)| *k)
                    .collect();
                for key in keys {
                    self.usage.remove(&key);
                }
            }
        }
    }
}

impl IncentiveStore for MemoryStore {
    fn params(&self) -> Result<Params, IncentiveError> {
        Ok(self.params.clone())
    }

    fn get_incentive(&self, contract: &Address) -> Result<Option<Incentive>, IncentiveError> {
        Ok(self.incentives.get(contract).cloned())
    }

    fn iter_incentives(&self) -> Result<Vec<Incentive>, IncentiveError> {
        Ok(self.incentives.values().cloned().collect())
    }

    fn get_usage(
        &self,
        contract: &Address,
        participant: &Address,
    ) -> Result<Option<u64>, IncentiveError> {
        Ok(self.usage.get(&(*contract, *participant)).copied())
    }

    fn iter_usage(&self, contract: &Address) -> Result<Vec<UsageMeter>, IncentiveError> {
        Ok(self
            .usage
            .range((*contract, Address::ZERO)..=(*contract, Address::MAX))
            .map(|((contract, participant), usage)| UsageMeter {
                contract: *contract,
                participant: *participant,
                usage: *usage,
            })
            .collect())
    }

    fn apply(&mut self, batch: StateBatch) -> Result<(), IncentiveError> {
        for op in batch.into_ops() {
            self.apply_op(op);
        }
        Ok(())
    }
}

/// A write overlay over a read-only parent store.
///
/// Reads see the parent with this overlay's pending writes on top. Writes
/// only touch the overlay and are recorded, in order, in a [`StateBatch`]
/// that the owner of the parent commits with [`IncentiveStore::apply`] once
/// the whole operation succeeded. Dropping the overlay discards everything.
pub struct CacheStore<'a, S: IncentiveStore + ?Sized> {
    parent: &'a S,
    params: Option<Params>,
    /// `None` marks a pending delete.
    incentives: BTreeMap<Address, Option<Incentive>>,
    usage: BTreeMap<(Address, Address), Option<u64>>,
    /// Contracts whose parent meters are hidden by a `DeleteUsageFor`.
    wiped: BTreeSet<Address>,
    batch: StateBatch,
}

impl<'a, S: IncentiveStore + ?Sized> CacheStore<'a, S> {
    pub fn new(parent: &'a S) -> Self {
        Self {
            parent,
            params: None,
            incentives: BTreeMap::new(),
            usage: BTreeMap::new(),
            wiped: BTreeSet::new(),
            batch: StateBatch::new(),
        }
    }

    /// Writes staged so far.
    pub fn pending(&self) -> &StateBatch {
        &self.batch
    }

    /// Consume the overlay, returning the staged writes.
    pub fn into_batch(self) -> StateBatch {
        self.batch
    }

    fn stage(&mut self, op: &StateOp) {
        match op {
            StateOp::PutParams(params) => self.params = Some(params.clone()),
            StateOp::PutIncentive(incentive) => {
                self.incentives
                    .insert(incentive.contract, Some(incentive.clone()));
            }
            StateOp::DeleteIncentive(contract) => {
                self.incentives.insert(*contract, None);
            }
            StateOp::PutUsage {
                contract,
                participant,
                usage,
            } => {
                self.usage.insert((*contract, *participant), Some(*usage));
            }
            StateOp::DeleteUsageFor(contract) => {
                self.wiped.insert(*contract);
                let keys: Vec<_> = self
                    .usage
                    .range((*contract, Address::ZERO)..=(*contract, Address::MAX))
                    .map(|(k, _)| *k)
                    .collect();
                for key in keys {
                    self.usage.remove(&key);
                }
            }
        }
    }
}

impl<S: IncentiveStore + ?Sized> IncentiveStore for CacheStore<'_, S> {
    fn params(&self) -> Result<Params, IncentiveError> {
        match &self.params {
            Some(params) => Ok(params.clone()),
            None => self.parent.params(),
        }
    }

    fn get_incentive(&self, contract: &Address) -> Result<Option<Incentive>, IncentiveError> {
        match self.incentives.get(contract) {
            Some(staged) => Ok(staged.clone()),
            None => self.parent.get_incentive(contract),
        }
    }

    fn iter_incentives(&self) -> Result<Vec<Incentive>, IncentiveError> {
        let mut merged: BTreeMap<Address, Incentive> = self
            .parent
            .iter_incentives()?
            .into_iter()
            .map(|i| (i.contract, i))
            .collect();
        for (contract, staged) in &self.incentives {
            match staged {
                Some(incentive) => {
                    merged.insert(*contract, incentive.clone());
                }
                None => {
                    merged.remove(contract);
                }
            }
        }
        Ok(merged.into_values().collect())
    }

    fn get_usage(
        &self,
        contract: &Address,
        participant: &Address,
    ) -> Result<Option<u64>, IncentiveError> {
        if let Some(staged) = self.usage.get(&(*contract, *participant)) {
            return Ok(*staged);
        }
        if self.wiped.contains(contract) {
            return Ok(None);
        }
        self.parent.get_usage(contract, participant)
    }

    fn iter_usage(&self, contract: &Address) -> Result<Vec<UsageMeter>, IncentiveError> {
        let mut merged: BTreeMap<Address, u64> = if self.wiped.contains(contract) {
            BTreeMap::new()
        } else {
            self.parent
                .iter_usage(contract)?
                .into_iter()
                .map(|m| (m.participant, m.usage))
                .collect()
        };
        for ((_, participant), staged) in self
            .usage
            .range((*contract, Address::ZERO)..=(*contract, Address::MAX))
        {
            match staged {
                Some(usage) => {
                    merged.insert(*participant, *usage);
                }
                None => {
                    merged.remove(participant);
                }
            }
        }
        Ok(merged
            .into_iter()
            .map(|(participant, usage)| UsageMeter {
                contract: *contract,
                participant,
                usage,
            })
            .collect())
    }

    fn apply(&mut self, batch: StateBatch) -> Result<(), IncentiveError> {
        for op in batch.ops() {
            self.stage(op);
        }
        self.batch.extend(batch);
        Ok(())
    }
}
