//! Epoch-boundary reward distribution.
//!
//! For every registered incentive, in contract order, the engine pays each
//! participant a usage-proportional share of `pool balance × rate` for each
//! allocation, clears the contract's usage meters, and burns one epoch. An
//! incentive whose last epoch was consumed is removed.
//!
//! Each incentive is settled on its own: its transfers are made, then its
//! registry and ledger writes are applied to the store. If one of its
//! transfers fails, the transfers it already made are returned to the pool
//! and the incentive is left as it was. Incentives settled earlier in the
//! pass stay settled. Callers that need all-or-nothing semantics pass a
//! [`CacheStore`](crate::state::CacheStore) over a staging bank and commit
//! both on success.

use tracing::{debug, info, warn};

use crate::decimal::proportional_share;
use crate::error::IncentiveError;
use crate::state::{IncentiveStore, StateBatch};
use crate::traits::{BalanceOracle, TransferService};
use crate::types::{Address, Denom, Incentive, UsageMeter};

/// A single reward transfer made during a distribution.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Payout {
    pub contract: Address,
    pub participant: Address,
    pub denom: Denom,
    pub amount: u64,
}

/// Outcome of one distribution pass.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DistributionReport {
    /// Incentives visited (including those with no usage).
    pub incentives_processed: usize,
    /// Contracts whose incentive ran out of epochs and was removed.
    pub completed: Vec<Address>,
    /// Every transfer made, in execution order.
    pub payouts: Vec<Payout>,
}

impl DistributionReport {
    /// Sum of all payouts of `denom`.
    pub fn total_paid(&self, denom: &Denom) -> u128 {
        self.payouts
            .iter()
            .filter(|p| &p.denom == denom)
            .map(|p| p.amount as u128)
            .sum()
    }
}

/// Pays out rewards from the pooled account.
#[derive(Clone, Debug)]
pub struct DistributionEngine {
    pool: Address,
}

impl DistributionEngine {
    pub fn new(pool: Address) -> Self {
        Self { pool }
    }

    /// The account rewards are paid from.
    pub fn pool(&self) -> &Address {
        &self.pool
    }

    /// Run one distribution over every registered incentive.
    ///
    /// Stops at the first failure. Incentives settled before the failure
    /// keep their payouts and store writes; the failing one keeps neither.
    pub fn run<S, B>(&self, store: &mut S, bank: &B) -> Result<DistributionReport, IncentiveError>
    where
        S: IncentiveStore + ?Sized,
        B: BalanceOracle + TransferService + ?Sized,
    {
        let mut report = DistributionReport::default();

        for incentive in store.iter_incentives()? {
            let meters = store.iter_usage(&incentive.contract)?;
            let payouts = self.pay_incentive(&incentive, &meters, bank)?;
            report.payouts.extend(payouts);

            let mut batch = StateBatch::new();
            batch.delete_usage_for(incentive.contract);

            let remaining = incentive.epochs.saturating_sub(1);
            if remaining == 0 {
                batch.delete_incentive(incentive.contract);
                report.completed.push(incentive.contract);
                info!(contract = %incentive.contract, "incentive completed and removed");
            } else {
                batch.put_incentive(Incentive {
                    epochs: remaining,
                    total_usage: 0,
                    ..incentive.clone()
                });
                debug!(
                    contract = %incentive.contract,
                    epochs_remaining = remaining,
                    "incentive epoch consumed"
                );
            }
            store.apply(batch)?;
            report.incentives_processed += 1;
        }

        info!(
            incentives = report.incentives_processed,
            completed = report.completed.len(),
            payouts = report.payouts.len(),
            "distribution finished"
        );
        Ok(report)
    }

    fn pay_incentive<B>(
        &self,
        incentive: &Incentive,
        meters: &[UsageMeter],
        bank: &B,
    ) -> Result<Vec<Payout>, IncentiveError>
    where
        B: BalanceOracle + TransferService + ?Sized,
    {
        let mut payouts = Vec::new();
        if incentive.total_usage == 0 {
            debug!(contract = %incentive.contract, "no usage this epoch");
            return Ok(payouts);
        }

        let metered = meters
            .iter()
            .try_fold(0u64, |acc, m| acc.checked_add(m.usage))
            .ok_or(IncentiveError::ArithmeticOverflow)?;
        let total = if metered > incentive.total_usage {
            warn!(
                contract = %incentive.contract,
                recorded = incentive.total_usage,
                metered,
                "usage meters exceed recorded total; using meter sum"
            );
            metered
        } else {
            incentive.total_usage
        };

        for allocation in &incentive.allocations {
            let balance = bank.balance(&self.pool, &allocation.denom)?;
            if balance == 0 || allocation.rate.is_zero() {
                continue;
            }
            for meter in meters {
                let amount = proportional_share(balance, allocation.rate, meter.usage, total)
                    .ok_or(IncentiveError::ArithmeticOverflow)?;
                if amount == 0 {
                    continue;
                }
                if let Err(source) =
                    bank.transfer(&self.pool, &meter.participant, &allocation.denom, amount)
                {
                    self.refund(&payouts, bank);
                    return Err(IncentiveError::TransferFailure {
                        contract: incentive.contract,
                        denom: allocation.denom.clone(),
                        recipient: meter.participant,
                        amount,
                        source,
                    });
                }
                debug!(
                    contract = %incentive.contract,
                    participant = %meter.participant,
                    denom = %allocation.denom,
                    amount,
                    "reward paid"
                );
                payouts.push(Payout {
                    contract: incentive.contract,
                    participant: meter.participant,
                    denom: allocation.denom.clone(),
                    amount,
                });
            }
        }
        Ok(payouts)
    }

    /// Return an incentive's completed transfers to the pool after one of
    /// its later transfers failed.
    fn refund<B>(&self, payouts: &[Payout], bank: &B)
    where
        B: TransferService + ?Sized,
    {
        for payout in payouts.iter().rev() {
            if let Err(err) =
                bank.transfer(&payout.participant, &self.pool, &payout.denom, payout.amount)
            {
                warn!(
                    contract = %payout.contract,
                    participant = %payout.participant,
                    denom = %payout.denom,
                    amount = payout.amount,
                    error = %err,
                    "failed to refund reward"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::MemoryBank;
    use crate::constants::MODULE_NAME;
    use crate::decimal::Rate;
    use crate::error::BankError;
    use crate::state::{CacheStore, MemoryStore};
    use crate::types::Allocation;

    fn addr(seed: u8) -> Address {
        Address([seed; 20])
    }

    fn denom(s: &str) -> Denom {
        Denom::new(s).unwrap()
    }

    fn pool() -> Address {
        Address::module(MODULE_NAME)
    }

    fn engine() -> DistributionEngine {
        DistributionEngine::new(pool())
    }

    /// Register `contract` and record `usage` per participant, keeping
    /// `total_usage` in step with the meters.
    fn register(
        store: &mut MemoryStore,
        contract: Address,
        rate: &str,
        epochs: u32,
        usage: &[(Address, u64)],
    ) {
        let mut incentive = Incentive::new(
            contract,
            vec![Allocation::new(denom("uatom"), rate.parse().unwrap())],
            epochs,
        );
        for (participant, amount) in usage {
            store.accumulate_usage(&contract, participant, *amount).unwrap();
            incentive.total_usage += amount;
        }
        let mut batch = StateBatch::new();
        batch.put_incentive(incentive);
        store.apply(batch).unwrap();
    }

    fn funded_bank(amount: u64) -> MemoryBank {
        let bank = MemoryBank::new();
        bank.mint(&pool(), &denom("uatom"), amount).unwrap();
        bank
    }

    // ------------------------------------------------------------------
    // Payout arithmetic
    // ------------------------------------------------------------------

    #[test]
    fn worked_example_pays_proportional_share() {
        let (c, p, q) = (addr(1), addr(10), addr(11));
        let mut store = MemoryStore::new();
        register(&mut store, c, "0.2", 2, &[(p, 500), (q, 500)]);
        let bank = funded_bank(100);

        let report = engine().run(&mut store, &bank).unwrap();

        assert_eq!(bank.balance(&p, &denom("uatom")).unwrap(), 10);
        assert_eq!(bank.balance(&q, &denom("uatom")).unwrap(), 10);
        assert_eq!(bank.balance(&pool(), &denom("uatom")).unwrap(), 80);
        assert_eq!(report.total_paid(&denom("uatom")), 20);
        assert_eq!(report.incentives_processed, 1);
        assert!(report.completed.is_empty());

        let after = store.get_incentive(&c).unwrap().unwrap();
        assert_eq!(after.epochs, 1);
        assert_eq!(after.total_usage, 0);
        assert!(store.iter_usage(&c).unwrap().is_empty());
    }

    #[test]
    fn dust_stays_in_pool() {
        let c = addr(1);
        let mut store = MemoryStore::new();
        register(&mut store, c, "0.05", 5, &[(addr(10), 1), (addr(11), 1), (addr(12), 1)]);
        let bank = funded_bank(100);

        let report = engine().run(&mut store, &bank).unwrap();

        // pool share is 5; a third of it is 1.66.. each
        assert_eq!(report.payouts.len(), 3);
        assert!(report.payouts.iter().all(|p| p.amount == 1));
        assert_eq!(bank.balance(&pool(), &denom("uatom")).unwrap(), 97);
    }

    #[test]
    fn zero_shares_are_skipped() {
        let c = addr(1);
        let mut store = MemoryStore::new();
        register(&mut store, c, "0.1", 2, &[(addr(10), 1), (addr(11), 999)]);
        let bank = funded_bank(100);

        let report = engine().run(&mut store, &bank).unwrap();

        // 10 × 1/1000 truncates to zero; 10 × 999/1000 to 9
        assert_eq!(report.payouts.len(), 1);
        assert_eq!(report.payouts[0].participant, addr(11));
        assert_eq!(report.payouts[0].amount, 9);
    }

    #[test]
    fn empty_pool_pays_nothing_but_consumes_epoch() {
        let c = addr(1);
        let mut store = MemoryStore::new();
        register(&mut store, c, "0.05", 3, &[(addr(10), 50)]);
        let bank = MemoryBank::new();

        let report = engine().run(&mut store, &bank).unwrap();

        assert!(report.payouts.is_empty());
        assert_eq!(store.get_incentive(&c).unwrap().unwrap().epochs, 2);
        assert!(store.iter_usage(&c).unwrap().is_empty());
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    #[test]
    fn last_epoch_removes_incentive_and_meters() {
        let c = addr(1);
        let mut store = MemoryStore::new();
        register(&mut store, c, "0.05", 1, &[(addr(10), 7)]);
        let bank = funded_bank(1_000);

        let report = engine().run(&mut store, &bank).unwrap();

        assert_eq!(report.completed, vec![c]);
        assert_eq!(store.get_incentive(&c).unwrap(), None);
        assert!(store.iter_usage(&c).unwrap().is_empty());
    }

    #[test]
    fn no_usage_still_consumes_epoch() {
        let c = addr(1);
        let mut store = MemoryStore::new();
        register(&mut store, c, "0.05", 2, &[]);
        let bank = funded_bank(1_000);

        let report = engine().run(&mut store, &bank).unwrap();

        assert!(report.payouts.is_empty());
        assert_eq!(report.incentives_processed, 1);
        assert_eq!(store.get_incentive(&c).unwrap().unwrap().epochs, 1);
        assert_eq!(bank.balance(&pool(), &denom("uatom")).unwrap(), 1_000);
    }

    #[test]
    fn incentives_processed_in_contract_order() {
        let mut store = MemoryStore::new();
        register(&mut store, addr(9), "0.05", 2, &[(addr(20), 1)]);
        register(&mut store, addr(2), "0.05", 2, &[(addr(21), 1)]);
        let bank = funded_bank(1_000);

        let report = engine().run(&mut store, &bank).unwrap();

        let order: Vec<_> = report.payouts.iter().map(|p| p.contract).collect();
        assert_eq!(order, vec![addr(2), addr(9)]);
        // Second incentive reads the pool after the first one paid.
        assert_eq!(report.payouts[0].amount, 50);
        assert_eq!(report.payouts[1].amount, 47);
    }

    #[test]
    fn zero_recorded_usage_pays_nothing_despite_meters() {
        let (c, p) = (addr(1), addr(10));
        let mut store = MemoryStore::new();
        register(&mut store, c, "0.2", 2, &[]);
        store.accumulate_usage(&c, &p, 500).unwrap();
        let bank = funded_bank(100);

        let report = engine().run(&mut store, &bank).unwrap();

        assert!(report.payouts.is_empty());
        assert_eq!(bank.balance(&p, &denom("uatom")).unwrap(), 0);
        assert_eq!(bank.balance(&pool(), &denom("uatom")).unwrap(), 100);
        // The epoch is still consumed and the stray meter cleared.
        assert_eq!(store.get_incentive(&c).unwrap().unwrap().epochs, 1);
        assert!(store.iter_usage(&c).unwrap().is_empty());
    }

    #[test]
    fn meter_sum_used_when_it_exceeds_recorded_total() {
        let c = addr(1);
        let mut store = MemoryStore::new();
        register(&mut store, c, "0.2", 2, &[(addr(10), 1)]);
        store.accumulate_usage(&c, &addr(11), 1).unwrap();
        let bank = funded_bank(100);

        let report = engine().run(&mut store, &bank).unwrap();

        // Divides by the meter sum (2), not the recorded total (1).
        assert_eq!(report.total_paid(&denom("uatom")), 20);
        assert_eq!(bank.balance(&addr(10), &denom("uatom")).unwrap(), 10);
    }

    #[test]
    fn multiple_allocations_pay_each_denom() {
        let c = addr(1);
        let uosmo = denom("uosmo");
        let mut store = MemoryStore::new();
        let mut incentive = Incentive::new(
            c,
            vec![
                Allocation::new(denom("uatom"), Rate::percent(10)),
                Allocation::new(uosmo.clone(), Rate::percent(50)),
            ],
            2,
        );
        incentive.total_usage = 4;
        store.accumulate_usage(&c, &addr(10), 4).unwrap();
        let mut batch = StateBatch::new();
        batch.put_incentive(incentive);
        store.apply(batch).unwrap();

        let bank = funded_bank(100);
        bank.mint(&pool(), &uosmo, 10).unwrap();

        let report = engine().run(&mut store, &bank).unwrap();

        assert_eq!(report.total_paid(&denom("uatom")), 10);
        assert_eq!(report.total_paid(&uosmo), 5);
    }

    // ------------------------------------------------------------------
    // Failures
    // ------------------------------------------------------------------

    #[test]
    fn transfer_failure_is_reported_with_context() {
        let c = addr(1);
        let mut store = MemoryStore::new();
        register(&mut store, c, "0.2", 2, &[(addr(10), 1)]);
        let bank = funded_bank(100);
        bank.block(addr(10));

        let err = engine().run(&mut store, &bank).unwrap_err();

        assert_eq!(
            err,
            IncentiveError::TransferFailure {
                contract: c,
                denom: denom("uatom"),
                recipient: addr(10),
                amount: 20,
                source: BankError::BlockedRecipient(addr(10)),
            }
        );
    }

    #[test]
    fn failing_incentive_returns_its_earlier_transfers() {
        let c = addr(1);
        let mut store = MemoryStore::new();
        register(&mut store, c, "0.2", 2, &[(addr(10), 1), (addr(11), 1)]);
        let bank = funded_bank(100);
        bank.block(addr(11));

        let err = engine().run(&mut store, &bank).unwrap_err();

        assert!(matches!(
            err,
            IncentiveError::TransferFailure { recipient, .. } if recipient == addr(11)
        ));
        assert_eq!(bank.balance(&addr(10), &denom("uatom")).unwrap(), 0);
        assert_eq!(bank.balance(&pool(), &denom("uatom")).unwrap(), 100);
        let inc = store.get_incentive(&c).unwrap().unwrap();
        assert_eq!((inc.epochs, inc.total_usage), (2, 2));
    }

    #[test]
    fn settled_incentives_survive_a_later_failure() {
        let mut store = MemoryStore::new();
        register(&mut store, addr(1), "0.1", 2, &[(addr(10), 1)]);
        register(&mut store, addr(2), "0.1", 2, &[(addr(11), 1)]);
        let bank = funded_bank(100);
        bank.block(addr(11));

        assert!(engine().run(&mut store, &bank).is_err());

        assert_eq!(bank.balance(&addr(10), &denom("uatom")).unwrap(), 10);
        let first = store.get_incentive(&addr(1)).unwrap().unwrap();
        assert_eq!((first.epochs, first.total_usage), (1, 0));
        assert_eq!(store.get_usage(&addr(1), &addr(10)).unwrap(), None);
        let second = store.get_incentive(&addr(2)).unwrap().unwrap();
        assert_eq!((second.epochs, second.total_usage), (2, 1));
    }

    #[test]
    fn failure_through_cache_leaves_store_untouched() {
        let mut store = MemoryStore::new();
        register(&mut store, addr(1), "0.05", 2, &[(addr(10), 1)]);
        register(&mut store, addr(2), "0.05", 2, &[(addr(11), 1)]);
        let bank = funded_bank(100);
        bank.block(addr(11));

        let mut cache = CacheStore::new(&store);
        assert!(engine().run(&mut cache, &bank).is_err());
        drop(cache);

        assert_eq!(store.get_incentive(&addr(1)).unwrap().unwrap().epochs, 2);
        assert_eq!(store.get_usage(&addr(1), &addr(10)).unwrap(), Some(1));
    }
}
