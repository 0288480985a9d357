//! In-memory bank implementing the collaborator traits.
//!
//! Used by tests, benchmarks, and embedders that do not persist balances.
//! The node crate has a RocksDB-backed equivalent.

use std::collections::{BTreeMap, BTreeSet};

use parking_lot::RwLock;

use crate::error::BankError;
use crate::traits::{BalanceOracle, SupplyOracle, TransferService};
use crate::types::{Address, Denom};

#[derive(Debug, Default)]
struct Ledger {
    balances: BTreeMap<(Address, Denom), u64>,
    supply: BTreeMap<Denom, u64>,
    blocked: BTreeSet<Address>,
}

/// A thread-safe, in-memory bank.
#[derive(Debug, Default)]
pub struct MemoryBank {
    inner: RwLock<Ledger>,
}

impl MemoryBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create `amount` of `denom` in `account`, increasing total supply.
    pub fn mint(&self, account: &Address, denom: &Denom, amount: u64) -> Result<(), BankError> {
        let mut ledger = self.inner.write();
        let overflow = || BankError::BalanceOverflow {
            account: *account,
            denom: denom.clone(),
        };
        let supply = ledger
            .supply
            .get(denom)
            .copied()
            .unwrap_or(0)
            .checked_add(amount)
            .ok_or_else(overflow)?;
        let balance = ledger
            .balances
            .get(&(*account, denom.clone()))
            .copied()
            .unwrap_or(0)
            .checked_add(amount)
            .ok_or_else(overflow)?;
        ledger.supply.insert(denom.clone(), supply);
        ledger.balances.insert((*account, denom.clone()), balance);
        Ok(())
    }

    /// Refuse all future transfers into `account`.
    pub fn block(&self, account: Address) {
        self.inner.write().blocked.insert(account);
    }

    /// Total minted supply of `denom`.
    pub fn supply(&self, denom: &Denom) -> u64 {
        self.inner.read().supply.get(denom).copied().unwrap_or(0)
    }

    /// All nonzero balances of `account`, ordered by denom.
    pub fn balances_of(&self, account: &Address) -> Vec<(Denom, u64)> {
        self.inner
            .read()
            .balances
            .iter()
            .filter(|((a, _), v)| a == account && **v > 0)
            .map(|((_, d), v)| (d.clone(), *v))
            .collect()
    }
}

impl BalanceOracle for MemoryBank {
    fn balance(&self, account: &Address, denom: &Denom) -> Result<u64, BankError> {
        Ok(self
            .inner
            .read()
            .balances
            .get(&(*account, denom.clone()))
            .copied()
            .unwrap_or(0))
    }
}

impl TransferService for MemoryBank {
    fn transfer(
        &self,
        from: &Address,
        to: &Address,
        denom: &Denom,
        amount: u64,
    ) -> Result<(), BankError> {
        let mut ledger = self.inner.write();
        if ledger.blocked.contains(to) {
            return Err(BankError::BlockedRecipient(*to));
        }
        if from == to {
            return Ok(());
        }

        let from_key = (*from, denom.clone());
        let to_key = (*to, denom.clone());
        let have = ledger.balances.get(&from_key).copied().unwrap_or(0);
        let remaining = have
            .checked_sub(amount)
            .ok_or_else(|| BankError::InsufficientFunds {
                account: *from,
                denom: denom.clone(),
                have,
                need: amount,
            })?;
        let credited = ledger
            .balances
            .get(&to_key)
            .copied()
            .unwrap_or(0)
            .checked_add(amount)
            .ok_or_else(|| BankError::BalanceOverflow {
                account: *to,
                denom: denom.clone(),
            })?;

        ledger.balances.insert(from_key, remaining);
        ledger.balances.insert(to_key, credited);
        Ok(())
    }
}

impl SupplyOracle for MemoryBank {
    fn has_supply(&self, denom: &Denom) -> Result<bool, BankError> {
        Ok(self.supply(denom) > 0)
    }
}
