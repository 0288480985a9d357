//! Interfaces to collaborators outside the incentives module.
//!
//! - [`BalanceOracle`]: read account balances (the bank implements)
//! - [`TransferService`]: move funds between accounts (the bank implements)
//! - [`SupplyOracle`]: whether a denomination has circulating supply
//! - [`NativeDenom`]: the chain's mintable denomination
//!
//! Implementations use interior mutability so that a single bank object can
//! be shared behind `&self` by the validator and the distribution engine.

use crate::error::BankError;
use crate::types::{Address, Denom};

/// Read-only view of account balances.
pub trait BalanceOracle: Send + Sync {
    /// Balance of `account` in `denom`. Unknown accounts hold zero.
    fn balance(&self, account: &Address, denom: &Denom) -> Result<u64, BankError>;
}

/// Moves funds between accounts. Each call is applied immediately.
pub trait TransferService: Send + Sync {
    fn transfer(
        &self,
        from: &Address,
        to: &Address,
        denom: &Denom,
        amount: u64,
    ) -> Result<(), BankError>;
}

/// Supply lookup used to reject incentives on nonexistent denominations.
pub trait SupplyOracle: Send + Sync {
    fn has_supply(&self, denom: &Denom) -> Result<bool, BankError>;
}

/// Source of the chain's native, mintable denomination.
pub trait NativeDenom: Send + Sync {
    fn native_denom(&self) -> Denom;
}

/// Everything the module needs from the bank.
pub trait Bank: BalanceOracle + TransferService + SupplyOracle {}

impl<T: BalanceOracle + TransferService + SupplyOracle + ?Sized> Bank for T {}

/// A fixed native denomination.
impl NativeDenom for Denom {
    fn native_denom(&self) -> Denom {
        self.clone()
    }
}
