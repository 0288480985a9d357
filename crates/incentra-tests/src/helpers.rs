//! Shared test helpers for E2E and adversarial tests.

use std::sync::Arc;

use incentra_core::bank::MemoryBank;
use incentra_core::distribution::DistributionReport;
use incentra_core::error::IncentiveError;
use incentra_core::state::MemoryStore;
use incentra_core::traits::BalanceOracle;
use incentra_core::{Address, Allocation, Denom, Incentive, Keeper, Params, Rate};
use incentra_node_lib::{Node, NodeConfig};

/// Native denomination used throughout the tests.
pub const NATIVE: &str = "aincentra";

/// Simple address from a seed byte.
pub fn addr(seed: u8) -> Address {
    Address([seed; 20])
}

pub fn denom(s: &str) -> Denom {
    Denom::new(s).unwrap()
}

pub fn rate(s: &str) -> Rate {
    s.parse().unwrap()
}

pub fn alloc(d: &str, r: &str) -> Allocation {
    Allocation::new(denom(d), rate(r))
}

/// Params with the allocation cap lifted to 1.0 so scenarios can use
/// large rates.
pub fn open_params() -> Params {
    Params {
        allocation_limit: Rate::ONE,
        ..Params::default()
    }
}

/// Keeper, in-memory store and in-memory bank wired together.
pub struct Harness {
    pub keeper: Keeper,
    pub store: MemoryStore,
    pub bank: MemoryBank,
}

impl Harness {
    pub fn new(params: Params) -> Self {
        Self {
            keeper: Keeper::new(Arc::new(denom(NATIVE))),
            store: MemoryStore::with_params(params),
            bank: MemoryBank::new(),
        }
    }

    pub fn pool(&self) -> Address {
        self.keeper.pool_address()
    }

    /// Mint `amount` of `d` into the incentive pool.
    pub fn fund_pool(&self, d: &str, amount: u64) {
        self.bank.mint(&self.pool(), &denom(d), amount).unwrap();
    }

    pub fn balance(&self, account: &Address, d: &str) -> u64 {
        self.bank.balance(account, &denom(d)).unwrap()
    }

    pub fn register(
        &mut self,
        contract: Address,
        allocations: Vec<Allocation>,
        epochs: u32,
    ) -> Result<Incentive, IncentiveError> {
        self.keeper
            .register_incentive(&mut self.store, &self.bank, contract, allocations, epochs)
    }

    pub fn report(&mut self, contract: Address, participant: Address, delta: u64) -> bool {
        self.keeper
            .report_usage(&mut self.store, &contract, &participant, delta)
            .unwrap()
    }

    pub fn distribute(&mut self) -> Result<DistributionReport, IncentiveError> {
        self.keeper.distribute_incentives(&mut self.store, &self.bank)
    }
}

/// Create a test node backed by a temp directory.
pub fn test_node() -> (Arc<Node>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = NodeConfig {
        data_dir: dir.path().to_path_buf(),
        ..NodeConfig::default()
    };
    let node = Node::open(config).unwrap();
    (node, dir)
}
