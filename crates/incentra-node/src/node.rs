//! Node composition: storage, keeper, and the epoch ticker.
//!
//! The [`Node`] owns the RocksDB store behind a `RwLock` and routes every
//! module operation through the [`Keeper`]. Mutating calls hold the write
//! lock for their whole duration and stage both registry and bank writes,
//! which are committed in a single RocksDB batch only if the call succeeds.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, warn};

use incentra_core::distribution::DistributionReport;
use incentra_core::error::IncentiveError;
use incentra_core::genesis::GenesisState;
use incentra_core::state::CacheStore;
use incentra_core::traits::BalanceOracle;
use incentra_core::{Address, Allocation, Denom, Incentive, Keeper, Params, Rate, UsageMeter};

use crate::config::NodeConfig;
use crate::error::NodeError;
use crate::storage::{RocksStore, StagedBank};

/// A running incentives node.
pub struct Node {
    /// RocksDB storage behind a read-write lock.
    storage: Arc<RwLock<RocksStore>>,
    keeper: Keeper,
    config: NodeConfig,
}

impl Node {
    /// Open the node's database, importing the configured genesis file if
    /// the database did not exist yet.
    pub fn open(config: NodeConfig) -> Result<Arc<Self>, NodeError> {
        let native: Denom = config.native_denom.parse()?;
        let fresh = !config.db_path().exists();
        let store = RocksStore::open(config.db_path())?;

        let node = Arc::new(Self {
            storage: Arc::new(RwLock::new(store)),
            keeper: Keeper::new(Arc::new(native)),
            config,
        });

        if let Some(path) = node.config.genesis_file.clone() {
            if fresh {
                let json = std::fs::read_to_string(&path)?;
                let genesis = GenesisState::from_json(&json)
                    .map_err(|source| NodeError::GenesisFile { path, source })?;
                node.init_genesis(&genesis)?;
            } else {
                info!("database exists; genesis file ignored");
            }
        }
        Ok(node)
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn pool_address(&self) -> Address {
        self.keeper.pool_address()
    }

    pub fn native_denom(&self) -> Denom {
        self.keeper.native_denom()
    }

    /// Run `op` against a write overlay of the store and a staged bank,
    /// committing both in one batch on success.
    fn staged<T>(
        &self,
        op: impl FnOnce(&mut CacheStore<'_, RocksStore>, &StagedBank<'_>) -> Result<T, IncentiveError>,
    ) -> Result<T, IncentiveError> {
        let store = self.storage.write();
        let bank = StagedBank::new(&store);
        let mut cache = CacheStore::new(&*store);
        let out = op(&mut cache, &bank)?;
        store.commit(cache.into_batch(), bank.into_writes())?;
        Ok(out)
    }

    // --- Operations ---

    pub fn set_params(&self, params: Params) -> Result<(), IncentiveError> {
        self.staged(|store, _| self.keeper.set_params(store, params))
    }

    pub fn register_incentive(
        &self,
        contract: Address,
        allocations: Vec<Allocation>,
        epochs: u32,
    ) -> Result<Incentive, IncentiveError> {
        self.staged(|store, bank| {
            self.keeper
                .register_incentive(store, bank, contract, allocations, epochs)
        })
    }

    pub fn cancel_incentive(&self, contract: &Address) -> Result<Incentive, IncentiveError> {
        self.staged(|store, _| self.keeper.cancel_incentive(store, contract))
    }

    pub fn report_usage(
        &self,
        contract: &Address,
        participant: &Address,
        delta: u64,
    ) -> Result<bool, IncentiveError> {
        self.staged(|store, _| self.keeper.report_usage(store, contract, participant, delta))
    }

    pub fn distribute(&self) -> Result<DistributionReport, IncentiveError> {
        self.staged(|store, bank| self.keeper.distribute_incentives(store, bank))
    }

    /// End the next epoch under `epoch_identifier`. Returns the epoch
    /// number and the distribution report, if one ran.
    pub fn end_epoch(
        &self,
        epoch_identifier: &str,
    ) -> Result<(u64, Option<DistributionReport>), IncentiveError> {
        let store = self.storage.write();
        let epoch_number = store.epoch_number()? + 1;
        let bank = StagedBank::new(&store);
        let mut cache = CacheStore::new(&*store);
        let report = self
            .keeper
            .after_epoch_end(&mut cache, &bank, epoch_identifier, epoch_number)?;
        store.commit_epoch(epoch_number, cache.into_batch(), bank.into_writes())?;
        Ok((epoch_number, report))
    }

    pub fn init_genesis(&self, genesis: &GenesisState) -> Result<(), IncentiveError> {
        self.staged(|store, _| self.keeper.init_genesis(store, genesis))
    }

    /// Mint `amount` of `denom` into `account`. Returns the new balance.
    pub fn fund(&self, account: &Address, denom: &Denom, amount: u64) -> Result<u64, IncentiveError> {
        let balance = self.storage.write().mint(account, denom, amount)?;
        info!(account = %account, denom = %denom, amount, "account funded");
        Ok(balance)
    }

    // --- Queries ---

    pub fn params(&self) -> Result<Params, IncentiveError> {
        self.keeper.params(&*self.storage.read())
    }

    pub fn incentive(&self, contract: &Address) -> Result<Incentive, IncentiveError> {
        self.keeper.incentive(&*self.storage.read(), contract)
    }

    pub fn incentives(&self) -> Result<Vec<Incentive>, IncentiveError> {
        self.keeper.incentives(&*self.storage.read())
    }

    pub fn usage_meter(
        &self,
        contract: &Address,
        participant: &Address,
    ) -> Result<Option<UsageMeter>, IncentiveError> {
        self.keeper
            .usage_meter(&*self.storage.read(), contract, participant)
    }

    pub fn usage_meters(&self, contract: &Address) -> Result<Vec<UsageMeter>, IncentiveError> {
        self.keeper.usage_meters(&*self.storage.read(), contract)
    }

    pub fn allocation_meters(&self) -> Result<BTreeMap<Denom, Rate>, IncentiveError> {
        self.keeper.allocation_meters(&*self.storage.read())
    }

    pub fn allocation_meter(&self, denom: &Denom) -> Result<Rate, IncentiveError> {
        self.keeper.allocation_meter(&*self.storage.read(), denom)
    }

    pub fn export_genesis(&self) -> Result<GenesisState, IncentiveError> {
        self.keeper.export_genesis(&*self.storage.read())
    }

    pub fn balance(&self, account: &Address, denom: &Denom) -> Result<u64, IncentiveError> {
        Ok(self.storage.read().balance(account, denom)?)
    }

    pub fn balances(&self, account: &Address) -> Result<Vec<(Denom, u64)>, IncentiveError> {
        Ok(self.storage.read().balances_of(account)?)
    }

    pub fn epoch_number(&self) -> Result<u64, IncentiveError> {
        self.storage.read().epoch_number()
    }

    /// Flush storage to disk.
    pub fn flush(&self) -> Result<(), IncentiveError> {
        self.storage.read().flush()
    }

    // --- Epoch ticker ---

    /// End an epoch every configured interval until the task is dropped.
    /// Returns immediately if the ticker is disabled.
    pub async fn run_epochs(self: &Arc<Self>) {
        let Some(period) = self.config.epoch_interval() else {
            info!("epoch ticker disabled");
            return;
        };
        let mut ticker = tokio::time::interval(period);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            // Distribution takes the store lock and writes to RocksDB.
            let node = Arc::clone(self);
            let ended = tokio::task::spawn_blocking(move || {
                node.end_epoch(&node.config.epoch_identifier)
            })
            .await;
            match ended {
                Ok(Ok((epoch, Some(report)))) => info!(
                    epoch,
                    incentives = report.incentives_processed,
                    payouts = report.payouts.len(),
                    "epoch ended with distribution"
                ),
                Ok(Ok((epoch, None))) => info!(epoch, "epoch ended"),
                Ok(Err(e)) => warn!("epoch end failed: {e}"),
                Err(e) => warn!("epoch task failed: {e}"),
            }
        }
    }
}
