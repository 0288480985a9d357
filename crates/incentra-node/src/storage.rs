//! RocksDB-backed persistent module state and bank ledger.
//!
//! Implements [`IncentiveStore`] and the bank read traits using RocksDB
//! column families for incentives, usage meters, metadata, balances and
//! supply. All mutations use atomic [`WriteBatch`]es, and a registry batch
//! can be committed together with staged bank writes (see [`StagedBank`]).

use std::collections::BTreeMap;
use std::path::Path;

use parking_lot::Mutex;
use rocksdb::{ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch};

use incentra_core::error::{BankError, IncentiveError};
use incentra_core::params::Params;
use incentra_core::state::{IncentiveStore, StateBatch, StateOp};
use incentra_core::traits::{BalanceOracle, SupplyOracle, TransferService};
use incentra_core::types::{Address, Denom, Incentive, UsageMeter};

// --- Column family names ---

const CF_INCENTIVES: &str = "incentives";
const CF_USAGE: &str = "usage";
const CF_METADATA: &str = "metadata";
const CF_BALANCES: &str = "balances";
const CF_SUPPLY: &str = "supply";

/// All column family names.
const ALL_CFS: &[&str] = &[CF_INCENTIVES, CF_USAGE, CF_METADATA, CF_BALANCES, CF_SUPPLY];

// --- Metadata keys ---

const META_PARAMS: &[u8] = b"params";
const META_EPOCH_NUMBER: &[u8] = b"epoch_number";

const ADDR_LEN: usize = 20;
const USAGE_KEY_LEN: usize = 2 * ADDR_LEN;

fn storage_err(e: impl std::fmt::Display) -> IncentiveError {
    IncentiveError::Storage(e.to_string())
}

fn bank_err(e: IncentiveError) -> BankError {
    BankError::Storage(e.to_string())
}

fn decode_u64(bytes: &[u8]) -> Result<u64, IncentiveError> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| storage_err("invalid u64 value length"))?;
    Ok(u64::from_le_bytes(arr))
}

/// Balance writes staged during an operation, committed with [`RocksStore::commit`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BankWrites {
    balances: BTreeMap<(Address, Denom), u64>,
}

impl BankWrites {
    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
    }

    pub fn len(&self) -> usize {
        self.balances.len()
    }

    fn get(&self, account: &Address, denom: &Denom) -> Option<u64> {
        self.balances.get(&(*account, denom.clone())).copied()
    }

    fn set(&mut self, account: Address, denom: Denom, amount: u64) {
        self.balances.insert((account, denom), amount);
    }
}

/// RocksDB-backed storage for params, incentives, usage meters, balances
/// and supply.
pub struct RocksStore {
    db: DB,
}

impl RocksStore {
    /// Open or create a RocksDB database at the given path.
    ///
    /// Creates all column families if they don't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, IncentiveError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&db_opts, path.as_ref(), cf_descriptors)
            .map_err(storage_err)?;
        Ok(Self { db })
    }

    /// Commit registry/ledger writes and bank writes in one atomic batch.
    pub fn commit(&self, state: StateBatch, bank: BankWrites) -> Result<(), IncentiveError> {
        let mut batch = WriteBatch::default();
        self.stage_state(&mut batch, state)?;
        self.stage_bank(&mut batch, bank)?;
        self.db.write(batch).map_err(storage_err)
    }

    /// Like [`commit`](Self::commit), also recording `epoch_number` as the
    /// last finished epoch.
    pub fn commit_epoch(
        &self,
        epoch_number: u64,
        state: StateBatch,
        bank: BankWrites,
    ) -> Result<(), IncentiveError> {
        let mut batch = WriteBatch::default();
        self.stage_state(&mut batch, state)?;
        self.stage_bank(&mut batch, bank)?;
        let cf = self.cf_handle(CF_METADATA)?;
        batch.put_cf(&cf, META_EPOCH_NUMBER, epoch_number.to_le_bytes());
        self.db.write(batch).map_err(storage_err)
    }

    /// Number of the last finished epoch; zero before the first one.
    pub fn epoch_number(&self) -> Result<u64, IncentiveError> {
        let cf = self.cf_handle(CF_METADATA)?;
        match self.db.get_cf(&cf, META_EPOCH_NUMBER).map_err(storage_err)? {
            Some(bytes) => decode_u64(&bytes),
            None => Ok(0),
        }
    }

    /// Create `amount` of `denom` in `account`. Returns the new balance.
    pub fn mint(&self, account: &Address, denom: &Denom, amount: u64) -> Result<u64, BankError> {
        let overflow = || BankError::BalanceOverflow {
            account: *account,
            denom: denom.clone(),
        };
        let balance = self
            .balance(account, denom)?
            .checked_add(amount)
            .ok_or_else(overflow)?;
        let supply = self
            .supply(denom)?
            .checked_add(amount)
            .ok_or_else(overflow)?;

        let cf_balances = self.cf_handle(CF_BALANCES).map_err(bank_err)?;
        let cf_supply = self.cf_handle(CF_SUPPLY).map_err(bank_err)?;
        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_balances, Self::balance_key(account, denom), balance.to_le_bytes());
        batch.put_cf(&cf_supply, denom.as_str().as_bytes(), supply.to_le_bytes());
        self.db
            .write(batch)
            .map_err(|e| BankError::Storage(e.to_string()))?;
        Ok(balance)
    }

    /// Total minted supply of `denom`.
    pub fn supply(&self, denom: &Denom) -> Result<u64, BankError> {
        let cf = self.cf_handle(CF_SUPPLY).map_err(bank_err)?;
        match self
            .db
            .get_cf(&cf, denom.as_str().as_bytes())
            .map_err(|e| BankError::Storage(e.to_string()))?
        {
            Some(bytes) => decode_u64(&bytes).map_err(bank_err),
            None => Ok(0),
        }
    }

    /// All nonzero balances of `account`, ordered by denom.
    pub fn balances_of(&self, account: &Address) -> Result<Vec<(Denom, u64)>, BankError> {
        let cf = self.cf_handle(CF_BALANCES).map_err(bank_err)?;
        let prefix = account.as_bytes();
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(&prefix[..], Direction::Forward));

        let mut result = Vec::new();
        for item in iter {
            let (key, value) = item.map_err(|e| BankError::Storage(e.to_string()))?;
            if key.len() <= ADDR_LEN || &key[..ADDR_LEN] != prefix {
                break;
            }
            let amount = decode_u64(&value).map_err(bank_err)?;
            if amount == 0 {
                continue;
            }
            let denom = std::str::from_utf8(&key[ADDR_LEN..])
                .map_err(|e| BankError::Storage(e.to_string()))
                .and_then(|s| Denom::new(s).map_err(|e| BankError::Storage(e.to_string())))?;
            result.push((denom, amount));
        }
        Ok(result)
    }

    /// Flush all in-memory buffers to disk.
    pub fn flush(&self) -> Result<(), IncentiveError> {
        self.db.flush().map_err(storage_err)
    }

    // --- Internal helpers ---

    /// Get a column family handle.
    fn cf_handle(&self, name: &str) -> Result<&rocksdb::ColumnFamily, IncentiveError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| storage_err(format!("missing column family: {name}")))
    }

    /// `contract ‖ participant`, so one contract's meters are contiguous.
    fn usage_key(contract: &Address, participant: &Address) -> [u8; USAGE_KEY_LEN] {
        let mut key = [0u8; USAGE_KEY_LEN];
        key[..ADDR_LEN].copy_from_slice(contract.as_bytes());
        key[ADDR_LEN..].copy_from_slice(participant.as_bytes());
        key
    }

    /// `account ‖ denom`.
    fn balance_key(account: &Address, denom: &Denom) -> Vec<u8> {
        let mut key = Vec::with_capacity(ADDR_LEN + denom.as_str().len());
        key.extend_from_slice(account.as_bytes());
        key.extend_from_slice(denom.as_str().as_bytes());
        key
    }

    /// Translate `state` into RocksDB writes, preserving op order.
    fn stage_state(&self, batch: &mut WriteBatch, state: StateBatch) -> Result<(), IncentiveError> {
        let cf_incentives = self.cf_handle(CF_INCENTIVES)?;
        let cf_usage = self.cf_handle(CF_USAGE)?;
        let cf_meta = self.cf_handle(CF_METADATA)?;

        for op in state.into_ops() {
            match op {
                StateOp::PutParams(params) => {
                    let bytes = bincode::encode_to_vec(&params, bincode::config::standard())
                        .map_err(storage_err)?;
                    batch.put_cf(&cf_meta, META_PARAMS, bytes);
                }
                StateOp::PutIncentive(incentive) => {
                    let bytes = bincode::encode_to_vec(&incentive, bincode::config::standard())
                        .map_err(storage_err)?;
                    batch.put_cf(&cf_incentives, incentive.contract.as_bytes(), bytes);
                }
                StateOp::DeleteIncentive(contract) => {
                    batch.delete_cf(&cf_incentives, contract.as_bytes());
                }
                StateOp::PutUsage {
                    contract,
                    participant,
                    usage,
                } => {
                    batch.put_cf(
                        &cf_usage,
                        Self::usage_key(&contract, &participant),
                        usage.to_le_bytes(),
                    );
                }
                StateOp::DeleteUsageFor(contract) => {
                    // [contract ‖ 00..00, contract ‖ ff..ff ‖ 00) covers every meter key.
                    let from = Self::usage_key(&contract, &Address::ZERO).to_vec();
                    let mut to = Self::usage_key(&contract, &Address::MAX).to_vec();
                    to.push(0);
                    batch.delete_range_cf(&cf_usage, from, to);
                }
            }
        }
        Ok(())
    }

    fn stage_bank(&self, batch: &mut WriteBatch, bank: BankWrites) -> Result<(), IncentiveError> {
        let cf = self.cf_handle(CF_BALANCES)?;
        for ((account, denom), amount) in bank.balances {
            batch.put_cf(&cf, Self::balance_key(&account, &denom), amount.to_le_bytes());
        }
        Ok(())
    }
}

impl IncentiveStore for RocksStore {
    fn params(&self) -> Result<Params, IncentiveError> {
        let cf = self.cf_handle(CF_METADATA)?;
        match self.db.get_cf(&cf, META_PARAMS).map_err(storage_err)? {
            Some(bytes) => {
                let (params, _): (Params, _) =
                    bincode::decode_from_slice(&bytes, bincode::config::standard())
                        .map_err(storage_err)?;
                Ok(params)
            }
            None => Ok(Params::default()),
        }
    }

    fn get_incentive(&self, contract: &Address) -> Result<Option<Incentive>, IncentiveError> {
        let cf = self.cf_handle(CF_INCENTIVES)?;
        match self.db.get_cf(&cf, contract.as_bytes()).map_err(storage_err)? {
            Some(bytes) => {
                let (incentive, _): (Incentive, _) =
                    bincode::decode_from_slice(&bytes, bincode::config::standard())
                        .map_err(storage_err)?;
                Ok(Some(incentive))
            }
            None => Ok(None),
        }
    }

    fn iter_incentives(&self) -> Result<Vec<Incentive>, IncentiveError> {
        let cf = self.cf_handle(CF_INCENTIVES)?;
        let mut result = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item.map_err(storage_err)?;
            let (incentive, _): (Incentive, _) =
                bincode::decode_from_slice(&value, bincode::config::standard())
                    .map_err(storage_err)?;
            result.push(incentive);
        }
        Ok(result)
    }

    fn get_usage(
        &self,
        contract: &Address,
        participant: &Address,
    ) -> Result<Option<u64>, IncentiveError> {
        let cf = self.cf_handle(CF_USAGE)?;
        match self
            .db
            .get_cf(&cf, Self::usage_key(contract, participant))
            .map_err(storage_err)?
        {
            Some(bytes) => decode_u64(&bytes).map(Some),
            None => Ok(None),
        }
    }

    fn iter_usage(&self, contract: &Address) -> Result<Vec<UsageMeter>, IncentiveError> {
        let cf = self.cf_handle(CF_USAGE)?;
        let start = Self::usage_key(contract, &Address::ZERO);
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(&start[..], Direction::Forward));

        let mut result = Vec::new();
        for item in iter {
            let (key, value) = item.map_err(storage_err)?;
            if key.len() != USAGE_KEY_LEN || &key[..ADDR_LEN] != contract.as_bytes() {
                break;
            }
            let participant = Address::try_from_slice(&key[ADDR_LEN..]).map_err(storage_err)?;
            result.push(UsageMeter {
                contract: *contract,
                participant,
                usage: decode_u64(&value)?,
            });
        }
        Ok(result)
    }

    fn apply(&mut self, batch: StateBatch) -> Result<(), IncentiveError> {
        self.commit(batch, BankWrites::default())
    }
}

impl BalanceOracle for RocksStore {
    fn balance(&self, account: &Address, denom: &Denom) -> Result<u64, BankError> {
        let cf = self.cf_handle(CF_BALANCES).map_err(bank_err)?;
        match self
            .db
            .get_cf(&cf, Self::balance_key(account, denom))
            .map_err(|e| BankError::Storage(e.to_string()))?
        {
            Some(bytes) => decode_u64(&bytes).map_err(bank_err),
            None => Ok(0),
        }
    }
}

impl SupplyOracle for RocksStore {
    fn has_supply(&self, denom: &Denom) -> Result<bool, BankError> {
        Ok(self.supply(denom)? > 0)
    }
}

/// A bank over a [`RocksStore`] whose transfers are held in memory until
/// the caller commits them with [`RocksStore::commit`].
///
/// Reads see staged transfers. Dropping the bank discards them.
pub struct StagedBank<'a> {
    store: &'a RocksStore,
    pending: Mutex<BankWrites>,
}

impl<'a> StagedBank<'a> {
    pub fn new(store: &'a RocksStore) -> Self {
        Self {
            store,
            pending: Mutex::new(BankWrites::default()),
        }
    }

    /// Consume the bank, returning the balance writes to commit.
    pub fn into_writes(self) -> BankWrites {
        self.pending.into_inner()
    }
}

impl BalanceOracle for StagedBank<'_> {
    fn balance(&self, account: &Address, denom: &Denom) -> Result<u64, BankError> {
        if let Some(staged) = self.pending.lock().get(account, denom) {
            return Ok(staged);
        }
        self.store.balance(account, denom)
    }
}

impl TransferService for StagedBank<'_> {
    fn transfer(
        &self,
        from: &Address,
        to: &Address,
        denom: &Denom,
        amount: u64,
    ) -> Result<(), BankError> {
        if from == to {
            return Ok(());
        }
        let mut pending = self.pending.lock();
        let have = match pending.get(from, denom) {
            Some(v) => v,
            None => self.store.balance(from, denom)?,
        };
        let remaining = have
            .checked_sub(amount)
            .ok_or_else(|| BankError::InsufficientFunds {
                account: *from,
                denom: denom.clone(),
                have,
                need: amount,
            })?;
        let current = match pending.get(to, denom) {
            Some(v) => v,
            None => self.store.balance(to, denom)?,
        };
        let credited = current
            .checked_add(amount)
            .ok_or_else(|| BankError::BalanceOverflow {
                account: *to,
                denom: denom.clone(),
            })?;

        pending.set(*from, denom.clone(), remaining);
        pending.set(*to, denom.clone(), credited);
        Ok(())
    }
}

impl SupplyOracle for StagedBank<'_> {
    fn has_supply(&self, denom: &Denom) -> Result<bool, BankError> {
        self.store.has_supply(denom)
    }
}
