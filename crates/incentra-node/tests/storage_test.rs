//! RocksDB-backed storage driven through the keeper, including reopen.

use std::sync::Arc;

use incentra_core::state::{CacheStore, IncentiveStore};
use incentra_core::traits::BalanceOracle;
use incentra_core::{Address, Allocation, Denom, Incentive, Keeper, Params, Rate};
use incentra_node_lib::storage::{RocksStore, StagedBank};

fn addr(seed: u8) -> Address {
    Address([seed; 20])
}

fn uatom() -> Denom {
    Denom::new("uatom").unwrap()
}

fn keeper() -> Keeper {
    Keeper::new(Arc::new(Denom::new("aincentra").unwrap()))
}

/// Run one keeper operation against a staged overlay and commit it.
fn commit_with<T>(
    store: &RocksStore,
    op: impl FnOnce(&mut CacheStore<'_, RocksStore>, &StagedBank<'_>) -> T,
) -> T {
    let bank = StagedBank::new(store);
    let mut cache = CacheStore::new(store);
    let out = op(&mut cache, &bank);
    store.commit(cache.into_batch(), bank.into_writes()).unwrap();
    out
}

#[test]
fn fresh_store_has_default_params_and_nothing_registered() {
    let dir = tempfile::tempdir().unwrap();
    let store = RocksStore::open(dir.path()).unwrap();
    assert_eq!(store.params().unwrap(), Params::default());
    assert!(store.iter_incentives().unwrap().is_empty());
    assert_eq!(store.epoch_number().unwrap(), 0);
}

#[test]
fn registry_and_ledger_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let keeper = keeper();
    {
        let store = RocksStore::open(dir.path()).unwrap();
        store.mint(&keeper.pool_address(), &uatom(), 500).unwrap();
        commit_with(&store, |cache, bank| {
            keeper
                .register_incentive(
                    cache,
                    bank,
                    addr(1),
                    vec![Allocation::new(uatom(), Rate::percent(4))],
                    3,
                )
                .unwrap();
            keeper.report_usage(cache, &addr(1), &addr(9), 42).unwrap();
        });
        store.flush().unwrap();
    }

    let store = RocksStore::open(dir.path()).unwrap();
    let incentive = keeper.incentive(&store, &addr(1)).unwrap();
    assert_eq!(incentive.epochs, 3);
    assert_eq!(incentive.total_usage, 42);
    assert_eq!(store.get_usage(&addr(1), &addr(9)).unwrap(), Some(42));
    assert_eq!(store.balance(&keeper.pool_address(), &uatom()).unwrap(), 500);
}

#[test]
fn distribution_commits_payouts_and_ledger_reset_together() {
    let dir = tempfile::tempdir().unwrap();
    let store = RocksStore::open(dir.path()).unwrap();
    let keeper = keeper();
    store.mint(&keeper.pool_address(), &uatom(), 10_000).unwrap();

    commit_with(&store, |cache, bank| {
        keeper
            .register_incentive(
                cache,
                bank,
                addr(1),
                vec![Allocation::new(uatom(), Rate::percent(5))],
                1,
            )
            .unwrap();
        keeper.report_usage(cache, &addr(1), &addr(20), 1).unwrap();
        keeper.report_usage(cache, &addr(1), &addr(21), 1).unwrap();
    });

    let report = commit_with(&store, |cache, bank| {
        keeper.distribute_incentives(cache, bank).unwrap()
    });

    // 5% of 10_000 split evenly.
    assert_eq!(report.total_paid(&uatom()), 500);
    assert_eq!(report.completed, vec![addr(1)]);
    assert_eq!(store.balance(&addr(20), &uatom()).unwrap(), 250);
    assert_eq!(store.balance(&addr(21), &uatom()).unwrap(), 250);
    assert_eq!(store.balance(&keeper.pool_address(), &uatom()).unwrap(), 9_500);
    assert_eq!(store.get_incentive(&addr(1)).unwrap(), None);
    assert!(store.iter_usage(&addr(1)).unwrap().is_empty());
}

#[test]
fn dropped_overlay_leaves_store_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let store = RocksStore::open(dir.path()).unwrap();
    let keeper = keeper();
    store.mint(&keeper.pool_address(), &uatom(), 100).unwrap();

    {
        let bank = StagedBank::new(&store);
        let mut cache = CacheStore::new(&store);
        keeper
            .register_incentive(
                &mut cache,
                &bank,
                addr(1),
                vec![Allocation::new(uatom(), Rate::percent(5))],
                1,
            )
            .unwrap();
        assert!(cache.get_incentive(&addr(1)).unwrap().is_some());
    }

    assert!(store.get_incentive(&addr(1)).unwrap().is_none());
}

#[test]
fn cancel_purges_only_that_contracts_meters() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = RocksStore::open(dir.path()).unwrap();
    let keeper = keeper();
    let native = keeper.native_denom();

    for contract in [addr(1), addr(2)] {
        store
            .create_incentive(Incentive::new(
                contract,
                vec![Allocation::new(native.clone(), Rate::percent(1))],
                2,
            ))
            .unwrap();
        keeper.report_usage(&mut store, &contract, &addr(0xff), 7).unwrap();
        keeper.report_usage(&mut store, &contract, &addr(0x00), 3).unwrap();
    }

    keeper.cancel_incentive(&mut store, &addr(1)).unwrap();

    assert!(store.iter_usage(&addr(1)).unwrap().is_empty());
    assert_eq!(store.iter_usage(&addr(2)).unwrap().len(), 2);
    assert_eq!(store.get_usage(&addr(2), &addr(0xff)).unwrap(), Some(7));
}

#[test]
fn epoch_number_persists() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = RocksStore::open(dir.path()).unwrap();
        store
            .commit_epoch(7, Default::default(), Default::default())
            .unwrap();
    }
    let store = RocksStore::open(dir.path()).unwrap();
    assert_eq!(store.epoch_number().unwrap(), 7);
}
