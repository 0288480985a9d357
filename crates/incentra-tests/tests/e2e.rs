//! End-to-end tests for Incentra.
//!
//! The first half drives the keeper over the in-memory store and bank; the
//! second half boots a RocksDB-backed node and runs the same lifecycle
//! through its public API, including epoch ends and reopening the database.

use incentra_core::error::IncentiveError;
use incentra_core::genesis::GenesisState;
use incentra_core::state::MemoryStore;
use incentra_core::{Incentive, Params, Rate};
use incentra_node_lib::{Node, NodeConfig};
use incentra_tests::helpers::*;

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

#[test]
fn e2e_already_registered_leaves_registry_unchanged() {
    let mut h = Harness::new(open_params());
    h.fund_pool("uatom", 100);
    let first = h.register(addr(1), vec![alloc("uatom", "0.2")], 2).unwrap();

    let err = h.register(addr(1), vec![alloc("uatom", "0.1")], 9).unwrap_err();

    assert_eq!(err, IncentiveError::AlreadyRegistered { contract: addr(1) });
    assert_eq!(h.keeper.incentives(&h.store).unwrap(), vec![first]);
}

#[test]
fn e2e_allocation_sums_capped_at_one() {
    let mut h = Harness::new(open_params());
    h.fund_pool("xtoken", 100);
    h.register(addr(0xa), vec![alloc("xtoken", "0.6")], 3).unwrap();

    let err = h.register(addr(0xb), vec![alloc("xtoken", "0.5")], 3).unwrap_err();
    match err {
        IncentiveError::OverAllocated { denom: d, .. } => assert_eq!(d, denom("xtoken")),
        other => panic!("expected OverAllocated, got {other:?}"),
    }
    assert!(h.keeper.incentive(&h.store, &addr(0xb)).is_err());

    h.register(addr(0xb), vec![alloc("xtoken", "0.3")], 3).unwrap();
    assert_eq!(
        h.keeper.allocation_meter(&h.store, &denom("xtoken")).unwrap(),
        rate("0.9")
    );
}

#[test]
fn e2e_rate_above_ceiling_rejected_on_empty_registry() {
    let mut h = Harness::new(Params::default());
    h.fund_pool("uatom", 100);

    let err = h.register(addr(1), vec![alloc("uatom", "0.06")], 1).unwrap_err();

    assert!(matches!(err, IncentiveError::RateTooHigh { .. }));
    assert!(h.keeper.incentives(&h.store).unwrap().is_empty());
}

#[test]
fn e2e_native_denom_needs_no_supply() {
    let mut h = Harness::new(open_params());
    h.register(addr(1), vec![alloc(NATIVE, "0.1")], 1).unwrap();

    let err = h.register(addr(2), vec![alloc("ghost", "0.1")], 1).unwrap_err();
    assert_eq!(err, IncentiveError::UnknownDenom { denom: denom("ghost") });
}

// ---------------------------------------------------------------------------
// Distribution
// ---------------------------------------------------------------------------

#[test]
fn e2e_concrete_payout_scenario() {
    let mut h = Harness::new(open_params());
    h.fund_pool("uatom", 100);
    let contract = addr(0xc);
    let p = addr(0x01);
    let q = addr(0x02);

    h.register(contract, vec![alloc("uatom", "0.2")], 2).unwrap();
    assert!(h.report(contract, p, 500));
    assert!(h.report(contract, q, 500));
    assert_eq!(h.keeper.incentive(&h.store, &contract).unwrap().total_usage, 1000);

    let report = h.distribute().unwrap();

    // floor(100 * 0.2 * 500 / 1000)
    assert_eq!(h.balance(&p, "uatom"), 10);
    assert_eq!(h.balance(&q, "uatom"), 10);
    assert!(report.total_paid(&denom("uatom")) <= 20);
    assert_eq!(h.balance(&h.pool(), "uatom"), 80);

    let after = h.keeper.incentive(&h.store, &contract).unwrap();
    assert_eq!(after.epochs, 1);
    assert_eq!(after.total_usage, 0);
    assert_eq!(h.keeper.usage_meter(&h.store, &contract, &p).unwrap(), None);
    assert!(report.completed.is_empty());
}

#[test]
fn e2e_last_epoch_removes_incentive_and_meters() {
    let mut h = Harness::new(open_params());
    h.fund_pool("uatom", 1_000);
    h.register(addr(1), vec![alloc("uatom", "0.1")], 1).unwrap();
    h.report(addr(1), addr(50), 3);
    h.report(addr(1), addr(51), 7);

    let report = h.distribute().unwrap();

    assert_eq!(report.completed, vec![addr(1)]);
    assert!(h.keeper.incentive(&h.store, &addr(1)).is_err());
    assert!(h.keeper.usage_meters(&h.store, &addr(1)).unwrap().is_empty());
    assert_eq!(h.balance(&addr(50), "uatom"), 30);
    assert_eq!(h.balance(&addr(51), "uatom"), 70);
}

#[test]
fn e2e_incentive_runs_exactly_its_epochs() {
    let mut h = Harness::new(open_params());
    h.fund_pool("uatom", 10_000);
    h.register(addr(1), vec![alloc("uatom", "0.01")], 3).unwrap();

    for remaining in [2, 1] {
        h.report(addr(1), addr(9), 1);
        h.distribute().unwrap();
        assert_eq!(h.keeper.incentive(&h.store, &addr(1)).unwrap().epochs, remaining);
    }
    h.distribute().unwrap();
    assert!(h.keeper.incentives(&h.store).unwrap().is_empty());
    // Pool shrinks by 1% each paid epoch: 100, then 99.
    assert_eq!(h.balance(&addr(9), "uatom"), 199);
}

#[test]
fn e2e_epoch_hook_only_fires_on_configured_identifier() {
    let mut h = Harness::new(open_params());
    h.fund_pool("uatom", 100);
    h.register(addr(1), vec![alloc("uatom", "0.5")], 2).unwrap();
    h.report(addr(1), addr(2), 1);

    let day = h
        .keeper
        .after_epoch_end(&mut h.store, &h.bank, "day", 1)
        .unwrap();
    assert!(day.is_none());
    assert_eq!(h.balance(&addr(2), "uatom"), 0);

    let week = h
        .keeper
        .after_epoch_end(&mut h.store, &h.bank, "week", 1)
        .unwrap();
    assert_eq!(week.unwrap().total_paid(&denom("uatom")), 50);
}

// ---------------------------------------------------------------------------
// Cancellation and genesis
// ---------------------------------------------------------------------------

#[test]
fn e2e_cancel_lifecycle() {
    let mut h = Harness::new(open_params());
    h.fund_pool("uatom", 100);

    let err = h.keeper.cancel_incentive(&mut h.store, &addr(1)).unwrap_err();
    assert_eq!(err, IncentiveError::NotFound { contract: addr(1) });

    h.register(addr(1), vec![alloc("uatom", "0.2")], 2).unwrap();
    h.report(addr(1), addr(2), 5);
    h.keeper.cancel_incentive(&mut h.store, &addr(1)).unwrap();

    assert_eq!(
        h.keeper.incentive(&h.store, &addr(1)).unwrap_err(),
        IncentiveError::NotFound { contract: addr(1) }
    );

    // Re-registering starts from a clean ledger.
    h.register(addr(1), vec![alloc("uatom", "0.2")], 2).unwrap();
    assert!(h.keeper.usage_meters(&h.store, &addr(1)).unwrap().is_empty());
}

#[test]
fn e2e_genesis_export_import_roundtrip() {
    let mut h = Harness::new(open_params());
    h.fund_pool("uatom", 100);
    h.fund_pool("uosmo", 100);
    h.register(addr(1), vec![alloc("uatom", "0.2"), alloc("uosmo", "0.4")], 4).unwrap();
    h.register(addr(2), vec![alloc("uatom", "0.3")], 1).unwrap();

    let exported = h.keeper.export_genesis(&h.store).unwrap();
    let json = exported.to_json().unwrap();

    let imported = GenesisState::from_json(&json).unwrap();
    let mut fresh = MemoryStore::new();
    h.keeper.init_genesis(&mut fresh, &imported).unwrap();

    assert_eq!(h.keeper.export_genesis(&fresh).unwrap(), exported);
    assert_eq!(
        h.keeper.incentives(&fresh).unwrap(),
        h.keeper.incentives(&h.store).unwrap()
    );
}

// ---------------------------------------------------------------------------
// Node over RocksDB
// ---------------------------------------------------------------------------

#[test]
fn e2e_node_concrete_scenario() {
    let (node, _dir) = test_node();
    node.set_params(open_params()).unwrap();
    node.fund(&node.pool_address(), &denom("uatom"), 100).unwrap();

    node.register_incentive(addr(0xc), vec![alloc("uatom", "0.2")], 2)
        .unwrap();
    node.report_usage(&addr(0xc), &addr(1), 500).unwrap();
    node.report_usage(&addr(0xc), &addr(2), 500).unwrap();

    let (epoch, report) = node.end_epoch("week").unwrap();

    assert_eq!(epoch, 1);
    assert_eq!(report.unwrap().total_paid(&denom("uatom")), 20);
    assert_eq!(node.balance(&addr(1), &denom("uatom")).unwrap(), 10);
    let incentive = node.incentive(&addr(0xc)).unwrap();
    assert_eq!((incentive.epochs, incentive.total_usage), (1, 0));
    assert!(node.usage_meters(&addr(0xc)).unwrap().is_empty());
}

#[test]
fn e2e_node_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = NodeConfig {
        data_dir: dir.path().to_path_buf(),
        ..NodeConfig::default()
    };
    {
        let node = Node::open(config.clone()).unwrap();
        node.set_params(open_params()).unwrap();
        node.fund(&node.pool_address(), &denom("uatom"), 100).unwrap();
        node.register_incentive(addr(1), vec![alloc("uatom", "0.5")], 3)
            .unwrap();
        node.report_usage(&addr(1), &addr(2), 4).unwrap();
        node.end_epoch("other").unwrap();
        node.flush().unwrap();
    }

    let node = Node::open(config).unwrap();
    assert_eq!(node.params().unwrap().allocation_limit, Rate::ONE);
    assert_eq!(node.epoch_number().unwrap(), 1);
    assert_eq!(node.incentive(&addr(1)).unwrap().total_usage, 4);
    assert_eq!(
        node.usage_meter(&addr(1), &addr(2)).unwrap().map(|m| m.usage),
        Some(4)
    );
    assert_eq!(node.balance(&node.pool_address(), &denom("uatom")).unwrap(), 100);
}

#[test]
fn e2e_node_disabled_module_ignores_usage_and_registration() {
    let (node, _dir) = test_node();
    node.set_params(Params {
        enable_incentives: false,
        ..open_params()
    })
    .unwrap();

    let err = node
        .register_incentive(addr(1), vec![alloc(NATIVE, "0.1")], 1)
        .unwrap_err();
    assert_eq!(err, IncentiveError::Disabled);
    assert!(!node.report_usage(&addr(1), &addr(2), 10).unwrap());
}

#[test]
fn e2e_node_genesis_export_matches_registry() {
    let (node, _dir) = test_node();
    node.set_params(open_params()).unwrap();
    node.register_incentive(addr(3), vec![alloc(NATIVE, "0.25")], 2)
        .unwrap();

    let genesis = node.export_genesis().unwrap();
    assert_eq!(genesis.params, open_params());
    assert_eq!(
        genesis.incentives,
        vec![Incentive::new(addr(3), vec![alloc(NATIVE, "0.25")], 2)]
    );
    let value: serde_json::Value = serde_json::from_str(&genesis.to_json().unwrap()).unwrap();
    assert_eq!(value["incentives"][0]["epochs"], 2);
}
