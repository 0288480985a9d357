//! End-to-end and adversarial test suite for Incentra.
//!
//! The integration tests in `tests/` drive the keeper over the in-memory
//! store and bank, and the full node over RocksDB, checking payout
//! arithmetic and registry invariants under randomized inputs.

pub mod helpers;
