// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Functional tests for the reshard engine.
//!
//! These tests drive the real resolver, batch migrator, slot state machine
//! and scheduler against an in-memory cluster. No Valkey server is needed.
//!
//! ```bash
//! # Run all functional tests
//! cargo test --test functional
//!
//! # Run specific test
//! cargo test --test functional test_failed_batches_roll_back_to_source
//! ```
//!
//! ## Test Categories
//!
//! - **Batch tests**: MIGRATE retries, BUSYKEY and NOKEY handling
//! - **Migration tests**: the per-slot SETSLOT protocol and rollback
//! - **Scheduler tests**: master checks, concurrency bound, halting
//! - **Resolver tests**: count mode against CLUSTER SLOTS

mod migration_tests;
mod scheduler_tests;

pub use mock_cluster::*;

use std::time::Duration;

use valkey_reshard::config::ReshardConfig;

/// Source master address used across tests.
pub const SRC: &str = "10.0.0.1:6379";
/// Destination master address used across tests.
pub const DST: &str = "10.0.0.2:6379";

/// Config with millisecond delays so retries and rollbacks stay fast.
pub fn fast_config() -> ReshardConfig {
    ReshardConfig::default()
        .with_retry_backoff(Duration::from_millis(1))
        .with_rollback_retry_delay(Duration::from_millis(1))
        .with_migrate_timeout(Duration::from_millis(100))
}

/// Source and destination masters with IDs `src-id` and `dst-id`.
pub fn two_masters(source: MockNode) -> MockCluster {
    MockCluster::new([source, MockNode::master("dst-id", DST)])
}
