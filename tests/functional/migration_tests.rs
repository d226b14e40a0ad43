//! Single-slot migration protocol and rollback.

use std::sync::Arc;
use std::time::Duration;

use valkey_reshard::ReshardError;
use valkey_reshard::client::SlotOwnershipState;
use valkey_reshard::config::ReshardConfig;
use valkey_reshard::slots::{MigrationPhase, SlotMigrator};

use crate::{DST, MockCluster, MockNode, MockTransport, SRC, ScriptedMigrate, fast_config, two_masters};

fn migrator(cluster: &MockCluster, config: ReshardConfig) -> SlotMigrator<MockTransport> {
    SlotMigrator::new(
        Arc::new(cluster.client(SRC)),
        Arc::new(cluster.client(DST)),
        "src-id",
        "dst-id",
        config,
    )
}

fn setslot_log(cluster: &MockCluster) -> Vec<(String, String)> {
    cluster
        .log()
        .into_iter()
        .filter(|c| c.command.starts_with("CLUSTER SETSLOT"))
        .map(|c| (c.node, c.command))
        .collect()
}

#[tokio::test]
async fn test_slot_migration_moves_every_key() {
    let cluster = two_masters(MockNode::master("src-id", SRC).with_keys(7, 12));

    let tracker = migrator(&cluster, fast_config()).migrate(7).await.unwrap();

    assert_eq!(tracker.phase, MigrationPhase::Finalized);
    assert_eq!(tracker.keys_migrated, 12);
    assert_eq!(tracker.failed_batches, 0);
    assert_eq!(cluster.key_count(SRC, 7), 0);
    assert_eq!(cluster.key_count(DST, 7), 12);
    assert_eq!(
        cluster.slot_state(SRC, 7),
        Some((SlotOwnershipState::Node, "dst-id".to_string()))
    );
    assert_eq!(
        cluster.slot_state(DST, 7),
        Some((SlotOwnershipState::Node, "dst-id".to_string()))
    );
    // 12 keys in batches of 5
    assert_eq!(cluster.count(SRC, "MIGRATE"), 3);
}

#[tokio::test]
async fn test_slot_migration_follows_setslot_order() {
    let cluster = two_masters(MockNode::master("src-id", SRC).with_keys(7, 2));

    migrator(&cluster, fast_config()).migrate(7).await.unwrap();

    let expected = vec![
        (DST.to_string(), "CLUSTER SETSLOT 7 IMPORTING src-id".to_string()),
        (SRC.to_string(), "CLUSTER SETSLOT 7 MIGRATING dst-id".to_string()),
        (SRC.to_string(), "CLUSTER SETSLOT 7 NODE dst-id".to_string()),
        (DST.to_string(), "CLUSTER SETSLOT 7 NODE dst-id".to_string()),
    ];
    assert_eq!(setslot_log(&cluster), expected);
}

#[tokio::test]
async fn test_empty_slot_skips_migrate() {
    let cluster = two_masters(MockNode::master("src-id", SRC));

    let tracker = migrator(&cluster, fast_config()).migrate(42).await.unwrap();

    assert!(tracker.phase.is_finalized());
    assert_eq!(tracker.keys_migrated, 0);
    assert_eq!(cluster.count(SRC, "MIGRATE"), 0);
    assert_eq!(cluster.count(SRC, "CLUSTER GETKEYSINSLOT"), 1);
}

#[tokio::test]
async fn test_small_fetches_drain_the_slot() {
    let cluster = two_masters(MockNode::master("src-id", SRC).with_keys(3, 9));
    let config = fast_config().with_keys_per_fetch(4).with_batch_size(3);

    let tracker = migrator(&cluster, config).migrate(3).await.unwrap();

    assert_eq!(tracker.keys_migrated, 9);
    assert_eq!(cluster.key_count(SRC, 3), 0);
    // 4 + 4 + 1 keys, then one empty fetch
    assert_eq!(cluster.count(SRC, "CLUSTER GETKEYSINSLOT"), 4);
}

#[tokio::test]
async fn test_nokey_batch_does_not_count_as_moved() {
    let cluster = two_masters(MockNode::master("src-id", SRC).with_keys(7, 3));
    cluster.update(SRC, |node| {
        node.migrate_script = [ScriptedMigrate::NoKey].into();
    });

    let tracker = migrator(&cluster, fast_config()).migrate(7).await.unwrap();

    // The keys are fetched again and moved by the next batch.
    assert!(tracker.phase.is_finalized());
    assert_eq!(tracker.keys_migrated, 3);
    assert_eq!(cluster.key_count(DST, 7), 3);
}

#[tokio::test]
async fn test_binary_key_names_migrate_unchanged() {
    let raw: &[u8] = &[0xff, b'{', b'7', b'}', 0xfe];
    let cluster = two_masters(
        MockNode::master("src-id", SRC)
            .with_keys(7, 1)
            .with_raw_key(7, raw),
    );

    let tracker = migrator(&cluster, fast_config()).migrate(7).await.unwrap();

    assert!(tracker.phase.is_finalized());
    assert_eq!(tracker.keys_migrated, 2);
    assert_eq!(cluster.key_count(SRC, 7), 0);
    assert!(cluster.inspect(DST, |node| node.keys[&7].contains(raw)));
    assert_eq!(cluster.count(SRC, "MIGRATE"), 1);
}

#[tokio::test]
async fn test_listed_keys_that_never_move_roll_back() {
    let cluster = two_masters(MockNode::master("src-id", SRC).with_stale_key(7, "{7}:gone"));

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        migrator(&cluster, fast_config()).migrate(7),
    )
    .await
    .expect("drain must stop when no key can be moved");

    match result.unwrap_err() {
        ReshardError::PartialMigration { slot, failed_batches, .. } => {
            assert_eq!(slot, 7);
            assert_eq!(failed_batches, 1);
        }
        other => panic!("expected PartialMigration, got {:?}", other),
    }
    assert_eq!(
        cluster.slot_state(SRC, 7),
        Some((SlotOwnershipState::Node, "src-id".to_string()))
    );
    assert_eq!(
        cluster.slot_state(DST, 7),
        Some((SlotOwnershipState::Node, "src-id".to_string()))
    );
    // One tolerated round of NOKEY, then the drain gives up
    assert_eq!(cluster.count(SRC, "CLUSTER GETKEYSINSLOT"), 2);
    assert_eq!(cluster.count(SRC, "MIGRATE"), 2);
}

#[tokio::test]
async fn test_stalled_rounds_reset_after_progress() {
    let cluster = two_masters(
        MockNode::master("src-id", SRC)
            .with_keys(7, 4)
            .with_stale_key(7, "{7}:gone"),
    );
    let config = fast_config().with_keys_per_fetch(2).with_batch_size(2);

    let err = migrator(&cluster, config).migrate(7).await.unwrap_err();

    assert!(matches!(err, ReshardError::PartialMigration { .. }));
    // Rounds that moved keys reset the stall count; only the last two stall.
    assert_eq!(cluster.key_count(SRC, 7), 0);
    assert_eq!(cluster.key_count(DST, 7), 4);
    assert_eq!(cluster.count(SRC, "CLUSTER GETKEYSINSLOT"), 4);
}

#[tokio::test]
async fn test_failed_batches_roll_back_to_source() {
    let cluster = two_masters(MockNode::master("src-id", SRC).with_keys(7, 12));
    cluster.update(SRC, |node| node.migrate_always_fails = true);

    let err = migrator(&cluster, fast_config()).migrate(7).await.unwrap_err();

    match &err {
        ReshardError::PartialMigration {
            slot,
            failed_batches,
            ..
        } => {
            assert_eq!(*slot, 7);
            assert_eq!(*failed_batches, 3);
        }
        other => panic!("expected PartialMigration, got {:?}", other),
    }
    assert!(err.is_fatal());
    assert_eq!(
        cluster.slot_state(SRC, 7),
        Some((SlotOwnershipState::Node, "src-id".to_string()))
    );
    assert_eq!(
        cluster.slot_state(DST, 7),
        Some((SlotOwnershipState::Node, "src-id".to_string()))
    );
    assert_eq!(cluster.key_count(SRC, 7), 12);
    // 3 batches, 3 attempts each, then draining stops
    assert_eq!(cluster.count(SRC, "MIGRATE"), 9);
    assert_eq!(cluster.count(SRC, "CLUSTER GETKEYSINSLOT"), 1);
}

#[tokio::test]
async fn test_rollback_retries_until_both_nodes_agree() {
    let cluster = two_masters(MockNode::master("src-id", SRC).with_keys(7, 1));
    cluster.update(SRC, |node| node.migrate_always_fails = true);
    cluster.update(DST, |node| {
        node.setslot_failures.insert(SlotOwnershipState::Node, 2);
    });

    let err = migrator(&cluster, fast_config()).migrate(7).await.unwrap_err();

    assert!(matches!(err, ReshardError::PartialMigration { .. }));
    assert_eq!(cluster.count(SRC, "CLUSTER SETSLOT 7 NODE src-id"), 3);
    assert_eq!(cluster.count(DST, "CLUSTER SETSLOT 7 NODE src-id"), 3);
    assert_eq!(
        cluster.slot_state(DST, 7),
        Some((SlotOwnershipState::Node, "src-id".to_string()))
    );
}

#[tokio::test]
async fn test_migrating_failure_leaves_destination_importing() {
    let cluster = two_masters(MockNode::master("src-id", SRC).with_keys(7, 2));
    cluster.update(SRC, |node| {
        node.setslot_failures.insert(SlotOwnershipState::Migrating, 1);
    });

    let err = migrator(&cluster, fast_config()).migrate(7).await.unwrap_err();

    assert!(matches!(
        err,
        ReshardError::SlotTransition {
            slot: 7,
            state: SlotOwnershipState::Migrating,
            ..
        }
    ));
    assert!(!err.is_fatal());
    assert_eq!(
        cluster.slot_state(DST, 7),
        Some((SlotOwnershipState::Importing, "src-id".to_string()))
    );
    assert_eq!(cluster.slot_state(SRC, 7), None);
    assert_eq!(cluster.count(SRC, "MIGRATE"), 0);
    assert_eq!(cluster.key_count(SRC, 7), 2);
}

#[tokio::test]
async fn test_importing_failure_leaves_source_untouched() {
    let cluster = two_masters(MockNode::master("src-id", SRC).with_keys(7, 2));
    cluster.update(DST, |node| {
        node.setslot_failures.insert(SlotOwnershipState::Importing, 1);
    });

    let err = migrator(&cluster, fast_config()).migrate(7).await.unwrap_err();

    assert!(matches!(
        err,
        ReshardError::SlotTransition {
            state: SlotOwnershipState::Importing,
            ..
        }
    ));
    assert!(cluster.commands(SRC).is_empty());
}

#[tokio::test]
async fn test_finalize_failure_is_reported_not_repaired() {
    let cluster = two_masters(MockNode::master("src-id", SRC).with_keys(7, 2));
    cluster.update(DST, |node| {
        node.setslot_failures.insert(SlotOwnershipState::Node, 1);
    });

    let err = migrator(&cluster, fast_config()).migrate(7).await.unwrap_err();

    assert!(matches!(
        err,
        ReshardError::SlotTransition {
            state: SlotOwnershipState::Node,
            ..
        }
    ));
    assert_eq!(
        cluster.slot_state(SRC, 7),
        Some((SlotOwnershipState::Node, "dst-id".to_string()))
    );
    assert_eq!(
        cluster.slot_state(DST, 7),
        Some((SlotOwnershipState::Importing, "src-id".to_string()))
    );
    assert_eq!(cluster.key_count(DST, 7), 2);
}
