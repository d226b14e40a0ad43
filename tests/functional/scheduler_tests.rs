//! Range scheduling: master checks, the concurrency bound and halting.

use std::time::Duration;

use valkey_reshard::client::{SlotOwnershipState, SlotRange};
use valkey_reshard::{ReshardError, Resharder};

use crate::{DST, MockCluster, MockNode, MockTransport, SRC, fast_config, two_masters};

fn resharder(cluster: &MockCluster, max_concurrent: usize) -> Resharder<MockTransport> {
    Resharder::new(
        cluster.client(SRC),
        cluster.client(DST),
        fast_config().with_max_concurrent(max_concurrent),
    )
}

fn source_with_keys(slots: std::ops::RangeInclusive<u16>, keys_per_slot: usize) -> MockNode {
    slots.fold(MockNode::master("src-id", SRC), |node, slot| {
        node.with_keys(slot, keys_per_slot)
    })
}

#[tokio::test]
async fn test_reshard_single_slot() {
    let cluster = two_masters(source_with_keys(100..=100, 4));

    let report = resharder(&cluster, 5)
        .reshard(SlotRange::single(100).unwrap())
        .await
        .unwrap();

    assert_eq!(report.migrated_slots(), vec![100]);
    assert_eq!(report.keys_migrated(), 4);
    assert!(report.is_complete());
    assert_eq!(cluster.key_count(DST, 100), 4);
}

#[tokio::test]
async fn test_concurrency_reaches_but_never_exceeds_limit() {
    let cluster = two_masters(source_with_keys(0..=11, 3));
    let delay = Duration::from_millis(2);
    let resharder = Resharder::new(
        valkey_reshard::NodeClient::new(cluster.transport(SRC).with_delay(delay)),
        valkey_reshard::NodeClient::new(cluster.transport(DST).with_delay(delay)),
        fast_config().with_max_concurrent(5),
    );

    let report = resharder
        .reshard(SlotRange::new(0, 11).unwrap())
        .await
        .unwrap();

    assert!(report.is_complete());
    assert_eq!(report.migrated_slots(), (0..=11).collect::<Vec<u16>>());
    assert_eq!(report.keys_migrated(), 36);
    // Twelve slots against a limit of five: the gate fills up, never past it.
    assert_eq!(report.peak_concurrency, 5);

    let peak_migrating = cluster.inspect(SRC, |node| node.peak_migrating);
    assert!(peak_migrating <= 5, "peak MIGRATING slots {}", peak_migrating);
    for slot in 0..=11 {
        assert_eq!(cluster.key_count(SRC, slot), 0);
        assert_eq!(
            cluster.slot_state(DST, slot),
            Some((SlotOwnershipState::Node, "dst-id".to_string()))
        );
    }
}

#[tokio::test]
async fn test_serial_when_limit_is_one() {
    let cluster = two_masters(source_with_keys(0..=3, 1));

    let report = resharder(&cluster, 1)
        .reshard(SlotRange::new(0, 3).unwrap())
        .await
        .unwrap();

    assert_eq!(report.peak_concurrency, 1);
    assert_eq!(cluster.inspect(SRC, |node| node.peak_migrating), 1);
}

#[tokio::test]
async fn test_node_ids_are_fetched_once_per_run() {
    let cluster = two_masters(source_with_keys(0..=5, 1));

    resharder(&cluster, 3)
        .reshard(SlotRange::new(0, 5).unwrap())
        .await
        .unwrap();

    assert_eq!(cluster.count(SRC, "CLUSTER MYID"), 1);
    assert_eq!(cluster.count(DST, "CLUSTER MYID"), 1);
    assert_eq!(cluster.count(SRC, "ROLE"), 1);
}

#[tokio::test]
async fn test_destination_not_master_changes_nothing() {
    let cluster = MockCluster::new([
        source_with_keys(0..=2, 2),
        MockNode::replica("dst-id", DST),
    ]);

    let err = resharder(&cluster, 5)
        .reshard(SlotRange::new(0, 2).unwrap())
        .await
        .unwrap_err();

    match &err {
        ReshardError::NotMaster { address } => assert_eq!(address.to_string(), DST),
        other => panic!("expected NotMaster, got {:?}", other),
    }
    assert_eq!(err.exit_code(), 2);
    assert!(
        cluster
            .log()
            .iter()
            .all(|c| !c.command.starts_with("CLUSTER SETSLOT"))
    );
    assert_eq!(cluster.key_count(SRC, 0), 2);
}

#[tokio::test]
async fn test_source_not_master_changes_nothing() {
    let cluster = MockCluster::new([
        MockNode::replica("src-id", SRC).with_keys(5, 1),
        MockNode::master("dst-id", DST),
    ]);

    let err = resharder(&cluster, 5)
        .reshard(SlotRange::single(5).unwrap())
        .await
        .unwrap_err();

    assert!(matches!(err, ReshardError::NotMaster { .. }));
    assert_eq!(cluster.count(SRC, "CLUSTER SETSLOT"), 0);
    assert_eq!(cluster.count(DST, "CLUSTER SETSLOT"), 0);
}

#[tokio::test]
async fn test_partial_migration_halts_pending_slots() {
    let cluster = two_masters(source_with_keys(0..=3, 2));
    cluster.update(SRC, |node| node.migrate_always_fails = true);

    let err = resharder(&cluster, 1)
        .reshard(SlotRange::new(0, 3).unwrap())
        .await
        .unwrap_err();

    assert!(matches!(err, ReshardError::PartialMigration { .. }));
    assert_eq!(err.exit_code(), 1);
    // Only the first admitted slot was started.
    assert_eq!(cluster.count(SRC, "CLUSTER SETSLOT"), 2);
    assert_eq!(cluster.count(DST, "CLUSTER SETSLOT"), 2);
}

#[tokio::test]
async fn test_transition_failure_is_collected_in_report() {
    let cluster = two_masters(source_with_keys(0..=2, 1));
    cluster.update(DST, |node| {
        node.setslot_failures
            .insert(SlotOwnershipState::Importing, 1);
    });

    let report = resharder(&cluster, 1)
        .reshard(SlotRange::new(0, 2).unwrap())
        .await
        .unwrap();

    assert!(!report.is_complete());
    assert_eq!(report.migrated.len(), 2);
    assert_eq!(report.failed.len(), 1);
    assert!(matches!(
        report.failed[0].error,
        ReshardError::SlotTransition {
            state: SlotOwnershipState::Importing,
            ..
        }
    ));
    assert!(report.skipped.is_empty());
}

#[tokio::test]
async fn test_invalid_config_is_rejected_before_any_command() {
    let cluster = two_masters(source_with_keys(0..=1, 1));

    let err = resharder(&cluster, 0)
        .reshard(SlotRange::new(0, 1).unwrap())
        .await
        .unwrap_err();

    assert!(matches!(err, ReshardError::InvalidConfig(_)));
    assert!(cluster.log().is_empty());
}
