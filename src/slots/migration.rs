//! Slot migration state machine.
//!
//! This module drives the Valkey slot migration protocol for one slot:
//! 1. SETSLOT IMPORTING on the destination
//! 2. SETSLOT MIGRATING on the source
//! 3. MIGRATE keys in batches until the slot is empty
//! 4. SETSLOT NODE on source then destination
//!
//! If any key batch fails, both nodes are set back to NODE <source>
//! until that succeeds, and the migration ends as aborted.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::client::{NodeClient, SlotOwnershipState, Transport};
use crate::config::ReshardConfig;
use crate::error::{ReshardError, Result};

use super::batch::{BatchOutcome, KeyBatchMigrator};

/// Consecutive fetch rounds that may move nothing before draining gives up.
///
/// A round where every batch replied NOKEY moved no keys. One such round
/// can happen when keys expire between GETKEYSINSLOT and MIGRATE; a second
/// one in a row means the source keeps listing keys MIGRATE cannot see.
const MAX_STALLED_ROUNDS: u32 = 2;

/// Phase of a single slot migration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum MigrationPhase {
    /// Migration not started.
    #[default]
    Idle,
    /// Destination is importing (SETSLOT IMPORTING sent).
    DestImporting,
    /// Source is migrating (SETSLOT MIGRATING sent).
    SrcMigrating,
    /// Keys are being transferred.
    KeysDraining,
    /// Key transfer failed, ownership is being restored.
    RollingBack,
    /// Both nodes own the slot as NODE <destination>.
    Finalized,
    /// Ownership restored to the source after a key transfer failure.
    Aborted,
    /// A SETSLOT transition failed; nothing was repaired.
    Failed {
        /// Error description.
        error: String,
    },
}

impl MigrationPhase {
    /// Check if this phase indicates the migration is done.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MigrationPhase::Finalized | MigrationPhase::Aborted | MigrationPhase::Failed { .. }
        )
    }

    /// Check if the migration completed successfully.
    pub fn is_finalized(&self) -> bool {
        matches!(self, MigrationPhase::Finalized)
    }

    /// Check if the migration is in progress.
    pub fn is_in_progress(&self) -> bool {
        !self.is_terminal() && !matches!(self, MigrationPhase::Idle)
    }
}

impl std::fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MigrationPhase::Idle => write!(f, "idle"),
            MigrationPhase::DestImporting => write!(f, "dest-importing"),
            MigrationPhase::SrcMigrating => write!(f, "src-migrating"),
            MigrationPhase::KeysDraining => write!(f, "keys-draining"),
            MigrationPhase::RollingBack => write!(f, "rolling-back"),
            MigrationPhase::Finalized => write!(f, "finalized"),
            MigrationPhase::Aborted => write!(f, "aborted"),
            MigrationPhase::Failed { error } => write!(f, "failed: {}", error),
        }
    }
}

/// Tracks the progress of one slot migration.
#[derive(Debug, Clone)]
pub struct SlotMigrationTracker {
    /// The slot being migrated.
    pub slot: u16,
    /// Source node ID.
    pub source_node: String,
    /// Destination node ID.
    pub target_node: String,
    /// Current phase of the migration.
    pub phase: MigrationPhase,
    /// Keys moved so far (NOKEY batches are not counted).
    pub keys_migrated: u64,
    /// Batches that exhausted their MIGRATE attempts.
    pub failed_batches: usize,
    /// Number of rollback rounds needed before both nodes agreed.
    pub rollback_attempts: u32,
}

impl SlotMigrationTracker {
    /// Create a new migration tracker.
    pub fn new(slot: u16, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            slot,
            source_node: source.into(),
            target_node: target.into(),
            phase: MigrationPhase::Idle,
            keys_migrated: 0,
            failed_batches: 0,
            rollback_attempts: 0,
        }
    }

    /// Transition to the next phase.
    pub fn advance(&mut self, next: MigrationPhase) {
        self.phase = next;
    }

    /// Record keys as migrated.
    pub fn record_keys_migrated(&mut self, count: u64) {
        self.keys_migrated += count;
    }

    /// Record a batch that could not be moved.
    pub fn record_failed_batch(&mut self) {
        self.failed_batches += 1;
    }

    /// Mark as failed with an error message.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.phase = MigrationPhase::Failed {
            error: error.into(),
        };
    }

    /// Check if the migration is done.
    pub fn is_done(&self) -> bool {
        self.phase.is_terminal()
    }
}

/// Runs the migration protocol for single slots between two fixed nodes.
pub struct SlotMigrator<T> {
    source: Arc<NodeClient<T>>,
    destination: Arc<NodeClient<T>>,
    source_id: String,
    destination_id: String,
    config: ReshardConfig,
}

impl<T: Transport> SlotMigrator<T> {
    /// Create a migrator for nodes whose IDs are already known.
    pub fn new(
        source: Arc<NodeClient<T>>,
        destination: Arc<NodeClient<T>>,
        source_id: impl Into<String>,
        destination_id: impl Into<String>,
        config: ReshardConfig,
    ) -> Self {
        Self {
            source,
            destination,
            source_id: source_id.into(),
            destination_id: destination_id.into(),
            config,
        }
    }

    /// Migrate one slot end to end.
    ///
    /// Returns the finalized tracker, or an error. A key transfer failure
    /// comes back as [`ReshardError::PartialMigration`] once the slot has
    /// been handed back to the source.
    pub async fn migrate(&self, slot: u16) -> Result<SlotMigrationTracker> {
        let mut tracker = SlotMigrationTracker::new(slot, &self.source_id, &self.destination_id);
        info!(
            slot,
            source = %self.source.address(),
            destination = %self.destination.address(),
            "Starting slot migration"
        );

        self.transition(
            &mut tracker,
            &self.destination,
            SlotOwnershipState::Importing,
            &self.source_id,
        )
        .await?;
        tracker.advance(MigrationPhase::DestImporting);

        // A failure here leaves the destination IMPORTING.
        self.transition(
            &mut tracker,
            &self.source,
            SlotOwnershipState::Migrating,
            &self.destination_id,
        )
        .await?;
        tracker.advance(MigrationPhase::SrcMigrating);

        tracker.advance(MigrationPhase::KeysDraining);
        self.drain_keys(&mut tracker).await;

        if tracker.failed_batches > 0 {
            return Err(self.rollback(&mut tracker).await);
        }

        self.transition(
            &mut tracker,
            &self.source,
            SlotOwnershipState::Node,
            &self.destination_id,
        )
        .await?;
        self.transition(
            &mut tracker,
            &self.destination,
            SlotOwnershipState::Node,
            &self.destination_id,
        )
        .await?;
        tracker.advance(MigrationPhase::Finalized);

        info!(
            slot,
            keys = tracker.keys_migrated,
            source = %self.source.address(),
            destination = %self.destination.address(),
            "Finished slot migration"
        );
        Ok(tracker)
    }

    async fn transition(
        &self,
        tracker: &mut SlotMigrationTracker,
        node: &NodeClient<T>,
        state: SlotOwnershipState,
        node_id: &str,
    ) -> Result<()> {
        match node.set_slot_state(tracker.slot, state, node_id).await {
            Ok(()) => Ok(()),
            Err(e) => {
                error!(
                    slot = tracker.slot,
                    state = %state,
                    node = %node.address(),
                    phase = %tracker.phase,
                    error = %e,
                    "Slot state transition failed"
                );
                tracker.fail(e.to_string());
                Err(ReshardError::SlotTransition {
                    slot: tracker.slot,
                    state,
                    address: node.address().clone(),
                    source: e,
                })
            }
        }
    }

    /// Move keys until a fetch comes back empty.
    ///
    /// GETKEYSINSLOT has no cursor, so this stays serial. Keys of a failed
    /// batch are still in the slot and would be fetched again, so draining
    /// stops after the first fetch round with a failure. Rounds that move
    /// nothing count against [`MAX_STALLED_ROUNDS`] and end the drain as a
    /// failed batch.
    async fn drain_keys(&self, tracker: &mut SlotMigrationTracker) {
        let migrator = KeyBatchMigrator::new(&self.source, self.destination.address(), &self.config);
        let batch_size = self.config.batch_size;
        let mut batch: Vec<Vec<u8>> = Vec::with_capacity(batch_size);
        let mut stalled_rounds = 0;

        loop {
            let keys = self
                .source
                .keys_in_slot(tracker.slot, self.config.keys_per_fetch)
                .await;
            if keys.is_empty() {
                break;
            }
            let moved_before = tracker.keys_migrated;

            for key in keys {
                batch.push(key);
                if batch.len() == batch_size {
                    Self::flush(&migrator, tracker, &mut batch).await;
                }
            }
            if !batch.is_empty() {
                Self::flush(&migrator, tracker, &mut batch).await;
            }

            if tracker.failed_batches > 0 {
                warn!(
                    slot = tracker.slot,
                    failed_batches = tracker.failed_batches,
                    "Stopping key drain after failed batches"
                );
                break;
            }

            if tracker.keys_migrated > moved_before {
                stalled_rounds = 0;
                continue;
            }
            stalled_rounds += 1;
            warn!(slot = tracker.slot, stalled_rounds, "Fetch round moved no keys");
            if stalled_rounds >= MAX_STALLED_ROUNDS {
                error!(
                    slot = tracker.slot,
                    stalled_rounds,
                    "Slot still lists keys that MIGRATE reports as missing, giving up"
                );
                tracker.record_failed_batch();
                break;
            }
        }
    }

    async fn flush(
        migrator: &KeyBatchMigrator<'_, T>,
        tracker: &mut SlotMigrationTracker,
        batch: &mut Vec<Vec<u8>>,
    ) {
        match migrator.migrate(tracker.slot, batch.as_slice()).await {
            Ok(BatchOutcome::Moved) => tracker.record_keys_migrated(batch.len() as u64),
            Ok(BatchOutcome::AlreadyGone) => {}
            Err(e) => {
                error!(slot = tracker.slot, error = %e, "Key batch failed");
                tracker.record_failed_batch();
            }
        }
        batch.clear();
    }

    /// Hand the slot back to the source on both nodes, retrying forever.
    async fn rollback(&self, tracker: &mut SlotMigrationTracker) -> ReshardError {
        tracker.advance(MigrationPhase::RollingBack);
        let slot = tracker.slot;

        loop {
            tracker.rollback_attempts += 1;
            warn!(
                slot,
                attempt = tracker.rollback_attempts,
                source = %self.source.address(),
                "Reshard failed, reverting slot ownership to source"
            );

            let on_source = self
                .source
                .set_slot_state(slot, SlotOwnershipState::Node, &self.source_id)
                .await;
            let on_destination = self
                .destination
                .set_slot_state(slot, SlotOwnershipState::Node, &self.source_id)
                .await;

            match (on_source, on_destination) {
                (Ok(()), Ok(())) => break,
                (source_result, destination_result) => {
                    error!(
                        slot,
                        attempt = tracker.rollback_attempts,
                        source_ok = source_result.is_ok(),
                        destination_ok = destination_result.is_ok(),
                        delay = ?self.config.rollback_retry_delay,
                        "Rollback incomplete, retrying"
                    );
                    tokio::time::sleep(self.config.rollback_retry_delay).await;
                }
            }
        }

        tracker.advance(MigrationPhase::Aborted);
        error!(
            slot,
            failed_batches = tracker.failed_batches,
            source = %self.source.address(),
            "Slot ownership restored to source"
        );
        ReshardError::PartialMigration {
            slot,
            source_address: self.source.address().clone(),
            failed_batches: tracker.failed_batches,
        }
    }
}
