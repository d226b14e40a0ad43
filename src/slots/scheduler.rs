//! Reshard scheduler: migrates every slot of a range.
//!
//! A single-slot range runs inline. Larger ranges get one task per slot,
//! admitted through a semaphore so at most `max_concurrent` slots are in
//! flight. A fatal slot failure closes the semaphore: slots not yet admitted
//! are skipped, slots already running finish on their own.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::client::{NodeClient, SlotRange, Transport};
use crate::config::ReshardConfig;
use crate::error::{ReshardError, Result};

use super::migration::{SlotMigrationTracker, SlotMigrator};

/// Counts slot migrations currently admitted and the highest count seen.
#[derive(Debug, Default)]
pub struct AdmissionGauge {
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl AdmissionGauge {
    /// Register an admitted migration until the guard is dropped.
    pub fn enter(self: &Arc<Self>) -> AdmissionGuard {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        AdmissionGuard {
            gauge: Arc::clone(self),
        }
    }

    /// Migrations currently admitted.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Highest number of migrations admitted at once.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Releases an admission on drop.
#[derive(Debug)]
pub struct AdmissionGuard {
    gauge: Arc<AdmissionGauge>,
}

impl Drop for AdmissionGuard {
    fn drop(&mut self) {
        self.gauge.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A slot whose migration returned an error.
#[derive(Debug)]
pub struct SlotFailure {
    /// The slot.
    pub slot: u16,
    /// Why it failed.
    pub error: ReshardError,
}

/// Result of resharding one or more ranges.
#[derive(Debug, Default)]
pub struct ReshardReport {
    /// Finalized migrations, ordered by slot.
    pub migrated: Vec<SlotMigrationTracker>,
    /// Slots whose migration failed without halting the run.
    pub failed: Vec<SlotFailure>,
    /// Slots never started because the run was halted.
    pub skipped: Vec<u16>,
    /// Highest number of slots migrated at once.
    pub peak_concurrency: usize,
}

impl ReshardReport {
    /// Total keys moved across all finalized slots.
    pub fn keys_migrated(&self) -> u64 {
        self.migrated.iter().map(|t| t.keys_migrated).sum()
    }

    /// Slots that ended finalized.
    pub fn migrated_slots(&self) -> Vec<u16> {
        self.migrated.iter().map(|t| t.slot).collect()
    }

    /// Check if every slot was migrated.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }

    /// Fold another report into this one.
    pub fn merge(&mut self, other: ReshardReport) {
        self.migrated.extend(other.migrated);
        self.failed.extend(other.failed);
        self.skipped.extend(other.skipped);
        self.peak_concurrency = self.peak_concurrency.max(other.peak_concurrency);
    }
}

/// Moves slot ranges from a source master to a destination master.
pub struct Resharder<T> {
    source: Arc<NodeClient<T>>,
    destination: Arc<NodeClient<T>>,
    config: ReshardConfig,
}

impl<T: Transport + 'static> Resharder<T> {
    /// Create a resharder for two connected nodes.
    pub fn new(source: NodeClient<T>, destination: NodeClient<T>, config: ReshardConfig) -> Self {
        Self {
            source: Arc::new(source),
            destination: Arc::new(destination),
            config,
        }
    }

    /// Source node.
    pub fn source(&self) -> &NodeClient<T> {
        &self.source
    }

    /// Destination node.
    pub fn destination(&self) -> &NodeClient<T> {
        &self.destination
    }

    /// Migrate every slot of `range` from the source to the destination.
    ///
    /// Both nodes must be masters; otherwise nothing is changed. A single
    /// slot returns its own error directly. For larger ranges, non-fatal
    /// slot errors are collected in the report and a fatal one is returned
    /// once all admitted slots have finished.
    pub async fn reshard(&self, range: SlotRange) -> Result<ReshardReport> {
        self.config.validate()?;
        self.ensure_masters().await?;
        let migrator = Arc::new(self.slot_migrator().await?);

        if range.is_single() {
            let tracker = migrator.migrate(range.start()).await?;
            return Ok(ReshardReport {
                migrated: vec![tracker],
                peak_concurrency: 1,
                ..Default::default()
            });
        }

        self.migrate_range(migrator, range).await
    }

    async fn ensure_masters(&self) -> Result<()> {
        for node in [&self.source, &self.destination] {
            if !node.is_master().await {
                error!(node = %node.address(), "Reshard requires both nodes to be masters");
                return Err(ReshardError::NotMaster {
                    address: node.address().clone(),
                });
            }
        }
        Ok(())
    }

    async fn slot_migrator(&self) -> Result<SlotMigrator<T>> {
        let source_id = identity(&self.source).await?;
        let destination_id = identity(&self.destination).await?;
        info!(
            source = %self.source.address(),
            source_id = %source_id,
            destination = %self.destination.address(),
            destination_id = %destination_id,
            "Resolved node identities"
        );

        Ok(SlotMigrator::new(
            Arc::clone(&self.source),
            Arc::clone(&self.destination),
            source_id,
            destination_id,
            self.config.clone(),
        ))
    }

    async fn migrate_range(
        &self,
        migrator: Arc<SlotMigrator<T>>,
        range: SlotRange,
    ) -> Result<ReshardReport> {
        let gate = Arc::new(Semaphore::new(self.config.max_concurrent));
        let gauge = Arc::new(AdmissionGauge::default());
        let mut tasks = JoinSet::new();
        let mut unfinished: BTreeSet<u16> = range.slots().collect();

        for slot in range.slots() {
            let gate = Arc::clone(&gate);
            let gauge = Arc::clone(&gauge);
            let migrator = Arc::clone(&migrator);

            tasks.spawn(async move {
                // A closed gate means another slot failed fatally.
                let Ok(_permit) = Arc::clone(&gate).acquire_owned().await else {
                    return (slot, None);
                };
                let _admitted = gauge.enter();

                info!(slot, "Performing reshard of slot");
                let result = migrator.migrate(slot).await;
                if let Err(ref e) = result
                    && e.is_fatal()
                {
                    gate.close();
                }
                (slot, Some(result))
            });
        }

        let mut report = ReshardReport::default();
        let mut fatal: Option<ReshardError> = None;

        while let Some(joined) = tasks.join_next().await {
            let (slot, outcome) = match joined {
                Ok(joined) => joined,
                Err(e) => {
                    error!(error = %e, "Slot migration task panicked");
                    continue;
                }
            };
            unfinished.remove(&slot);

            match outcome {
                None => report.skipped.push(slot),
                Some(Ok(tracker)) => report.migrated.push(tracker),
                Some(Err(e)) if e.is_fatal() && fatal.is_none() => fatal = Some(e),
                Some(Err(e)) => {
                    error!(slot, error = %e, "Slot migration failed");
                    report.failed.push(SlotFailure { slot, error: e });
                }
            }
        }

        // Slots whose task panicked never reported back.
        for slot in unfinished {
            report.failed.push(SlotFailure {
                slot,
                error: ReshardError::Task(format!("migration task for slot {} panicked", slot)),
            });
        }

        report.migrated.sort_by_key(|t| t.slot);
        report.failed.sort_by_key(|f| f.slot);
        report.skipped.sort_unstable();
        report.peak_concurrency = gauge.peak();

        info!(
            range = %range,
            migrated = report.migrated.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            keys = report.keys_migrated(),
            peak_concurrency = report.peak_concurrency,
            "Range reshard finished"
        );

        if let Some(e) = fatal {
            warn!(
                range = %range,
                skipped = report.skipped.len(),
                "Halting reshard after fatal slot failure"
            );
            return Err(e);
        }
        Ok(report)
    }
}

async fn identity<T: Transport>(node: &NodeClient<T>) -> Result<String> {
    node.identity().await.map_err(|e| ReshardError::Node {
        address: node.address().clone(),
        source: e,
    })
}
