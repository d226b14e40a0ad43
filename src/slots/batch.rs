//! Moving a batch of keys with MIGRATE.
//!
//! A batch is retried a bounded number of times with a linear backoff.
//! `NOKEY` counts as success: the keys were already moved or expired.

use std::borrow::Cow;

use tracing::{debug, error, info, warn};

use crate::client::{MigrateReply, NodeAddress, NodeClient, Transport};
use crate::config::ReshardConfig;
use crate::error::{ReshardError, Result};

/// Successful result of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// MIGRATE replied OK.
    Moved,
    /// MIGRATE replied NOKEY; nothing left to move.
    AlreadyGone,
}

/// What to do after one MIGRATE attempt.
#[derive(Debug, PartialEq, Eq)]
enum Attempt {
    Done(BatchOutcome),
    Retry(String),
}

/// Migrates key batches from one source node to one destination.
pub struct KeyBatchMigrator<'a, T> {
    source: &'a NodeClient<T>,
    destination: &'a NodeAddress,
    config: &'a ReshardConfig,
    max_attempts: u32,
}

impl<'a, T: Transport> KeyBatchMigrator<'a, T> {
    /// Create a migrator using the retry policy of `config`.
    pub fn new(
        source: &'a NodeClient<T>,
        destination: &'a NodeAddress,
        config: &'a ReshardConfig,
    ) -> Self {
        Self {
            source,
            destination,
            config,
            max_attempts: config.max_migrate_attempts.max(1),
        }
    }

    /// Move `keys` (all from `slot`) to the destination.
    pub async fn migrate(&self, slot: u16, keys: &[Vec<u8>]) -> Result<BatchOutcome> {
        if keys.is_empty() {
            return Ok(BatchOutcome::AlreadyGone);
        }

        let mut last_error = String::new();
        for attempt in 1..=self.max_attempts {
            let result = self
                .source
                .migrate_keys(self.destination, keys, self.config.migrate_timeout)
                .await;

            match classify(result) {
                Attempt::Done(BatchOutcome::Moved) => {
                    info!(
                        slot,
                        keys = ?key_names(keys),
                        source = %self.source.address(),
                        destination = %self.destination,
                        "Migrated keys"
                    );
                    return Ok(BatchOutcome::Moved);
                }
                Attempt::Done(BatchOutcome::AlreadyGone) => {
                    warn!(slot, keys = ?key_names(keys), "Got NOKEY, ignoring the batch");
                    return Ok(BatchOutcome::AlreadyGone);
                }
                Attempt::Retry(reason) => {
                    error!(
                        slot,
                        keys = ?key_names(keys),
                        destination = %self.destination,
                        attempt,
                        max_attempts = self.max_attempts,
                        reason = %reason,
                        "Failed to MIGRATE keys"
                    );
                    last_error = reason;
                }
            }

            if attempt < self.max_attempts {
                let delay = self.config.backoff_for(attempt);
                debug!(slot, attempt, delay = ?delay, "Backing off before retrying MIGRATE");
                tokio::time::sleep(delay).await;
            }
        }

        Err(ReshardError::BatchExhausted {
            slot,
            keys: keys.len(),
            destination: self.destination.clone(),
            attempts: self.max_attempts,
            last_error,
        })
    }
}

/// Key names for logs; bytes that are not UTF-8 are replaced.
fn key_names(keys: &[Vec<u8>]) -> Vec<Cow<'_, str>> {
    keys.iter().map(|k| String::from_utf8_lossy(k)).collect()
}

/// Classify a MIGRATE result: OK and NOKEY finish, everything else retries.
fn classify(result: std::result::Result<MigrateReply, crate::client::ValkeyError>) -> Attempt {
    match result {
        Ok(MigrateReply::Ok) => Attempt::Done(BatchOutcome::Moved),
        Ok(MigrateReply::NoKey) => Attempt::Done(BatchOutcome::AlreadyGone),
        Ok(MigrateReply::Unexpected(reply)) => Attempt::Retry(format!("unexpected reply {}", reply)),
        Err(e) if e.is_busy_key() => Attempt::Retry(format!("BUSYKEY: {}", e)),
        Err(e) => Attempt::Retry(e.to_string()),
    }
}
