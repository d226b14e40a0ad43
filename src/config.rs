//! Tuning knobs for the reshard engine.

use std::time::Duration;

use crate::error::{ReshardError, Result};

/// Default number of slots migrated in parallel.
pub const DEFAULT_MAX_CONCURRENT: usize = 5;
/// Default number of keys fetched per CLUSTER GETKEYSINSLOT.
pub const DEFAULT_KEYS_PER_FETCH: usize = 1000;
/// Default number of keys moved per MIGRATE call.
pub const DEFAULT_BATCH_SIZE: usize = 5;
/// Default number of MIGRATE attempts per batch.
pub const DEFAULT_MAX_MIGRATE_ATTEMPTS: u32 = 3;

/// Configuration for a reshard run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReshardConfig {
    /// Maximum number of slots migrated at the same time.
    pub max_concurrent: usize,
    /// Keys requested per CLUSTER GETKEYSINSLOT.
    pub keys_per_fetch: usize,
    /// Keys moved per MIGRATE call.
    pub batch_size: usize,
    /// MIGRATE attempts per batch before giving up.
    pub max_migrate_attempts: u32,
    /// Timeout passed to MIGRATE.
    pub migrate_timeout: Duration,
    /// Backoff unit; attempt `n` waits `n` units before the next attempt.
    pub retry_backoff: Duration,
    /// Delay between rollback attempts.
    pub rollback_retry_delay: Duration,
}

impl Default for ReshardConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            keys_per_fetch: DEFAULT_KEYS_PER_FETCH,
            batch_size: DEFAULT_BATCH_SIZE,
            max_migrate_attempts: DEFAULT_MAX_MIGRATE_ATTEMPTS,
            migrate_timeout: Duration::from_secs(5),
            retry_backoff: Duration::from_secs(1),
            rollback_retry_delay: Duration::from_secs(2),
        }
    }
}

impl ReshardConfig {
    /// Set the number of slots migrated in parallel.
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    /// Set the number of keys requested per fetch.
    pub fn with_keys_per_fetch(mut self, keys_per_fetch: usize) -> Self {
        self.keys_per_fetch = keys_per_fetch;
        self
    }

    /// Set the number of keys per MIGRATE call.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the number of MIGRATE attempts per batch.
    pub fn with_max_migrate_attempts(mut self, attempts: u32) -> Self {
        self.max_migrate_attempts = attempts;
        self
    }

    /// Set the MIGRATE timeout.
    pub fn with_migrate_timeout(mut self, timeout: Duration) -> Self {
        self.migrate_timeout = timeout;
        self
    }

    /// Set the retry backoff unit.
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Set the delay between rollback attempts.
    pub fn with_rollback_retry_delay(mut self, delay: Duration) -> Self {
        self.rollback_retry_delay = delay;
        self
    }

    /// Backoff to wait after the given failed attempt (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.retry_backoff.saturating_mul(attempt)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent == 0 {
            return Err(ReshardError::InvalidConfig(
                "max concurrency must be at least 1".to_string(),
            ));
        }
        if self.keys_per_fetch == 0 {
            return Err(ReshardError::InvalidConfig(
                "keys per fetch must be at least 1".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(ReshardError::InvalidConfig(
                "batch size must be at least 1".to_string(),
            ));
        }
        if self.max_migrate_attempts == 0 {
            return Err(ReshardError::InvalidConfig(
                "MIGRATE attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
