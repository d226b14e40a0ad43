//! Error types for the reshard engine.
//!
//! Defines the crate error with classification for retry and exit behavior.

use thiserror::Error;

use crate::client::{NodeAddress, ParseError, SlotOwnershipState, ValkeyError};

/// Error type for reshard operations
#[derive(Error, Debug)]
pub enum ReshardError {
    /// Slot specification does not match `<slot>` or `<start>,<end>`
    #[error("Invalid slot specification '{spec}': {reason}")]
    InvalidSlotSpec { spec: String, reason: String },

    /// Invalid configuration or command-line input
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A participant is not a master
    #[error("Reshard failed, node {address} is not a master")]
    NotMaster { address: NodeAddress },

    /// A node could not be reached or answered with an unusable reply
    #[error("Node {address} error: {source}")]
    Node {
        address: NodeAddress,
        #[source]
        source: ValkeyError,
    },

    /// CLUSTER SETSLOT failed on one side of a migration
    #[error("Failed to set slot {slot} to {state} on {address}: {source}")]
    SlotTransition {
        slot: u16,
        state: SlotOwnershipState,
        address: NodeAddress,
        #[source]
        source: ValkeyError,
    },

    /// A key batch exhausted its MIGRATE attempts
    #[error("Failed to migrate {keys} keys of slot {slot} to {destination} after {attempts} attempts: {last_error}")]
    BatchExhausted {
        slot: u16,
        keys: usize,
        destination: NodeAddress,
        attempts: u32,
        last_error: String,
    },

    /// Key migration failed and the slot was rolled back to its source
    #[error("Slot {slot} rolled back to {source_address} after {failed_batches} failed key batches")]
    PartialMigration {
        slot: u16,
        source_address: NodeAddress,
        failed_batches: usize,
    },

    /// A slot migration task ended without an outcome
    #[error("Slot migration task failed: {0}")]
    Task(String),
}

impl ReshardError {
    /// Precondition failures: nothing was changed on the cluster.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            ReshardError::InvalidSlotSpec { .. }
                | ReshardError::InvalidConfig(_)
                | ReshardError::NotMaster { .. }
        )
    }

    /// Check if this error must stop all further resharding
    pub fn is_fatal(&self) -> bool {
        self.is_invariant_violation() || matches!(self, ReshardError::PartialMigration { .. })
    }

    /// Check if this error should be retried
    pub fn is_retryable(&self) -> bool {
        match self {
            ReshardError::BatchExhausted { .. } => false,
            ReshardError::Node { source, .. } | ReshardError::SlotTransition { source, .. } => {
                !matches!(source, ValkeyError::Parse(_) | ValkeyError::InvalidConfig(_))
            }
            _ => false,
        }
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> u8 {
        match self {
            ReshardError::InvalidSlotSpec { .. }
            | ReshardError::InvalidConfig(_)
            | ReshardError::NotMaster { .. } => 2,
            _ => 1,
        }
    }
}

impl From<ParseError> for ReshardError {
    fn from(e: ParseError) -> Self {
        ReshardError::InvalidConfig(e.to_string())
    }
}

/// Result type alias for reshard operations
pub type Result<T> = std::result::Result<T, ReshardError>;
