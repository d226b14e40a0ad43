//! Slot resharding.
//!
//! ## Module Structure
//!
//! - [`resolver`]: Turns a slot spec or a slot count into ranges
//! - [`batch`]: Moves one batch of keys with bounded retries
//! - [`migration`]: State machine for the single-slot migration protocol
//! - [`scheduler`]: Runs many slot migrations under a concurrency bound

pub mod batch;
pub mod migration;
pub mod resolver;
pub mod scheduler;

pub use batch::{BatchOutcome, KeyBatchMigrator};
pub use migration::{MigrationPhase, SlotMigrationTracker, SlotMigrator};
pub use resolver::{SlotSelection, limit_to, parse_slot_spec, resolve_slots};
pub use scheduler::{AdmissionGauge, AdmissionGuard, ReshardReport, Resharder, SlotFailure};
