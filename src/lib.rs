//! valkey-reshard library crate
//!
//! Moves hash slots from one Valkey/Redis cluster master to another while the
//! cluster keeps serving traffic, using the CLUSTER SETSLOT / MIGRATE protocol.
//!
//! The engine is generic over [`client::Transport`]; [`client::ValkeyClient`]
//! is the production transport.

pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod slots;

pub use client::{NodeAddress, NodeClient, SlotRange, Transport, ValkeyClient, ValkeyClientConfig};
pub use config::ReshardConfig;
pub use error::{ReshardError, Result};
pub use logging::{LogConfig, LoggingError};
pub use slots::{ReshardReport, Resharder, SlotSelection, resolve_slots};
