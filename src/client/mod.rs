//! Valkey client module for the reshard engine.
//!
//! This module provides a typed handle to one cluster node and the
//! transport it runs on.
//!
//! ## Architecture
//!
//! - `transport`: the [`Transport`] trait and [`Command`] type
//! - `valkey_client`: production transport over the `fred` client
//! - `parsing`: [`Reply`] tagged union and per-command decoding
//! - `types`: slot ranges, node addresses, ownership states, topology
//! - `node_client`: [`NodeClient`], the typed per-node operations
//!
//! ## Example
//!
//! ```rust,ignore
//! use valkey_reshard::client::{NodeAddress, NodeClient, ValkeyClient, ValkeyClientConfig};
//!
//! let config = ValkeyClientConfig::new(NodeAddress::parse("10.0.0.1")?).with_password("pw");
//! let node = NodeClient::new(ValkeyClient::connect(config).await?);
//! if node.is_master().await {
//!     println!("{} is {}", node.address(), node.identity().await?);
//! }
//! ```

pub mod node_client;
pub mod parsing;
pub mod transport;
pub mod types;
pub mod valkey_client;

pub use node_client::NodeClient;
pub use parsing::{MigrateReply, Reply};
pub use transport::{Command, Transport};
pub use types::{
    ClusterTopologySnapshot, DEFAULT_PORT, NodeAddress, NodeRole, ParseError, SlotOwnershipState,
    SlotRange, TOTAL_SLOTS, TopologyEntry,
};
pub use valkey_client::{ValkeyClient, ValkeyClientConfig, ValkeyError};
