//! Types for parsed Valkey cluster information.
//!
//! These types represent node addresses, slot ranges, per-slot ownership
//! states and the decoded output of `CLUSTER SLOTS`.

use std::str::FromStr;

use thiserror::Error;

/// Total number of hash slots in a Valkey cluster.
pub const TOTAL_SLOTS: u16 = 16384;

/// Port used when a node address omits one.
pub const DEFAULT_PORT: u16 = 6379;

/// Errors that can occur when parsing cluster data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unexpected reply to {command}: expected {expected}, got {actual}")]
    UnexpectedReply {
        command: &'static str,
        expected: &'static str,
        actual: String,
    },
    #[error("Invalid slot range: {0}")]
    InvalidSlotRange(String),
    #[error("Invalid node address: {0}")]
    InvalidAddress(String),
    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// Role of a node as reported by `ROLE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    /// Node is a master serving hash slots.
    Master,
    /// Node is a replica of a master.
    Replica,
    /// Node is a sentinel.
    Sentinel,
}

impl FromStr for NodeRole {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "master" => Ok(NodeRole::Master),
            "slave" | "replica" => Ok(NodeRole::Replica),
            "sentinel" => Ok(NodeRole::Sentinel),
            other => Err(ParseError::UnexpectedReply {
                command: "ROLE",
                expected: "master, slave or sentinel",
                actual: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for NodeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeRole::Master => write!(f, "master"),
            NodeRole::Replica => write!(f, "slave"),
            NodeRole::Sentinel => write!(f, "sentinel"),
        }
    }
}

/// Per-node state of a slot, as set by `CLUSTER SETSLOT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotOwnershipState {
    /// The destination node accepts keys for the slot.
    Importing,
    /// The source node hands keys of the slot over.
    Migrating,
    /// The slot is stably owned by the referenced node.
    Node,
}

impl SlotOwnershipState {
    /// Keyword used by `CLUSTER SETSLOT`.
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotOwnershipState::Importing => "IMPORTING",
            SlotOwnershipState::Migrating => "MIGRATING",
            SlotOwnershipState::Node => "NODE",
        }
    }
}

impl FromStr for SlotOwnershipState {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "IMPORTING" => Ok(SlotOwnershipState::Importing),
            "MIGRATING" => Ok(SlotOwnershipState::Migrating),
            "NODE" => Ok(SlotOwnershipState::Node),
            other => Err(ParseError::UnexpectedReply {
                command: "CLUSTER SETSLOT",
                expected: "IMPORTING, MIGRATING or NODE",
                actual: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for SlotOwnershipState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Network address of a cluster node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeAddress {
    /// Hostname or IP address.
    pub host: String,
    /// Client port.
    pub port: u16,
}

impl NodeAddress {
    /// Create a new address.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse `host` or `host:port`; the port defaults to 6379.
    pub fn parse(s: &str) -> Result<Self, ParseError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ParseError::InvalidAddress("empty address".to_string()));
        }

        match s.rsplit_once(':') {
            Some((host, port_str)) => {
                if host.is_empty() {
                    return Err(ParseError::InvalidAddress(format!("Missing host: {}", s)));
                }
                let port = port_str
                    .parse()
                    .map_err(|_| ParseError::InvalidAddress(format!("Invalid port: {}", s)))?;
                Ok(Self::new(host, port))
            }
            None => Ok(Self::new(s, DEFAULT_PORT)),
        }
    }
}

impl FromStr for NodeAddress {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A closed interval of hash slots, always `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotRange {
    start: u16,
    end: u16,
}

impl SlotRange {
    /// Create a new slot range, rejecting reversed or out-of-space bounds.
    pub fn new(start: u16, end: u16) -> Result<Self, ParseError> {
        if start > end {
            return Err(ParseError::InvalidSlotRange(format!(
                "start {} is greater than end {}",
                start, end
            )));
        }
        if end >= TOTAL_SLOTS {
            return Err(ParseError::InvalidSlotRange(format!(
                "slot {} is outside 0-{}",
                end,
                TOTAL_SLOTS - 1
            )));
        }
        Ok(Self { start, end })
    }

    /// Create a single-slot range.
    pub fn single(slot: u16) -> Result<Self, ParseError> {
        Self::new(slot, slot)
    }

    /// First slot of the range.
    pub fn start(&self) -> u16 {
        self.start
    }

    /// Last slot of the range (inclusive).
    pub fn end(&self) -> u16 {
        self.end
    }

    /// Get the number of slots in this range.
    pub fn count(&self) -> u32 {
        u32::from(self.end) - u32::from(self.start) + 1
    }

    /// Check if the range covers exactly one slot.
    pub fn is_single(&self) -> bool {
        self.start == self.end
    }

    /// Iterate over every slot in the range.
    pub fn slots(&self) -> impl Iterator<Item = u16> + use<> {
        self.start..=self.end
    }

    /// Truncate the range to its first `count` slots.
    ///
    /// Returns `None` when `count` is zero.
    pub fn take(&self, count: u32) -> Option<Self> {
        if count == 0 {
            return None;
        }
        if count >= self.count() {
            return Some(*self);
        }
        let end = u32::from(self.start) + count - 1;
        Some(Self {
            start: self.start,
            end: u16::try_from(end).ok()?,
        })
    }
}

impl std::fmt::Display for SlotRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// One entry of a `CLUSTER SLOTS` reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyEntry {
    /// Slots covered by this entry.
    pub range: SlotRange,
    /// Address of the master serving the range.
    pub owner: NodeAddress,
    /// Node ID of the master, when the server reports it.
    pub owner_id: Option<String>,
    /// Addresses of the replicas of the master.
    pub replicas: Vec<NodeAddress>,
}

/// Decoded `CLUSTER SLOTS` reply, in the order the server returned it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterTopologySnapshot {
    /// All entries of the reply.
    pub entries: Vec<TopologyEntry>,
}

impl ClusterTopologySnapshot {
    /// Keep only the entries whose owner runs on `host`.
    pub fn owned_by_host(&self, host: &str) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .filter(|e| e.owner.host == host)
                .cloned()
                .collect(),
        }
    }

    /// Slot ranges of all entries, in reply order.
    pub fn ranges(&self) -> Vec<SlotRange> {
        self.entries.iter().map(|e| e.range).collect()
    }

    /// Total number of slots covered by the snapshot.
    pub fn total_slots(&self) -> u32 {
        self.entries.iter().map(|e| e.range.count()).sum()
    }

    /// Check if the snapshot has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
