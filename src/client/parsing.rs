//! Reply decoding for the commands used during resharding.
//!
//! Transports hand back a [`Reply`], a small tagged union over the RESP
//! reply shapes. Every command has its own decode function that checks the
//! shape it expects and returns a [`ParseError`] instead of guessing.
//!
//! All decode functions are pure, so they are tested with literal replies.

use super::types::{
    ClusterTopologySnapshot, NodeAddress, NodeRole, ParseError, SlotRange, TopologyEntry,
};

/// A reply from a Valkey node.
///
/// Simple strings and UTF-8 bulk strings are carried as [`Reply::Text`];
/// bulk strings that are not valid UTF-8 keep their bytes in
/// [`Reply::Bulk`]. Error replies never appear here; transports surface
/// them as errors.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Null reply.
    Nil,
    /// Simple or bulk string.
    Text(String),
    /// Bulk string that is not valid UTF-8.
    Bulk(Vec<u8>),
    /// Integer reply.
    Integer(i64),
    /// Array reply.
    Array(Vec<Reply>),
}

impl Reply {
    /// Build a text reply.
    pub fn text(s: impl Into<String>) -> Self {
        Reply::Text(s.into())
    }

    /// Borrow the text of a string reply.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Reply::Text(s) => Some(s),
            Reply::Bulk(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    /// Short description of the reply shape, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Reply::Nil => "nil",
            Reply::Text(_) => "string",
            Reply::Bulk(_) => "bulk string",
            Reply::Integer(_) => "integer",
            Reply::Array(_) => "array",
        }
    }

    fn describe(&self) -> String {
        match self {
            Reply::Text(s) => format!("\"{}\"", s),
            Reply::Bulk(b) => format!("\"{}\"", String::from_utf8_lossy(b)),
            Reply::Integer(i) => i.to_string(),
            Reply::Array(items) => format!("array of {}", items.len()),
            Reply::Nil => "nil".to_string(),
        }
    }
}

/// Outcome of a single `MIGRATE` call that did not fail with an error reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrateReply {
    /// All keys were transferred.
    Ok,
    /// None of the keys exist on the source anymore.
    NoKey,
    /// Any other reply.
    Unexpected(String),
}

fn unexpected(command: &'static str, expected: &'static str, reply: &Reply) -> ParseError {
    ParseError::UnexpectedReply {
        command,
        expected,
        actual: reply.describe(),
    }
}

/// Decode a status reply that must be `OK`.
pub fn decode_ok(command: &'static str, reply: &Reply) -> Result<(), ParseError> {
    match reply {
        Reply::Text(s) if s.eq_ignore_ascii_case("OK") => Ok(()),
        other => Err(unexpected(command, "OK", other)),
    }
}

/// Decode the reply of `CLUSTER MYID`.
pub fn decode_node_id(reply: &Reply) -> Result<String, ParseError> {
    match reply {
        Reply::Text(id) if !id.trim().is_empty() => Ok(id.trim().to_string()),
        other => Err(unexpected("CLUSTER MYID", "node id", other)),
    }
}

/// Decode the role from a `ROLE` reply (first array element).
pub fn decode_role(reply: &Reply) -> Result<NodeRole, ParseError> {
    match reply {
        Reply::Array(items) => match items.first() {
            Some(Reply::Text(role)) => role.parse(),
            Some(other) => Err(unexpected("ROLE", "role name", other)),
            None => Err(ParseError::MissingField("role".to_string())),
        },
        other => Err(unexpected("ROLE", "array", other)),
    }
}

/// Decode the key names of a `CLUSTER GETKEYSINSLOT` reply.
///
/// Key names are binary safe, so they are returned as raw bytes.
pub fn decode_keys(reply: &Reply) -> Result<Vec<Vec<u8>>, ParseError> {
    let Reply::Array(items) = reply else {
        return Err(unexpected("CLUSTER GETKEYSINSLOT", "array", reply));
    };

    items
        .iter()
        .map(|item| match item {
            Reply::Text(key) => Ok(key.clone().into_bytes()),
            Reply::Bulk(key) => Ok(key.clone()),
            Reply::Integer(i) => Ok(i.to_string().into_bytes()),
            other => Err(unexpected("CLUSTER GETKEYSINSLOT", "key name", other)),
        })
        .collect()
}

/// Decode the reply of `MIGRATE`.
pub fn decode_migrate(reply: &Reply) -> MigrateReply {
    match reply.as_text().map(str::trim) {
        Some(s) if s.eq_ignore_ascii_case("OK") => MigrateReply::Ok,
        Some(s) if s.eq_ignore_ascii_case("NOKEY") => MigrateReply::NoKey,
        _ => MigrateReply::Unexpected(reply.describe()),
    }
}

fn decode_slot(value: Option<&Reply>, field: &str) -> Result<u16, ParseError> {
    match value {
        Some(Reply::Integer(i)) => u16::try_from(*i)
            .map_err(|_| ParseError::InvalidSlotRange(format!("{} slot {} out of range", field, i))),
        Some(Reply::Text(s)) => s
            .parse()
            .map_err(|_| ParseError::InvalidSlotRange(format!("{} slot {}", field, s))),
        Some(other) => Err(unexpected("CLUSTER SLOTS", "slot number", other)),
        None => Err(ParseError::MissingField(format!("{} slot", field))),
    }
}

/// Decode a `[host, port, id?, ...]` node description.
fn decode_node_info(reply: &Reply) -> Result<(NodeAddress, Option<String>), ParseError> {
    let Reply::Array(fields) = reply else {
        return Err(unexpected("CLUSTER SLOTS", "node array", reply));
    };

    let host = match fields.first() {
        Some(Reply::Text(host)) => host.clone(),
        Some(other) => return Err(unexpected("CLUSTER SLOTS", "host", other)),
        None => return Err(ParseError::MissingField("node host".to_string())),
    };
    let port = match fields.get(1) {
        Some(Reply::Integer(p)) => u16::try_from(*p)
            .map_err(|_| ParseError::InvalidAddress(format!("{}:{}", host, p)))?,
        Some(Reply::Text(p)) => p
            .parse()
            .map_err(|_| ParseError::InvalidAddress(format!("{}:{}", host, p)))?,
        Some(other) => return Err(unexpected("CLUSTER SLOTS", "port", other)),
        None => return Err(ParseError::MissingField("node port".to_string())),
    };
    let id = fields.get(2).and_then(Reply::as_text).map(str::to_string);

    Ok((NodeAddress::new(host, port), id))
}

/// Decode the reply of `CLUSTER SLOTS`.
///
/// Each entry is `[start, end, [host, port, id, ...], [replica...]...]`.
pub fn decode_cluster_slots(reply: &Reply) -> Result<ClusterTopologySnapshot, ParseError> {
    let Reply::Array(items) = reply else {
        return Err(unexpected("CLUSTER SLOTS", "array", reply));
    };

    let mut entries = Vec::with_capacity(items.len());
    for item in items {
        let Reply::Array(fields) = item else {
            return Err(unexpected("CLUSTER SLOTS", "slot entry", item));
        };

        let start = decode_slot(fields.first(), "start")?;
        let end = decode_slot(fields.get(1), "end")?;
        let range = SlotRange::new(start, end)?;

        let (owner, owner_id) = match fields.get(2) {
            Some(node) => decode_node_info(node)?,
            None => return Err(ParseError::MissingField("slot owner".to_string())),
        };
        let replicas = fields
            .iter()
            .skip(3)
            .map(|node| decode_node_info(node).map(|(addr, _)| addr))
            .collect::<Result<Vec<_>, _>>()?;

        entries.push(TopologyEntry {
            range,
            owner,
            owner_id,
            replicas,
        });
    }

    Ok(ClusterTopologySnapshot { entries })
}
