//! Typed operations on a single cluster node.
//!
//! [`NodeClient`] wraps a [`Transport`] and exposes exactly the commands the
//! reshard engine needs, each with its own reply decoding.

use std::time::Duration;

use tracing::{debug, error, instrument, warn};

use super::parsing::{
    MigrateReply, decode_cluster_slots, decode_keys, decode_migrate, decode_node_id, decode_ok,
    decode_role,
};
use super::transport::{Command, Transport};
use super::types::{ClusterTopologySnapshot, NodeAddress, NodeRole, SlotOwnershipState};
use super::valkey_client::ValkeyError;

/// Handle to one cluster node.
pub struct NodeClient<T> {
    transport: T,
}

impl<T: Transport> NodeClient<T> {
    /// Wrap a connected transport.
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Get the underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Address of the node. No I/O.
    pub fn address(&self) -> &NodeAddress {
        self.transport.address()
    }

    /// Execute CLUSTER MYID to get this node's ID.
    #[instrument(skip(self), fields(node = %self.address()))]
    pub async fn identity(&self) -> Result<String, ValkeyError> {
        let reply = self
            .transport
            .execute(Command::new("CLUSTER").arg("MYID"))
            .await
            .inspect_err(|e| error!(error = %e, "Failed to get CLUSTER MYID"))?;
        Ok(decode_node_id(&reply)?)
    }

    /// Check the node's role with ROLE.
    ///
    /// Any error or unparseable reply counts as "not a master".
    #[instrument(skip(self), fields(node = %self.address()))]
    pub async fn is_master(&self) -> bool {
        let reply = match self.transport.execute(Command::new("ROLE")).await {
            Ok(reply) => reply,
            Err(e) => {
                error!(error = %e, "Failed to get ROLE");
                return false;
            }
        };

        match decode_role(&reply) {
            Ok(role) => role == NodeRole::Master,
            Err(e) => {
                error!(error = %e, "Failed to parse ROLE reply");
                false
            }
        }
    }

    /// Execute CLUSTER SLOTS and keep the ranges served from this node's host.
    #[instrument(skip(self), fields(node = %self.address()))]
    pub async fn topology_snapshot(&self) -> Result<ClusterTopologySnapshot, ValkeyError> {
        let reply = self
            .transport
            .execute(Command::new("CLUSTER").arg("SLOTS"))
            .await
            .inspect_err(|e| error!(error = %e, "Failed to get CLUSTER SLOTS"))?;
        let snapshot = decode_cluster_slots(&reply)
            .inspect_err(|e| error!(error = %e, "Failed to parse CLUSTER SLOTS reply"))?;

        let owned = snapshot.owned_by_host(&self.address().host);
        debug!(
            ranges = owned.entries.len(),
            slots = owned.total_slots(),
            "Resolved owned slot ranges"
        );
        Ok(owned)
    }

    /// Execute CLUSTER SETSLOT <slot> <state> <node-id>.
    ///
    /// `node_id` is the other side of the migration for IMPORTING and
    /// MIGRATING, and the new owner for NODE.
    #[instrument(skip(self), fields(node = %self.address()))]
    pub async fn set_slot_state(
        &self,
        slot: u16,
        state: SlotOwnershipState,
        node_id: &str,
    ) -> Result<(), ValkeyError> {
        let command = Command::new("CLUSTER")
            .arg("SETSLOT")
            .arg(slot)
            .arg(state.as_str())
            .arg(node_id);

        let reply = self.transport.execute(command).await.inspect_err(|e| {
            error!(slot, state = %state, node_id, error = %e, "CLUSTER SETSLOT failed");
        })?;
        decode_ok("CLUSTER SETSLOT", &reply).inspect_err(|e| {
            error!(slot, state = %state, node_id, error = %e, "Unexpected CLUSTER SETSLOT reply");
        })?;
        Ok(())
    }

    /// Execute CLUSTER GETKEYSINSLOT.
    ///
    /// Key names come back as raw bytes. Failures are logged and reported
    /// as an empty slot.
    #[instrument(skip(self), fields(node = %self.address()))]
    pub async fn keys_in_slot(&self, slot: u16, limit: usize) -> Vec<Vec<u8>> {
        let command = Command::new("CLUSTER")
            .arg("GETKEYSINSLOT")
            .arg(slot)
            .arg(limit);

        let reply = match self.transport.execute(command).await {
            Ok(reply) => reply,
            Err(e) => {
                error!(slot, limit, error = %e, "CLUSTER GETKEYSINSLOT failed");
                return Vec::new();
            }
        };

        decode_keys(&reply).unwrap_or_else(|e| {
            error!(slot, limit, error = %e, "Unexpected CLUSTER GETKEYSINSLOT reply");
            Vec::new()
        })
    }

    /// Execute MIGRATE to move keys to another node.
    ///
    /// Sends `MIGRATE host port "" 0 <timeout-ms> REPLACE [AUTH pw] KEYS k...`,
    /// reusing this node's password for the destination.
    #[instrument(skip(self, keys), fields(node = %self.address(), key_count = keys.len()))]
    pub async fn migrate_keys(
        &self,
        destination: &NodeAddress,
        keys: &[Vec<u8>],
        timeout: Duration,
    ) -> Result<MigrateReply, ValkeyError> {
        if keys.is_empty() {
            warn!("MIGRATE called without keys");
            return Ok(MigrateReply::NoKey);
        }

        let mut command = Command::new("MIGRATE")
            .arg(&destination.host)
            .arg(destination.port)
            .arg("")
            .arg(0)
            .arg(timeout.as_millis())
            .arg("REPLACE");
        if let Some(password) = self.transport.password() {
            command = command.arg("AUTH").arg(password);
        }
        let command = command.arg("KEYS").keys(keys);

        let reply = self.transport.execute(command).await?;
        Ok(decode_migrate(&reply))
    }
}
