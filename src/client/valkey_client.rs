//! Valkey client wrapper using the fred crate.
//!
//! Provides a single-node client used as the production [`Transport`]:
//! every reshard command is sent as a custom command and the fred reply is
//! converted into a [`Reply`].

use std::time::Duration;

use fred::bytes::Bytes;
use fred::prelude::*;
use fred::types::{ClusterHash, CustomCommand, Value};
use thiserror::Error;
use tracing::{debug, instrument};

use super::parsing::Reply;
use super::transport::{Command, Transport};
use super::types::{NodeAddress, ParseError};

/// Failure talking to a single node.
#[derive(Error, Debug)]
pub enum ValkeyError {
    /// Node unreachable or connection dropped
    #[error("Connection error: {0}")]
    Connection(String),

    /// Error raised by fred, including server error replies
    #[error("Client error: {0}")]
    Redis(#[from] fred::error::Error),

    /// Error reply from the server
    #[error("Server replied with error: {0}")]
    Server(String),

    /// Reply had an unexpected shape
    #[error("Unparseable reply: {0}")]
    Parse(#[from] ParseError),

    #[error("{operation} timed out after {duration:?}")]
    Timeout {
        operation: String,
        duration: Duration,
    },

    #[error("Invalid client configuration: {0}")]
    InvalidConfig(String),
}

impl ValkeyError {
    /// Text of the error reply sent by the server, if this is one.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            ValkeyError::Server(msg) => Some(msg),
            ValkeyError::Redis(e) => Some(e.details()),
            _ => None,
        }
    }

    /// Check if the server rejected a `MIGRATE` because the target key exists.
    pub fn is_busy_key(&self) -> bool {
        self.server_message()
            .is_some_and(|msg| msg.trim_start().starts_with("BUSYKEY"))
    }
}

/// Configuration for connecting to a single Valkey node.
#[derive(Clone, Debug)]
pub struct ValkeyClientConfig {
    /// Node to connect to.
    pub address: NodeAddress,
    /// How long to wait for the initial connection.
    pub connection_timeout: Duration,
    /// Per-command timeout; MIGRATE carries its own timeout on top.
    pub command_timeout: Duration,
    /// Password for AUTH, also forwarded to MIGRATE.
    pub password: Option<String>,
}

impl ValkeyClientConfig {
    /// Create a new configuration for a node.
    pub fn new(address: NodeAddress) -> Self {
        Self {
            address,
            connection_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(30),
            password: None,
        }
    }

    /// Authenticate with `password`.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set connection timeout.
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set command timeout.
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }
}

/// Valkey client bound to one node.
pub struct ValkeyClient {
    client: Client,
    config: ValkeyClientConfig,
}

impl ValkeyClient {
    /// Create and connect a client for a single node (not clustered).
    ///
    /// Cluster redirections are not followed: every command must run on
    /// exactly the node it is addressed to.
    #[instrument(skip(config), fields(address = %config.address))]
    pub async fn connect(config: ValkeyClientConfig) -> Result<Self, ValkeyError> {
        if config.address.host.is_empty() {
            return Err(ValkeyError::InvalidConfig("No host provided".to_string()));
        }

        let client = Builder::from_config(Config {
            server: ServerConfig::Centralized {
                server: Server::new(config.address.host.clone(), config.address.port),
            },
            password: config.password.clone(),
            ..Default::default()
        })
        .with_performance_config(|perf| perf.default_command_timeout = config.command_timeout)
        .with_connection_config(|conn| conn.connection_timeout = config.connection_timeout)
        .build()?;

        debug!("Connecting to node");
        tokio::time::timeout(config.connection_timeout, client.init())
            .await
            .map_err(|_| ValkeyError::Timeout {
                operation: format!("connect to {}", config.address),
                duration: config.connection_timeout,
            })??;

        Ok(Self { client, config })
    }

    /// Connection settings this client was built with.
    pub fn config(&self) -> &ValkeyClientConfig {
        &self.config
    }

    /// Check if the client is connected.
    pub fn is_connected(&self) -> bool {
        self.client.is_connected()
    }

    /// Close the connection.
    pub async fn close(&self) -> Result<(), ValkeyError> {
        self.client.quit().await?;
        Ok(())
    }
}

impl Transport for ValkeyClient {
    #[instrument(skip(self), fields(address = %self.config.address, command = %command))]
    async fn execute(&self, command: Command) -> Result<Reply, ValkeyError> {
        let (name, args) = command.into_parts();
        let custom = CustomCommand::new_static(name, ClusterHash::FirstKey, false);
        let args: Vec<Value> = args
            .into_iter()
            .map(|arg| Value::Bytes(Bytes::from(arg)))
            .collect();
        let value: Value = self.client.custom(custom, args).await?;
        Ok(reply_from_value(value))
    }

    fn address(&self) -> &NodeAddress {
        &self.config.address
    }

    fn password(&self) -> Option<&str> {
        self.config.password.as_deref()
    }
}

/// Convert a fred value into a [`Reply`].
///
/// Binary bulk strings keep their exact bytes.
fn reply_from_value(value: Value) -> Reply {
    match value {
        Value::Null => Reply::Nil,
        Value::Integer(i) => Reply::Integer(i),
        Value::Boolean(b) => Reply::Integer(i64::from(b)),
        Value::Double(d) => Reply::Text(d.to_string()),
        Value::String(s) => Reply::Text(s.to_string()),
        Value::Bytes(b) => match String::from_utf8(b.to_vec()) {
            Ok(s) => Reply::Text(s),
            Err(e) => Reply::Bulk(e.into_bytes()),
        },
        Value::Array(values) => Reply::Array(values.into_iter().map(reply_from_value).collect()),
        other => Reply::Text(format!("{:?}", other)),
    }
}
