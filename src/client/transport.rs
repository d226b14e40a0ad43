//! Transport seam between the reshard engine and the wire.
//!
//! The engine only needs to send a command to one node and get a [`Reply`]
//! back. [`ValkeyClient`](super::ValkeyClient) implements this over `fred`;
//! tests implement it over an in-memory cluster.

use std::future::Future;

use super::parsing::Reply;
use super::types::NodeAddress;
use super::valkey_client::ValkeyError;

/// A command name plus its arguments.
///
/// Arguments are raw bytes so key names that are not UTF-8 reach the
/// server unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    name: &'static str,
    args: Vec<Vec<u8>>,
}

impl Command {
    /// Create a command without arguments.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            args: Vec::new(),
        }
    }

    /// Append an argument.
    pub fn arg(mut self, arg: impl ToString) -> Self {
        self.args.push(arg.to_string().into_bytes());
        self
    }

    /// Append several arguments.
    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: ToString,
    {
        self.args.extend(args.into_iter().map(|a| a.to_string().into_bytes()));
        self
    }

    /// Append key names as given.
    pub fn keys<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: AsRef<[u8]>,
    {
        self.args.extend(keys.into_iter().map(|k| k.as_ref().to_vec()));
        self
    }

    /// Command name, e.g. `CLUSTER`.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Command arguments.
    pub fn arguments(&self) -> &[Vec<u8>] {
        &self.args
    }

    /// Split into name and arguments.
    pub fn into_parts(self) -> (&'static str, Vec<Vec<u8>>) {
        (self.name, self.args)
    }
}

/// Renders the command for logs with the `AUTH` password masked.
impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name)?;
        let mut mask_next = false;
        for arg in &self.args {
            if mask_next {
                f.write_str(" ******")?;
                mask_next = false;
                continue;
            }
            mask_next = arg.eq_ignore_ascii_case(b"AUTH");
            write!(f, " {}", String::from_utf8_lossy(arg))?;
        }
        Ok(())
    }
}

/// Executes commands against a single node.
pub trait Transport: Send + Sync {
    /// Send one command and wait for its reply.
    ///
    /// Error replies from the server come back as `Err`.
    fn execute(
        &self,
        command: Command,
    ) -> impl Future<Output = Result<Reply, ValkeyError>> + Send;

    /// Address this transport is connected to.
    fn address(&self) -> &NodeAddress;

    /// Password used to authenticate, reused for `MIGRATE ... AUTH`.
    fn password(&self) -> Option<&str>;
}
