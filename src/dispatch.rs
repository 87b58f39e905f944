//! # Remote Command Dispatch
//!
//! Benchmark runs are started on worker hosts by a remote command service.
//! That service caps how many hosts one command may target, so host ids are
//! split into batches and one command is issued per batch.
//!
//! Only the collaborator seams live here: [`RemoteExecutor`] sends a command,
//! [`FleetController`] lists the hosts carrying a set of tags. Cloud-specific
//! implementations plug in behind these traits.

use std::fmt;
use std::num::NonZeroUsize;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid batch size: {0}")]
    InvalidBatchSize(String),

    #[error("command for batch {batch} ({hosts} hosts) failed: {reason}")]
    Command {
        batch: usize,
        hosts: usize,
        reason: String,
    },

    #[error("listing fleet instances failed: {0}")]
    Fleet(String),

    #[error("no instances match tags [{tags}]")]
    NoInstances { tags: String },
}

/// Identifier the command service assigns to an issued command
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CommandId(pub String);

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Instance tag used to select worker hosts
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// Sends one shell command to a group of hosts.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Issue `command` on every host of `hosts`. The caller keeps `hosts`
    /// within the service's per-command limit.
    async fn send_command(&self, hosts: &[String], command: &str)
        -> Result<CommandId, DispatchError>;
}

/// Resolves tags to host ids.
#[async_trait]
pub trait FleetController: Send + Sync {
    async fn list_instances(&self, tags: &[Tag]) -> Result<Vec<String>, DispatchError>;
}

/// Splits host lists into fixed-size batches, one command per batch
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchedDispatcher {
    batch_size: NonZeroUsize,
}

impl BatchedDispatcher {
    pub fn new(batch_size: usize) -> Result<Self, DispatchError> {
        crate::utils::validate_batch_size(batch_size)
            .map_err(|e| DispatchError::InvalidBatchSize(e.to_string()))?;
        let batch_size = NonZeroUsize::new(batch_size)
            .ok_or_else(|| DispatchError::InvalidBatchSize("batch size cannot be zero".into()))?;
        Ok(Self { batch_size })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size.get()
    }

    /// Issue `command` to every host, batch by batch.
    ///
    /// Returns the command ids in batch order. The first failing batch aborts
    /// the dispatch; batches already issued are not recalled.
    pub async fn dispatch(
        &self,
        executor: &dyn RemoteExecutor,
        hosts: &[String],
        command: &str,
    ) -> Result<Vec<CommandId>, DispatchError> {
        if hosts.is_empty() {
            warn!("No hosts to dispatch '{}' to", command);
            return Ok(Vec::new());
        }

        let batches = hosts.chunks(self.batch_size.get());
        info!(
            "Dispatching to {} hosts in {} batches of at most {}",
            hosts.len(),
            batches.len(),
            self.batch_size
        );

        let mut ids = Vec::with_capacity(batches.len());
        for (batch, chunk) in batches.enumerate() {
            let id = executor
                .send_command(chunk, command)
                .await
                .map_err(|e| match e {
                    DispatchError::Command { .. } => e,
                    other => DispatchError::Command {
                        batch,
                        hosts: chunk.len(),
                        reason: other.to_string(),
                    },
                })?;
            debug!("Batch {} ({} hosts) -> command {}", batch, chunk.len(), id);
            ids.push(id);
        }
        Ok(ids)
    }
}

impl Default for BatchedDispatcher {
    fn default() -> Self {
        Self {
            batch_size: NonZeroUsize::new(crate::defaults::DISPATCH_BATCH_SIZE)
                .unwrap_or(NonZeroUsize::MIN),
        }
    }
}

/// List the hosts carrying `tags` and dispatch `command` to all of them.
pub async fn dispatch_to_fleet(
    fleet: &dyn FleetController,
    executor: &dyn RemoteExecutor,
    dispatcher: &BatchedDispatcher,
    tags: &[Tag],
    command: &str,
) -> Result<Vec<CommandId>, DispatchError> {
    let hosts = fleet.list_instances(tags).await?;
    if hosts.is_empty() {
        let tags = tags.iter().map(Tag::to_string).collect::<Vec<_>>().join(", ");
        return Err(DispatchError::NoInstances { tags });
    }
    info!("Found {} instances", hosts.len());
    dispatcher.dispatch(executor, &hosts, command).await
}
