//! Forwarding scheduler.
//!
//! Each operation is routed to the member that currently owns the entry's
//! partition. The owner is resolved again on every attempt, so a retry after
//! a failover reaches the new owner.

use crate::command::{Command, CommandResult};
use crate::config::{MetadataForwarding, SchedulerConfig};
use crate::dispatch::CommandDispatcher;
use crate::error::{DispatchError, Error, Result};
use crate::metrics::SchedulerMetrics;
use crate::partitioning::OwnerLocator;
use crate::scheduler::{ScheduleMetadata, ScheduledEntries, Scheduler};
use crate::types::{Affinity, Identifier, NodeId};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// Lower bound on the delay between cancel attempts once the configured
/// delays are used up.
const MIN_CANCEL_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Routes scheduling operations to the primary owner of each entry.
pub struct PrimaryOwnerScheduler<I, M> {
    /// This node's ID.
    node_id: NodeId,

    /// Scheduler for entries this node owns.
    local: Arc<dyn Scheduler<I, M>>,

    /// Current partition ownership.
    locator: Arc<dyn OwnerLocator>,

    /// Maps an entry to its partition key.
    affinity: Affinity<I>,

    /// Delivers commands to other members.
    dispatcher: Arc<dyn CommandDispatcher<I, M>>,

    config: SchedulerConfig,
    metrics: Arc<SchedulerMetrics>,
    closed: AtomicBool,
}

impl<I, M> PrimaryOwnerScheduler<I, M>
where
    I: Identifier,
    M: ScheduleMetadata,
{
    /// Create a forwarding scheduler for `config.node_id`.
    pub fn new(
        local: Arc<dyn Scheduler<I, M>>,
        locator: Arc<dyn OwnerLocator>,
        affinity: Affinity<I>,
        dispatcher: Arc<dyn CommandDispatcher<I, M>>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            node_id: config.node_id,
            local,
            locator,
            affinity,
            dispatcher,
            config,
            metrics: Arc::new(SchedulerMetrics::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Record into `metrics` instead of a private instance.
    pub fn with_metrics(mut self, metrics: Arc<SchedulerMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn metrics(&self) -> &Arc<SchedulerMetrics> {
        &self.metrics
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(Error::Closed)
        } else {
            Ok(())
        }
    }

    /// Execute `command` once on the current owner of `key`.
    async fn invoke(&self, command: Command<I, M>, key: &[u8]) -> Result<CommandResult<I>> {
        let owner = self
            .locator
            .primary_owner(key)
            .ok_or(DispatchError::NoPrimaryOwner)?;

        if owner == self.node_id {
            return command.execute(self.local.as_ref()).await;
        }
        self.send(command, owner).await
    }

    /// Execute `command` on `member` through the dispatcher.
    async fn send(&self, command: Command<I, M>, member: NodeId) -> Result<CommandResult<I>> {
        let command = match (command, self.config.forwarding) {
            (Command::ScheduleWithMetadata { id, .. }, MetadataForwarding::Transient) => {
                Command::ScheduleTransient { id }
            }
            (command, _) => command,
        };

        trace!(
            node_id = self.node_id,
            member,
            command = command.kind(),
            "Forwarding command"
        );
        self.metrics.dispatched.inc();
        self.dispatcher.execute_on_member(command, member).await
    }

    /// Run `attempt` under the configured retry delays, retrying transient
    /// failures only.
    async fn with_retry<F, Fut>(&self, kind: &'static str, mut attempt: F) -> Result<CommandResult<I>>
    where
        F: FnMut() -> Fut + Send,
        Fut: std::future::Future<Output = Result<CommandResult<I>>> + Send,
    {
        let retry = &self.config.retry;
        let attempts = retry.attempts();

        let mut n = 0;
        loop {
            let delay = retry.delay(n);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            match attempt().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_transient() && n + 1 < attempts => {
                    debug!(
                        node_id = self.node_id,
                        command = kind,
                        attempt = n + 1,
                        error = %e,
                        "Command failed, retrying"
                    );
                    self.metrics.dispatch_retries.inc();
                    n += 1;
                }
                Err(e) => {
                    self.metrics.dispatch_failures.inc(kind);
                    return Err(e);
                }
            }
        }
    }

    /// Best-effort schedule: failures are logged and dropped.
    async fn forward_schedule(&self, command: Command<I, M>) -> Result<()> {
        self.ensure_open()?;

        let Some(id) = command.id().cloned() else {
            return Ok(());
        };
        let key = (self.affinity)(&id);
        let kind = command.kind();

        let result = self
            .with_retry(kind, || self.invoke(command.clone(), &key))
            .await
            .and_then(CommandResult::into_unit);

        if let Err(e) = result {
            warn!(
                node_id = self.node_id,
                ?id,
                command = kind,
                error = %e,
                "Dropping schedule request"
            );
            self.metrics.dispatch_dropped.inc();
        }
        Ok(())
    }
}

#[async_trait]
impl<I, M> Scheduler<I, M> for PrimaryOwnerScheduler<I, M>
where
    I: Identifier,
    M: ScheduleMetadata,
{
    async fn schedule(&self, id: I) -> Result<()> {
        self.forward_schedule(Command::ScheduleTransient { id }).await
    }

    async fn schedule_with_metadata(&self, id: I, metadata: M) -> Result<()> {
        self.forward_schedule(Command::ScheduleWithMetadata { id, metadata })
            .await
    }

    async fn cancel(&self, id: &I) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }

        let key = (self.affinity)(id);
        let command: Command<I, M> = Command::Cancel { id: id.clone() };
        let retry = &self.config.retry;
        let deadline = Instant::now() + self.config.cancel_timeout;

        let mut n = 0;
        loop {
            let mut delay = retry.delay(n);
            if n >= retry.attempts() {
                delay = delay.max(MIN_CANCEL_RETRY_DELAY);
            }
            if !delay.is_zero() {
                if Instant::now() + delay > deadline {
                    break;
                }
                tokio::time::sleep(delay).await;
            }

            match self.invoke(command.clone(), &key).await {
                Ok(result) => return result.into_unit(),
                Err(e) if e.is_transient() => {
                    debug!(
                        node_id = self.node_id,
                        ?id,
                        attempt = n + 1,
                        error = %e,
                        "Cancel failed, retrying"
                    );
                    self.metrics.dispatch_retries.inc();
                    n += 1;
                }
                Err(e) => {
                    self.metrics.dispatch_failures.inc("cancel");
                    return Err(e);
                }
            }
        }

        warn!(
            node_id = self.node_id,
            ?id,
            attempts = n,
            "Cancel not acknowledged before timeout"
        );
        self.metrics.dispatch_failures.inc("cancel");
        Err(Error::Timeout)
    }

    async fn contains(&self, id: &I) -> Result<bool> {
        self.ensure_open()?;

        let key = (self.affinity)(id);
        let command: Command<I, M> = Command::Contains { id: id.clone() };
        self.with_retry("contains", || self.invoke(command.clone(), &key))
            .await?
            .into_bool()
    }

    async fn entries(&self) -> Result<ScheduledEntries<I>> {
        self.ensure_open()?;

        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        for id in self.local.entries().await?.iter() {
            if seen.insert(id.clone()) {
                ids.push(id.clone());
            }
        }

        for member in self.locator.members() {
            if member == self.node_id {
                continue;
            }

            let result = self
                .with_retry("list_entries", || self.send(Command::ListEntries, member))
                .await
                .and_then(CommandResult::into_entries);

            match result {
                Ok(remote) => {
                    for id in remote {
                        if seen.insert(id.clone()) {
                            ids.push(id);
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        node_id = self.node_id,
                        member,
                        error = %e,
                        "Skipping unreachable member while listing entries"
                    );
                }
            }
        }

        Ok(ScheduledEntries::new(ids))
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.dispatcher.close().await;
        self.local.close().await;
        debug!(node_id = self.node_id, "Primary owner scheduler closed");
    }
}

impl<I, M> std::fmt::Debug for PrimaryOwnerScheduler<I, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrimaryOwnerScheduler")
            .field("node_id", &self.node_id)
            .field("forwarding", &self.config.forwarding)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}
