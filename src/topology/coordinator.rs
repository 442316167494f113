//! Keeps scheduled entries aligned with primary ownership.
//!
//! On every topology event the coordinator compares the locality of each
//! stored entry before and after the change:
//!
//! ```text
//!   old local  new local   pre-rehash     post-rehash / topology-changed
//!   ─────────  ─────────   ────────────   ──────────────────────────────
//!     yes        no        cancel(id)     -
//!     no         no        cancel(id)     -
//!     no         yes       -              schedule(id, metadata)
//!     yes        yes       -              -
//! ```
//!
//! The pre-rehash pass cancels every entry not owned under the ending hash,
//! including entries this node did not own before either. A forward that
//! raced an ownership change can leave a timer on such a node.
//!
//! All work runs on one worker task fed by an unbounded FIFO channel, so
//! rehash passes never interleave. Scheduling passes are last-one-wins: a
//! new pass cancels the one before it, which notices at its next entry.
//! Cancellation passes always run to completion unless the coordinator is
//! closed.

use crate::config::CoordinatorConfig;
use crate::error::{Error, Result};
use crate::metrics::SchedulerMetrics;
use crate::partitioning::{ConsistentHash, Locality};
use crate::scheduler::Scheduler;
use crate::store::EntryStore;
use crate::topology::events::{ListenerId, TopologyEvent, TopologyListener, TopologySource};
use crate::types::{Affinity, Identifier, NodeId};
use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

/// State of a rehash pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RehashState {
    /// Queued on the worker.
    Pending = 0,
    /// Iterating entries.
    Running = 1,
    /// Stopped before finishing.
    Cancelled = 2,
    /// Visited every entry.
    Completed = 3,
}

impl RehashState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => RehashState::Pending,
            1 => RehashState::Running,
            2 => RehashState::Cancelled,
            _ => RehashState::Completed,
        }
    }

    /// Check if the pass will not do any more work.
    pub fn is_finished(self) -> bool {
        matches!(self, RehashState::Cancelled | RehashState::Completed)
    }
}

/// What a rehash pass does to entries whose locality changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RehashKind {
    /// Cancel entries this node stops owning.
    Cancel,
    /// Schedule entries this node starts owning.
    Schedule,
}

/// Observable, cancellable handle to one rehash pass.
#[derive(Debug)]
pub struct RehashHandle {
    id: Uuid,
    kind: RehashKind,
    state: AtomicU8,
    token: CancellationToken,
}

impl RehashHandle {
    fn new(kind: RehashKind, token: CancellationToken) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            state: AtomicU8::new(RehashState::Pending as u8),
            token,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> RehashKind {
        self.kind
    }

    pub fn state(&self) -> RehashState {
        RehashState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Check if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Request cancellation. A running pass stops before its next entry.
    pub fn cancel(&self) {
        self.token.cancel();
        let _ = self.state.compare_exchange(
            RehashState::Pending as u8,
            RehashState::Cancelled as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Pending → Running. Fails if the pass was cancelled first.
    fn start(&self) -> bool {
        if self.token.is_cancelled() {
            self.state
                .store(RehashState::Cancelled as u8, Ordering::Release);
            return false;
        }
        self.state
            .compare_exchange(
                RehashState::Pending as u8,
                RehashState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    fn finish(&self, state: RehashState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

/// A queued rehash pass.
struct RehashTask {
    handle: Arc<RehashHandle>,
    old: Locality,
    new: Locality,
}

/// State shared between the coordinator and its registered listener.
struct Shared {
    local_node: NodeId,
    sender: ArcSwapOption<mpsc::UnboundedSender<RehashTask>>,
    current: ArcSwapOption<RehashHandle>,
    shutdown: CancellationToken,
    metrics: Arc<SchedulerMetrics>,
}

impl Shared {
    fn handle_event(&self, event: &TopologyEvent) {
        info!(
            node_id = self.local_node,
            event = event.kind(),
            "Topology event received"
        );

        match event {
            TopologyEvent::PreRehash { old, new } => {
                self.supersede(None);
                let handle = Arc::new(RehashHandle::new(
                    RehashKind::Cancel,
                    self.shutdown.child_token(),
                ));
                self.submit(handle, old, new);
            }
            TopologyEvent::PostRehash { old, new } => self.schedule_pass(old, new),
            TopologyEvent::TopologyChanged { start, end } => self.schedule_pass(start, end),
        }
    }

    fn schedule_pass(&self, old: &Arc<ConsistentHash>, new: &Arc<ConsistentHash>) {
        if !new.has_primary_segments(self.local_node) {
            debug!(
                node_id = self.local_node,
                "No primary segments under new hash, nothing to schedule"
            );
            return;
        }

        let handle = Arc::new(RehashHandle::new(
            RehashKind::Schedule,
            self.shutdown.child_token(),
        ));
        self.supersede(Some(Arc::clone(&handle)));
        self.submit(handle, old, new);
    }

    /// Swap the current scheduling pass and cancel the one it replaces.
    fn supersede(&self, next: Option<Arc<RehashHandle>>) {
        if let Some(previous) = self.current.swap(next) {
            if !previous.state().is_finished() {
                debug!(task_id = %previous.id(), "Superseding rehash task");
                self.metrics.rehash_superseded.inc();
            }
            previous.cancel();
        }
    }

    fn submit(
        &self,
        handle: Arc<RehashHandle>,
        old: &Arc<ConsistentHash>,
        new: &Arc<ConsistentHash>,
    ) {
        let task = RehashTask {
            handle: Arc::clone(&handle),
            old: Locality::of(Arc::clone(old), self.local_node),
            new: Locality::of(Arc::clone(new), self.local_node),
        };

        let sender = self.sender.load();
        let submitted = match &*sender {
            Some(sender) => sender.send(task).is_ok(),
            None => false,
        };

        if submitted {
            trace!(task_id = %handle.id(), kind = ?handle.kind(), "Rehash task submitted");
            self.metrics.rehash_submitted.inc();
        } else {
            debug!(task_id = %handle.id(), "Coordinator closed, rehash task rejected");
            handle.cancel();
        }
    }
}

struct Listener {
    shared: Arc<Shared>,
}

impl TopologyListener for Listener {
    fn on_event(&self, event: &TopologyEvent) {
        self.shared.handle_event(event);
    }
}

/// Runs rehash passes one at a time.
struct RehashWorker<I, M> {
    local_node: NodeId,
    scheduler: Arc<dyn Scheduler<I, M>>,
    store: Arc<dyn EntryStore<I, M>>,
    affinity: Affinity<I>,
    yield_interval: usize,
    metrics: Arc<SchedulerMetrics>,
}

impl<I, M> RehashWorker<I, M>
where
    I: Identifier,
    M: Send + 'static,
{
    async fn run(self, mut tasks: mpsc::UnboundedReceiver<RehashTask>, shutdown: CancellationToken) {
        loop {
            let task = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                task = tasks.recv() => match task {
                    Some(task) => task,
                    None => break,
                },
            };
            self.execute(task).await;
        }

        // Anything still queued will never run.
        tasks.close();
        while let Ok(task) = tasks.try_recv() {
            task.handle.cancel();
        }
        debug!(node_id = self.local_node, "Rehash worker stopped");
    }

    async fn execute(&self, task: RehashTask) {
        let RehashTask { handle, old, new } = task;
        if !handle.start() {
            trace!(task_id = %handle.id(), "Rehash task cancelled before start");
            self.metrics.rehash_cancelled.inc();
            return;
        }

        let mut entries = match self.store.entries().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(task_id = %handle.id(), error = %e, "Failed to iterate entries");
                handle.finish(RehashState::Cancelled);
                self.metrics.rehash_cancelled.inc();
                return;
            }
        };

        let mut visited = 0usize;
        let mut changed = 0usize;
        let mut cancelled = false;

        for (id, metadata) in entries.by_ref() {
            if handle.is_cancelled() {
                cancelled = true;
                break;
            }

            visited += 1;
            if visited % self.yield_interval == 0 {
                tokio::task::yield_now().await;
            }

            let key = (self.affinity)(&id);
            let was_local = old.is_local(&key);
            let is_local = new.is_local(&key);

            match handle.kind() {
                RehashKind::Cancel if !is_local => {
                    changed += 1;
                    if let Err(e) = self.scheduler.cancel(&id).await {
                        warn!(?id, error = %e, "Failed to cancel entry not owned under new hash");
                    }
                }
                RehashKind::Schedule if !was_local && is_local => {
                    changed += 1;
                    let result = match metadata {
                        Some(metadata) => self.scheduler.schedule_with_metadata(id.clone(), metadata).await,
                        None => self.scheduler.schedule(id.clone()).await,
                    };
                    if let Err(e) = result {
                        warn!(?id, error = %e, "Failed to schedule entry arriving on this node");
                    }
                }
                _ => {}
            }
        }
        entries.close();

        if cancelled {
            handle.finish(RehashState::Cancelled);
            self.metrics.rehash_cancelled.inc();
            debug!(
                task_id = %handle.id(),
                kind = ?handle.kind(),
                visited,
                changed,
                "Rehash task cancelled"
            );
        } else {
            handle.finish(RehashState::Completed);
            self.metrics.rehash_completed.inc();
            debug!(
                task_id = %handle.id(),
                kind = ?handle.kind(),
                visited,
                changed,
                "Rehash task completed"
            );
        }
    }
}

/// Reacts to topology events by cancelling and scheduling entries whose
/// primary owner changed.
pub struct SchedulerTopologyCoordinator {
    shared: Arc<Shared>,
    source: Arc<dyn TopologySource>,
    listener: Mutex<Option<ListenerId>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    config: CoordinatorConfig,
    closed: AtomicBool,
}

impl SchedulerTopologyCoordinator {
    /// Spawn the worker and register with `source`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<I, M>(
        local_node: NodeId,
        scheduler: Arc<dyn Scheduler<I, M>>,
        store: Arc<dyn EntryStore<I, M>>,
        affinity: Affinity<I>,
        source: Arc<dyn TopologySource>,
        config: CoordinatorConfig,
    ) -> Result<Self>
    where
        I: Identifier,
        M: Send + 'static,
    {
        Self::start_with_metrics(
            local_node,
            scheduler,
            store,
            affinity,
            source,
            config,
            Arc::new(SchedulerMetrics::new()),
        )
    }

    /// Like [`start`](Self::start), recording into `metrics`.
    pub fn start_with_metrics<I, M>(
        local_node: NodeId,
        scheduler: Arc<dyn Scheduler<I, M>>,
        store: Arc<dyn EntryStore<I, M>>,
        affinity: Affinity<I>,
        source: Arc<dyn TopologySource>,
        config: CoordinatorConfig,
        metrics: Arc<SchedulerMetrics>,
    ) -> Result<Self>
    where
        I: Identifier,
        M: Send + 'static,
    {
        let runtime = Handle::try_current().map_err(|_| Error::NoRuntime)?;
        let (sender, receiver) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        let shared = Arc::new(Shared {
            local_node,
            sender: ArcSwapOption::from_pointee(sender),
            current: ArcSwapOption::empty(),
            shutdown: shutdown.clone(),
            metrics: Arc::clone(&metrics),
        });

        let worker = RehashWorker {
            local_node,
            scheduler,
            store,
            affinity,
            yield_interval: config.yield_interval.max(1),
            metrics,
        };
        let worker = runtime.spawn(worker.run(receiver, shutdown));

        let listener = source.register(Arc::new(Listener {
            shared: Arc::clone(&shared),
        }));

        info!(node_id = local_node, "Topology coordinator started");

        Ok(Self {
            shared,
            source,
            listener: Mutex::new(Some(listener)),
            worker: Mutex::new(Some(worker)),
            config,
            closed: AtomicBool::new(false),
        })
    }

    /// The current scheduling pass, if one was submitted and not superseded.
    pub fn current_task(&self) -> Option<Arc<RehashHandle>> {
        self.shared.current.load_full()
    }

    pub fn metrics(&self) -> &Arc<SchedulerMetrics> {
        &self.shared.metrics
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stop reacting to events and wait for the worker to exit.
    ///
    /// Waits at most `stop_timeout`; a worker still running after that is
    /// aborted. Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Some(listener) = self.listener.lock().take() {
            self.source.unregister(listener);
        }
        self.shared.sender.store(None);
        self.shared.shutdown.cancel();
        if let Some(current) = self.shared.current.swap(None) {
            current.cancel();
        }

        let worker = self.worker.lock().take();
        if let Some(mut worker) = worker {
            match tokio::time::timeout(self.config.stop_timeout, &mut worker).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(error = %e, "Rehash worker ended abnormally"),
                Err(_) => {
                    worker.abort();
                    warn!(
                        node_id = self.shared.local_node,
                        timeout_ms = self.config.stop_timeout.as_millis() as u64,
                        "Rehash worker did not stop in time, aborted"
                    );
                }
            }
        }

        info!(node_id = self.shared.local_node, "Topology coordinator closed");
    }
}

impl Drop for SchedulerTopologyCoordinator {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.get_mut().take() {
            self.source.unregister(listener);
        }
        self.shared.shutdown.cancel();
    }
}

impl std::fmt::Debug for SchedulerTopologyCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerTopologyCoordinator")
            .field("node_id", &self.shared.local_node)
            .field("current_task", &self.current_task())
            .field("closed", &self.is_closed())
            .finish()
    }
}
