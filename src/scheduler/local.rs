//! Local timer index.
//!
//! Each scheduled identifier owns exactly one timer task sleeping until its
//! target instant. Every install gets a fresh generation number; a timer only
//! fires if its generation is still the one in the index, so a replaced or
//! cancelled timer that already woke up never runs its action.

use crate::error::{Error, Result};
use crate::metrics::SchedulerMetrics;
use crate::scheduler::{
    EntryAction, MetadataSource, ScheduleMetadata, ScheduledEntries, Scheduler,
};
use crate::types::Identifier;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tracing::{debug, trace};

/// An installed timer.
#[derive(Debug)]
struct Timer {
    generation: u64,
    deadline: SystemTime,
    task: AbortHandle,
}

struct Inner<I, M> {
    index: Mutex<HashMap<I, Timer>>,
    next_generation: AtomicU64,
    closed: AtomicBool,
    action: Arc<dyn EntryAction<I>>,
    metadata: Option<Arc<dyn MetadataSource<I, M>>>,
    runtime: Handle,
    metrics: Arc<SchedulerMetrics>,
}

/// Schedules entry actions on this node only.
pub struct LocalScheduler<I, M> {
    inner: Arc<Inner<I, M>>,
}

impl<I, M> Clone for LocalScheduler<I, M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<I, M> LocalScheduler<I, M>
where
    I: Identifier,
    M: ScheduleMetadata,
{
    /// Start building a scheduler that runs `action` when timers fire.
    pub fn builder(action: Arc<dyn EntryAction<I>>) -> LocalSchedulerBuilder<I, M> {
        LocalSchedulerBuilder {
            action,
            metadata: None,
            runtime: None,
            metrics: None,
            _marker: PhantomData,
        }
    }

    /// Create a scheduler on the current runtime with no metadata source.
    pub fn new(action: Arc<dyn EntryAction<I>>) -> Result<Self> {
        Self::builder(action).build()
    }

    /// Target instant of the timer installed for `id`.
    pub fn deadline(&self, id: &I) -> Option<SystemTime> {
        self.inner.index.lock().get(id).map(|timer| timer.deadline)
    }

    /// Number of installed timers.
    pub fn len(&self) -> usize {
        self.inner.index.lock().len()
    }

    /// Check if no timers are installed.
    pub fn is_empty(&self) -> bool {
        self.inner.index.lock().is_empty()
    }

    /// Check if [`close`](Scheduler::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Metrics shared with this scheduler.
    pub fn metrics(&self) -> &Arc<SchedulerMetrics> {
        &self.inner.metrics
    }

    /// Install a timer for `id` firing at `deadline`, replacing any existing
    /// one.
    fn install(&self, id: I, deadline: SystemTime) -> Result<()> {
        let inner = &self.inner;
        let generation = inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let delay = deadline
            .duration_since(SystemTime::now())
            .unwrap_or(Duration::ZERO);

        let mut index = inner.index.lock();

        // Checked under the index lock so close() cannot miss this timer.
        if self.is_closed() {
            return Err(Error::Closed);
        }

        let timer_inner = Arc::clone(inner);
        let timer_id = id.clone();
        let task = inner
            .runtime
            .spawn(async move {
                tokio::time::sleep(delay).await;
                Inner::fire(timer_inner, timer_id, generation).await;
            })
            .abort_handle();

        let previous = index.insert(
            id.clone(),
            Timer {
                generation,
                deadline,
                task,
            },
        );
        drop(index);

        match previous {
            Some(previous) => {
                previous.task.abort();
                inner.metrics.rescheduled.inc();
            }
            None => {
                inner.metrics.scheduled.inc();
                inner.metrics.active_timers.inc();
            }
        }

        trace!(?id, ?delay, generation, "Timer installed");
        Ok(())
    }

    /// Remove and stop the timer for `id`, if any.
    fn remove(&self, id: &I) -> bool {
        let removed = self.inner.index.lock().remove(id);
        match removed {
            Some(timer) => {
                timer.task.abort();
                self.inner.metrics.cancelled.inc();
                self.inner.metrics.active_timers.dec();
                trace!(?id, "Timer cancelled");
                true
            }
            None => false,
        }
    }
}

impl<I, M> Inner<I, M>
where
    I: Identifier,
    M: ScheduleMetadata,
{
    async fn fire(inner: Arc<Self>, id: I, generation: u64) {
        let current = {
            let mut index = inner.index.lock();
            match index.get(&id) {
                Some(timer) if timer.generation == generation => index.remove(&id),
                _ => None,
            }
        };

        // Replaced or cancelled after this timer woke up.
        if current.is_none() {
            return;
        }

        inner.metrics.active_timers.dec();
        inner.metrics.fired.inc();
        debug!(?id, "Timer fired");

        // Runs without the index lock so the action may reschedule or cancel.
        inner.action.execute(id).await;
    }
}

#[async_trait]
impl<I, M> Scheduler<I, M> for LocalScheduler<I, M>
where
    I: Identifier,
    M: ScheduleMetadata,
{
    async fn schedule(&self, id: I) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Closed);
        }

        let source = self
            .inner
            .metadata
            .as_ref()
            .ok_or(Error::MetadataUnavailable)?;

        match source.metadata(&id).await {
            Some(metadata) => self.schedule_with_metadata(id, metadata).await,
            None => {
                debug!(?id, "No metadata for entry, cancelling");
                self.remove(&id);
                Ok(())
            }
        }
    }

    async fn schedule_with_metadata(&self, id: I, metadata: M) -> Result<()> {
        match metadata.deadline() {
            Some(deadline) => self.install(id, deadline),
            None => {
                if self.is_closed() {
                    return Err(Error::Closed);
                }
                trace!(?id, "Immortal entry, not scheduling");
                self.inner.metrics.skipped.inc();
                self.remove(&id);
                Ok(())
            }
        }
    }

    async fn cancel(&self, id: &I) -> Result<()> {
        self.remove(id);
        Ok(())
    }

    async fn contains(&self, id: &I) -> Result<bool> {
        Ok(self.inner.index.lock().contains_key(id))
    }

    async fn entries(&self) -> Result<ScheduledEntries<I>> {
        let ids = self.inner.index.lock().keys().cloned().collect();
        Ok(ScheduledEntries::new(ids))
    }

    async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let timers: Vec<Timer> = {
            let mut index = self.inner.index.lock();
            index.drain().map(|(_, timer)| timer).collect()
        };

        for timer in &timers {
            timer.task.abort();
        }
        self.inner.metrics.active_timers.sub(timers.len() as i64);

        debug!(stopped = timers.len(), "Local scheduler closed");
    }
}

impl<I, M> std::fmt::Debug for LocalScheduler<I, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalScheduler")
            .field("timers", &self.inner.index.lock().len())
            .field("closed", &self.inner.closed.load(Ordering::Relaxed))
            .finish()
    }
}

/// Builder for [`LocalScheduler`].
pub struct LocalSchedulerBuilder<I, M> {
    action: Arc<dyn EntryAction<I>>,
    metadata: Option<Arc<dyn MetadataSource<I, M>>>,
    runtime: Option<Handle>,
    metrics: Option<Arc<SchedulerMetrics>>,
    _marker: PhantomData<fn() -> M>,
}

impl<I, M> LocalSchedulerBuilder<I, M>
where
    I: Identifier,
    M: ScheduleMetadata,
{
    /// Source used by `schedule(id)` to look up metadata.
    pub fn metadata_source(mut self, source: Arc<dyn MetadataSource<I, M>>) -> Self {
        self.metadata = Some(source);
        self
    }

    /// Runtime the timers run on. Defaults to the current runtime.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Metrics to record into.
    pub fn metrics(mut self, metrics: Arc<SchedulerMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Build the scheduler.
    pub fn build(self) -> Result<LocalScheduler<I, M>> {
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|_| Error::NoRuntime)?,
        };

        Ok(LocalScheduler {
            inner: Arc::new(Inner {
                index: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(1),
                closed: AtomicBool::new(false),
                action: self.action,
                metadata: self.metadata,
                runtime,
                metrics: self.metrics.unwrap_or_default(),
            }),
        })
    }
}
