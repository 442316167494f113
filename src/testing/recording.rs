//! Scheduler double that records every call.

use crate::error::{Error, Result};
use crate::scheduler::{ScheduleMetadata, ScheduledEntries, Scheduler};
use crate::types::Identifier;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// A call made against a [`RecordingScheduler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerCall<I, M> {
    Schedule(I),
    ScheduleWithMetadata(I, M),
    Cancel(I),
    Contains(I),
    Entries,
    Close,
}

/// Records calls and keeps a set of scheduled identifiers, without timers.
pub struct RecordingScheduler<I, M> {
    calls: Mutex<Vec<SchedulerCall<I, M>>>,
    scheduled: Mutex<Vec<I>>,
    delay: Duration,
    closed: AtomicBool,
}

impl<I, M> RecordingScheduler<I, M>
where
    I: Identifier,
    M: ScheduleMetadata,
{
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            scheduled: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
            closed: AtomicBool::new(false),
        }
    }

    /// Sleep this long inside every schedule and cancel call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// All calls so far, in order.
    pub fn calls(&self) -> Vec<SchedulerCall<I, M>> {
        self.calls.lock().clone()
    }

    /// Identifiers passed to either schedule operation, in call order.
    pub fn scheduled_ids(&self) -> Vec<I> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                SchedulerCall::Schedule(id) | SchedulerCall::ScheduleWithMetadata(id, _) => {
                    Some(id.clone())
                }
                _ => None,
            })
            .collect()
    }

    /// Identifiers passed to cancel, in call order.
    pub fn cancelled_ids(&self) -> Vec<I> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                SchedulerCall::Cancel(id) => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    /// Forget recorded calls. Scheduled identifiers are kept.
    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    fn record(&self, call: SchedulerCall<I, M>) {
        self.calls.lock().push(call);
    }

    fn add(&self, id: &I) {
        let mut scheduled = self.scheduled.lock();
        if !scheduled.contains(id) {
            scheduled.push(id.clone());
        }
    }

    fn remove(&self, id: &I) {
        self.scheduled.lock().retain(|scheduled| scheduled != id);
    }

    async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

impl<I, M> Default for RecordingScheduler<I, M>
where
    I: Identifier,
    M: ScheduleMetadata,
{
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<I, M> Scheduler<I, M> for RecordingScheduler<I, M>
where
    I: Identifier,
    M: ScheduleMetadata,
{
    async fn schedule(&self, id: I) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        self.pause().await;
        self.add(&id);
        self.record(SchedulerCall::Schedule(id));
        Ok(())
    }

    async fn schedule_with_metadata(&self, id: I, metadata: M) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        self.pause().await;
        if metadata.deadline().is_some() {
            self.add(&id);
        } else {
            self.remove(&id);
        }
        self.record(SchedulerCall::ScheduleWithMetadata(id, metadata));
        Ok(())
    }

    async fn cancel(&self, id: &I) -> Result<()> {
        self.pause().await;
        self.remove(id);
        self.record(SchedulerCall::Cancel(id.clone()));
        Ok(())
    }

    async fn contains(&self, id: &I) -> Result<bool> {
        self.record(SchedulerCall::Contains(id.clone()));
        Ok(self.scheduled.lock().contains(id))
    }

    async fn entries(&self) -> Result<ScheduledEntries<I>> {
        self.record(SchedulerCall::Entries);
        Ok(ScheduledEntries::new(self.scheduled.lock().clone()))
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.scheduled.lock().clear();
            self.record(SchedulerCall::Close);
        }
    }
}
