//! Per-entry scheduling.
//!
//! A [`Scheduler`] runs an action for an entry at an instant derived from the
//! entry's metadata. Two implementations compose into a node's stack:
//!
//! ```text
//!            schedule / cancel
//!                   │
//!                   ▼
//! ┌──────────────────────────────────┐        ┌───────────────────────┐
//! │      PrimaryOwnerScheduler       │───────►│   CommandDispatcher   │──► owner node
//! │  resolve owner, retry w/ backoff │ remote └───────────────────────┘
//! └──────────────────────────────────┘
//!                   │ local owner
//!                   ▼
//! ┌──────────────────────────────────┐
//! │          LocalScheduler          │
//! │  id → timer (one per id)         │──► EntryAction::execute(id) on fire
//! └──────────────────────────────────┘
//! ```
//!
//! The topology coordinator drives whichever `Scheduler` it is given when
//! ownership changes.

mod expiration;
mod local;
mod primary_owner;

pub use expiration::{ExpirationAction, ExpirationMetadata, Remover};
pub use local::{LocalScheduler, LocalSchedulerBuilder};
pub use primary_owner::PrimaryOwnerScheduler;

use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Metadata from which the target instant of an entry's action is derived.
pub trait ScheduleMetadata: Clone + Send + Sync + 'static {
    /// Instant the duration is measured from (e.g. last access).
    fn basis(&self) -> SystemTime;

    /// Time after [`basis`](Self::basis) at which the action runs.
    fn duration(&self) -> Duration;

    /// Whether the duration means "never" (immortal entries).
    fn skip(&self) -> bool {
        false
    }

    /// Target instant, or `None` if the entry must not be scheduled.
    fn deadline(&self) -> Option<SystemTime> {
        if self.skip() {
            return None;
        }
        self.basis().checked_add(self.duration())
    }
}

/// The domain action run when an entry's timer fires.
#[async_trait]
pub trait EntryAction<I>: Send + Sync {
    /// Run the action for `id`.
    async fn execute(&self, id: I);
}

#[async_trait]
impl<I, F> EntryAction<I> for F
where
    I: Send + 'static,
    F: Fn(I) + Send + Sync,
{
    async fn execute(&self, id: I) {
        (self)(id)
    }
}

/// Looks up an entry's current metadata.
#[async_trait]
pub trait MetadataSource<I, M>: Send + Sync {
    /// Metadata for `id`, or `None` if the entry no longer exists.
    async fn metadata(&self, id: &I) -> Option<M>;
}

/// Scheduling operations, local or forwarded.
#[async_trait]
pub trait Scheduler<I, M>: Send + Sync {
    /// Schedule `id`, reading its metadata from the implementation's own
    /// metadata source.
    async fn schedule(&self, id: I) -> Result<()>;

    /// Schedule `id` with the given metadata, replacing any existing timer.
    async fn schedule_with_metadata(&self, id: I, metadata: M) -> Result<()>;

    /// Cancel any timer for `id`. Idempotent.
    async fn cancel(&self, id: &I) -> Result<()>;

    /// Check if a timer is installed for `id`.
    async fn contains(&self, id: &I) -> Result<bool>;

    /// Snapshot of the scheduled identifiers.
    async fn entries(&self) -> Result<ScheduledEntries<I>>;

    /// Stop all timers and release resources. Idempotent.
    async fn close(&self);
}

/// A finite, restartable snapshot of scheduled identifiers.
///
/// Cloning is cheap and every [`iter`](Self::iter) starts from the beginning.
#[derive(Debug, Clone)]
pub struct ScheduledEntries<I> {
    ids: Arc<[I]>,
}

impl<I> ScheduledEntries<I> {
    /// Wrap an already collected set of identifiers.
    pub fn new(ids: Vec<I>) -> Self {
        Self { ids: ids.into() }
    }

    /// Iterate over the snapshot.
    pub fn iter(&self) -> std::slice::Iter<'_, I> {
        self.ids.iter()
    }

    /// Number of identifiers.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Check if the snapshot is empty.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Check if the snapshot contains `id`.
    pub fn contains(&self, id: &I) -> bool
    where
        I: PartialEq,
    {
        self.ids.contains(id)
    }

    /// Copy the identifiers out.
    pub fn to_vec(&self) -> Vec<I>
    where
        I: Clone,
    {
        self.ids.to_vec()
    }
}

impl<I> Default for ScheduledEntries<I> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl<'a, I> IntoIterator for &'a ScheduledEntries<I> {
    type Item = &'a I;
    type IntoIter = std::slice::Iter<'a, I>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
