//! Metrics for monitoring scheduling activity.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     SchedulerMetrics                        │
//! │  ┌──────────────┐  ┌──────────────────┐  ┌──────────────┐  │
//! │  │ Local timers │  │    Forwarding    │  │   Rehash     │  │
//! │  │ - scheduled  │  │ - dispatched     │  │ - submitted  │  │
//! │  │ - cancelled  │  │ - retries        │  │ - superseded │  │
//! │  │ - fired      │  │ - dropped        │  │ - completed  │  │
//! │  │ - active     │  │ - failures{cmd}  │  │ - cancelled  │  │
//! │  └──────────────┘  └──────────────────┘  └──────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! A single `Arc<SchedulerMetrics>` is usually shared by the local
//! scheduler, the primary owner forwarder and the topology coordinator of a
//! node.

mod counters;
mod gauges;

pub use counters::{Counter, LabeledCounter};
pub use gauges::Gauge;

/// Metrics for one node's scheduling stack.
#[derive(Debug)]
pub struct SchedulerMetrics {
    // Local timer index
    /// Timers installed for an id that had none.
    pub scheduled: Counter,
    /// Timers installed that replaced an existing timer.
    pub rescheduled: Counter,
    /// Schedule requests suppressed because the metadata is immortal.
    pub skipped: Counter,
    /// Timers removed before firing.
    pub cancelled: Counter,
    /// Timers that fired and ran their action.
    pub fired: Counter,
    /// Currently installed timers.
    pub active_timers: Gauge,

    // Forwarding
    /// Commands sent to a remote member.
    pub dispatched: Counter,
    /// Attempts beyond the first.
    pub dispatch_retries: Counter,
    /// Best-effort schedules given up after the retry budget.
    pub dispatch_dropped: Counter,
    /// Failed dispatch attempts by command kind.
    pub dispatch_failures: LabeledCounter,

    // Topology coordination
    /// Rehash tasks submitted to the worker.
    pub rehash_submitted: Counter,
    /// Scheduling tasks superseded by a newer topology event.
    pub rehash_superseded: Counter,
    /// Rehash tasks that ran to completion.
    pub rehash_completed: Counter,
    /// Rehash tasks that stopped early after cancellation.
    pub rehash_cancelled: Counter,
}

impl SchedulerMetrics {
    /// Create a new metrics instance.
    pub fn new() -> Self {
        Self {
            scheduled: Counter::new("scheduler_scheduled_total", "Timers installed"),
            rescheduled: Counter::new("scheduler_rescheduled_total", "Timers replaced"),
            skipped: Counter::new("scheduler_skipped_total", "Immortal entries not scheduled"),
            cancelled: Counter::new("scheduler_cancelled_total", "Timers cancelled"),
            fired: Counter::new("scheduler_fired_total", "Timers fired"),
            active_timers: Gauge::new("scheduler_active_timers", "Installed timers"),

            dispatched: Counter::new("scheduler_dispatched_total", "Commands forwarded"),
            dispatch_retries: Counter::new("scheduler_dispatch_retries_total", "Dispatch retries"),
            dispatch_dropped: Counter::new(
                "scheduler_dispatch_dropped_total",
                "Best-effort schedules dropped",
            ),
            dispatch_failures: LabeledCounter::new(
                "scheduler_dispatch_failures_total",
                "Failed dispatch attempts",
                "command",
            ),

            rehash_submitted: Counter::new("scheduler_rehash_submitted_total", "Rehash tasks submitted"),
            rehash_superseded: Counter::new(
                "scheduler_rehash_superseded_total",
                "Rehash tasks superseded",
            ),
            rehash_completed: Counter::new("scheduler_rehash_completed_total", "Rehash tasks completed"),
            rehash_cancelled: Counter::new("scheduler_rehash_cancelled_total", "Rehash tasks cancelled"),
        }
    }

    /// Take a point-in-time copy of all values.
    pub fn snapshot(&self) -> SchedulerMetricsSnapshot {
        SchedulerMetricsSnapshot {
            scheduled: self.scheduled.get(),
            rescheduled: self.rescheduled.get(),
            skipped: self.skipped.get(),
            cancelled: self.cancelled.get(),
            fired: self.fired.get(),
            active_timers: self.active_timers.get(),
            dispatched: self.dispatched.get(),
            dispatch_retries: self.dispatch_retries.get(),
            dispatch_dropped: self.dispatch_dropped.get(),
            dispatch_failures: self.dispatch_failures.total(),
            rehash_submitted: self.rehash_submitted.get(),
            rehash_superseded: self.rehash_superseded.get(),
            rehash_completed: self.rehash_completed.get(),
            rehash_cancelled: self.rehash_cancelled.get(),
        }
    }
}

impl Default for SchedulerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`SchedulerMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerMetricsSnapshot {
    pub scheduled: u64,
    pub rescheduled: u64,
    pub skipped: u64,
    pub cancelled: u64,
    pub fired: u64,
    pub active_timers: i64,
    pub dispatched: u64,
    pub dispatch_retries: u64,
    pub dispatch_dropped: u64,
    pub dispatch_failures: u64,
    pub rehash_submitted: u64,
    pub rehash_superseded: u64,
    pub rehash_completed: u64,
    pub rehash_cancelled: u64,
}
