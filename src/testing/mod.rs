//! Test doubles and scenario tests for the scheduling stack.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     Scenario tests                           │
//! │                                                              │
//! │  TopologyNotifier ──► SchedulerTopologyCoordinator           │
//! │                              │                               │
//! │                              ▼                               │
//! │                      RecordingScheduler   (calls observed)   │
//! │                                                              │
//! │  PrimaryOwnerScheduler ──► FlakyDispatcher ──► InProcess…    │
//! │                            (inject failures)   Dispatcher    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use crema_scheduler::scheduler::{ExpirationMetadata, Scheduler};
//! use crema_scheduler::testing::{RecordingScheduler, SchedulerCall};
//!
//! let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
//! rt.block_on(async {
//!     let scheduler = RecordingScheduler::<String, ExpirationMetadata>::new();
//!     scheduler.schedule("session-1".to_string()).await.unwrap();
//!     assert_eq!(
//!         scheduler.calls(),
//!         vec![SchedulerCall::Schedule("session-1".to_string())]
//!     );
//! });
//! ```

mod flaky;
mod recording;
mod utils;

mod topology_tests;

pub use flaky::FlakyDispatcher;
pub use recording::{RecordingScheduler, SchedulerCall};
pub use utils::wait_for;

#[cfg(test)]
pub(crate) use utils::init_tracing;
