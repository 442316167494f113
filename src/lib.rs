//! Primary-owner entry scheduling for a partitioned in-memory data grid.
//!
//! This crate runs per-entry timed actions (session expiration, for
//! example) so that exactly one member, the current primary owner of the
//! entry's partition, holds the timer for each entry:
//! - **LocalScheduler** keeps one tokio timer per entry on this node
//! - **PrimaryOwnerScheduler** routes operations to the owning member
//! - **SchedulerTopologyCoordinator** hands timers over when ownership moves
//!
//! # Features
//!
//! - At most one outstanding timer per entry; rescheduling replaces it
//! - Timer callbacks run outside every lock and may reschedule themselves
//! - Field-numbered command codec that skips unknown fields
//! - Bounded retries for forwarded commands; cancel waits for acknowledgement
//! - Last-one-wins rehash passes on a single worker task
//!
//! # Example
//!
//! ```rust
//! use crema_scheduler::scheduler::{
//!     EntryAction, ExpirationAction, ExpirationMetadata, LocalScheduler, Scheduler,
//! };
//! use crema_scheduler::store::MemoryStore;
//! use std::sync::Arc;
//! use std::time::{Duration, SystemTime};
//!
//! # let rt = tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap();
//! # rt.block_on(async {
//! let store = Arc::new(MemoryStore::<String, ExpirationMetadata>::new());
//! let action: Arc<dyn EntryAction<String>> =
//!     Arc::new(ExpirationAction::<String, ExpirationMetadata>::new(store.clone(), store.clone()));
//! let scheduler = LocalScheduler::<String, ExpirationMetadata>::builder(action)
//!     .metadata_source(store.clone())
//!     .build()
//!     .unwrap();
//!
//! let metadata = ExpirationMetadata::new(SystemTime::now(), Some(Duration::from_secs(1800)));
//! store.insert("session-1".to_string(), metadata);
//! scheduler.schedule("session-1".to_string()).await.unwrap();
//! assert!(scheduler.contains(&"session-1".to_string()).await.unwrap());
//!
//! scheduler.close().await;
//! # });
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │            Application Layer                │
//! │  (cache listeners, session manager)         │
//! └─────────────────────────────────────────────┘
//!                     │ schedule / cancel
//!                     ▼
//! ┌─────────────────────────────────────────────┐       ┌──────────────────┐
//! │          PrimaryOwnerScheduler              │──────►│ CommandDispatcher│
//! │  owner == self ? local : forward + retry    │       │  (Command codec) │
//! └─────────────────────────────────────────────┘       └──────────────────┘
//!                     │                                          │
//!                     ▼                                          ▼
//! ┌─────────────────────────────────────────────┐       ┌──────────────────┐
//! │             LocalScheduler                  │◄──────│  CommandHandler  │
//! │  id → timer task, fires EntryAction         │       │  (owner member)  │
//! └─────────────────────────────────────────────┘       └──────────────────┘
//!                     ▲
//!                     │ cancel lost / schedule gained
//! ┌─────────────────────────────────────────────┐
//! │       SchedulerTopologyCoordinator          │◄── TopologySource
//! │  EntryStore × (old, new) Locality           │    (pre/post rehash)
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Ownership Model
//!
//! - **Forwarding** resolves the owner from the settled hash on every attempt
//! - **Rehash** compares locality under the old and new hash per entry
//! - **Scheduling** is best effort; the next topology event restores it

pub mod command;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod metrics;
pub mod partitioning;
pub mod scheduler;
pub mod store;
pub mod testing;
pub mod topology;
pub mod types;

// Re-export main types for convenience
pub use config::{CoordinatorConfig, MetadataForwarding, RetryConfig, SchedulerConfig};
pub use error::{CodecError, DispatchError, Error, Result};
pub use types::{affinity_fn, key_affinity, Affinity, Identifier, NodeId};

// Re-export scheduler types
pub use scheduler::{
    EntryAction, ExpirationAction, ExpirationMetadata, LocalScheduler, LocalSchedulerBuilder,
    MetadataSource, PrimaryOwnerScheduler, Remover, ScheduleMetadata, ScheduledEntries, Scheduler,
};

// Re-export command and dispatch types
pub use command::{Command, CommandResult};
pub use dispatch::{CommandDispatcher, CommandHandler, InProcessDispatcher};

// Re-export partitioning types
pub use partitioning::{ConsistentHash, CurrentHash, Locality, OwnerLocator};

// Re-export store and topology types
pub use store::{EntryStore, EntryStream, MemoryStore};
pub use topology::{
    RehashHandle, RehashKind, RehashState, SchedulerTopologyCoordinator, TopologyEvent,
    TopologyListener, TopologyNotifier, TopologySource,
};

// Re-export metrics types
pub use metrics::{SchedulerMetrics, SchedulerMetricsSnapshot};
