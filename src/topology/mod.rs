//! Topology events and the coordinator that reacts to them.
//!
//! ```text
//! ┌────────────────────┐  PreRehash / PostRehash / TopologyChanged
//! │  TopologySource    │─────────────────────────────┐
//! │ (TopologyNotifier) │                             ▼
//! └────────────────────┘               ┌──────────────────────────────┐
//!                                      │ SchedulerTopologyCoordinator │
//!                                      │  on_event: submit only       │
//!                                      └──────────────┬───────────────┘
//!                                                     │ mpsc (FIFO)
//!                                                     ▼
//!                                      ┌──────────────────────────────┐
//!                                      │ worker: one RehashTask at a  │
//!                                      │ time, EntryStore → Scheduler │
//!                                      └──────────────────────────────┘
//! ```

mod coordinator;
mod events;

pub use coordinator::{RehashHandle, RehashKind, RehashState, SchedulerTopologyCoordinator};
pub use events::{ListenerId, TopologyEvent, TopologyListener, TopologyNotifier, TopologySource};
