//! Partitioning: which member owns which key.
//!
//! Keys are hashed into a fixed number of segments; each segment has an
//! ordered owner list whose head is the primary owner. Scheduling only ever
//! asks one question of it: is this key primarily owned by me?
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ConsistentHash                         │
//! │   segment:  0      1      2      3      4   ...   N-1       │
//! │   owners:  [1,2]  [2,3]  [3,1]  [1,3]  [2,1]     [3,2]      │
//! │                                                             │
//! │   "session-42" → xxhash → segment 3 → primary 1             │
//! └─────────────────────────────────────────────────────────────┘
//!              │                               │
//!              ▼                               ▼
//!   Locality(hash, self)              CurrentHash (ArcSwap)
//!   is_local(key) during rehash       primary_owner(key) for forwarding
//! ```
//!
//! # Example
//!
//! ```rust
//! use crema_scheduler::partitioning::{ConsistentHash, Locality};
//! use std::sync::Arc;
//!
//! let hash = Arc::new(ConsistentHash::new(&[1, 2, 3], 64, 2));
//! let locality = Locality::of(hash.clone(), 1);
//!
//! if locality.is_local(b"session-42") {
//!     assert_eq!(hash.primary_owner(b"session-42"), Some(1));
//! }
//! ```

mod hash;
mod locality;

pub use hash::{ConsistentHash, DEFAULT_SEGMENTS, DEFAULT_VNODES_PER_NODE};
pub use locality::{CurrentHash, Locality, OwnerLocator};
