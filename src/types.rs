//! Core types used throughout the scheduler.

use bytes::Bytes;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

/// Node identifier in the cluster.
pub type NodeId = u64;

/// Bound satisfied by every entry identifier the scheduler can track.
///
/// Blanket-implemented, so any `Clone + Eq + Hash + Debug` type that can
/// cross threads qualifies (session ids, `Bytes`, `u64`, `Uuid`, ...).
pub trait Identifier: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

impl<T> Identifier for T where T: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

/// Maps an entry identifier to the key used to locate its partition.
///
/// Entries that must live together (e.g. a session and its attributes) map
/// to the same partition key.
pub type Affinity<I> = Arc<dyn Fn(&I) -> Bytes + Send + Sync>;

/// Affinity that uses the identifier's own bytes as the partition key.
pub fn key_affinity<I>() -> Affinity<I>
where
    I: AsRef<[u8]> + 'static,
{
    Arc::new(|id: &I| Bytes::copy_from_slice(id.as_ref()))
}

/// Affinity built from an arbitrary mapping function.
pub fn affinity_fn<I, F>(f: F) -> Affinity<I>
where
    F: Fn(&I) -> Bytes + Send + Sync + 'static,
{
    Arc::new(f)
}
