//! Point-in-time ownership queries.
//!
//! A [`Locality`] answers "is this key primarily owned by me" against a
//! fixed hash snapshot. [`CurrentHash`] holds the latest settled hash and
//! resolves primary owners for forwarding.

use crate::partitioning::hash::ConsistentHash;
use crate::types::NodeId;
use arc_swap::ArcSwap;
use std::sync::Arc;

/// Immutable locality snapshot.
#[derive(Debug, Clone)]
pub enum Locality {
    /// Derived from a consistent hash and the local member.
    Hash {
        hash: Arc<ConsistentHash>,
        local: NodeId,
    },
    /// Same answer for every key (non-clustered caches).
    Fixed(bool),
}

impl Locality {
    /// Locality of `local` under `hash`.
    pub fn of(hash: Arc<ConsistentHash>, local: NodeId) -> Self {
        Locality::Hash { hash, local }
    }

    /// Locality that answers `local` for every key.
    pub fn fixed(local: bool) -> Self {
        Locality::Fixed(local)
    }

    /// Check if `key` is primarily owned by the local member.
    ///
    /// Keys whose segment has no owner are never local.
    pub fn is_local(&self, key: &[u8]) -> bool {
        match self {
            Locality::Hash { hash, local } => hash.primary_owner(key) == Some(*local),
            Locality::Fixed(local) => *local,
        }
    }
}

/// Resolves the member currently responsible for a partition key.
pub trait OwnerLocator: Send + Sync {
    /// Primary owner of the partition containing `key`.
    fn primary_owner(&self, key: &[u8]) -> Option<NodeId>;

    /// All members that may hold scheduled entries.
    fn members(&self) -> Vec<NodeId>;
}

impl OwnerLocator for ConsistentHash {
    fn primary_owner(&self, key: &[u8]) -> Option<NodeId> {
        ConsistentHash::primary_owner(self, key)
    }

    fn members(&self) -> Vec<NodeId> {
        ConsistentHash::members(self).to_vec()
    }
}

/// The latest settled hash, swapped atomically on topology changes.
#[derive(Debug)]
pub struct CurrentHash {
    hash: ArcSwap<ConsistentHash>,
}

impl CurrentHash {
    /// Create holding `hash`.
    pub fn new(hash: ConsistentHash) -> Self {
        Self {
            hash: ArcSwap::from_pointee(hash),
        }
    }

    /// Current hash snapshot.
    pub fn load(&self) -> Arc<ConsistentHash> {
        self.hash.load_full()
    }

    /// Install a new hash, returning the previous one.
    pub fn store(&self, hash: Arc<ConsistentHash>) -> Arc<ConsistentHash> {
        self.hash.swap(hash)
    }

    /// Locality of `local` under the current hash.
    pub fn locality(&self, local: NodeId) -> Locality {
        Locality::of(self.load(), local)
    }
}

impl OwnerLocator for CurrentHash {
    fn primary_owner(&self, key: &[u8]) -> Option<NodeId> {
        self.hash.load().primary_owner(key)
    }

    fn members(&self) -> Vec<NodeId> {
        self.hash.load().members().to_vec()
    }
}
