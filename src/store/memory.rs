//! Two-tier in-memory entry store.

use crate::error::Result;
use crate::scheduler::{MetadataSource, Remover};
use crate::store::{EntryStore, EntryStream};
use crate::types::Identifier;
use async_trait::async_trait;
use dashmap::DashMap;
use tracing::trace;

/// Entry metadata held in memory, with a passivated tier standing in for a
/// persistent store.
#[derive(Debug)]
pub struct MemoryStore<I: Identifier, M> {
    /// Active entries.
    memory: DashMap<I, M>,

    /// Entries evicted from memory but still present in the store.
    passivated: DashMap<I, M>,
}

impl<I: Identifier, M: Clone + Send + Sync + 'static> MemoryStore<I, M> {
    pub fn new() -> Self {
        Self {
            memory: DashMap::new(),
            passivated: DashMap::new(),
        }
    }

    /// Insert or replace an active entry, returning its previous metadata.
    pub fn insert(&self, id: I, metadata: M) -> Option<M> {
        let passivated = self.passivated.remove(&id).map(|(_, m)| m);
        self.memory.insert(id, metadata).or(passivated)
    }

    /// Metadata of an entry in either tier.
    pub fn get(&self, id: &I) -> Option<M> {
        self.memory
            .get(id)
            .or_else(|| self.passivated.get(id))
            .map(|entry| entry.value().clone())
    }

    /// Apply `f` to an entry's metadata in whichever tier holds it.
    pub fn update<F>(&self, id: &I, f: F) -> bool
    where
        F: FnOnce(&mut M),
    {
        if let Some(mut entry) = self.memory.get_mut(id) {
            f(entry.value_mut());
            return true;
        }
        if let Some(mut entry) = self.passivated.get_mut(id) {
            f(entry.value_mut());
            return true;
        }
        false
    }

    /// Remove an entry from both tiers.
    pub fn remove(&self, id: &I) -> Option<M> {
        let memory = self.memory.remove(id).map(|(_, m)| m);
        let passivated = self.passivated.remove(id).map(|(_, m)| m);
        memory.or(passivated)
    }

    /// Move an entry from memory to the store tier.
    pub fn passivate(&self, id: &I) -> bool {
        match self.memory.remove(id) {
            Some((id, metadata)) => {
                trace!(?id, "Entry passivated");
                self.passivated.insert(id, metadata);
                true
            }
            None => false,
        }
    }

    /// Move an entry from the store tier back to memory.
    pub fn activate(&self, id: &I) -> bool {
        match self.passivated.remove(id) {
            Some((id, metadata)) => {
                trace!(?id, "Entry activated");
                self.memory.insert(id, metadata);
                true
            }
            None => false,
        }
    }

    /// Check if an entry is in the store tier only.
    pub fn is_passivated(&self, id: &I) -> bool {
        self.passivated.contains_key(id)
    }

    /// Check if an entry exists in either tier.
    pub fn contains(&self, id: &I) -> bool {
        self.memory.contains_key(id) || self.passivated.contains_key(id)
    }

    /// Number of entries across both tiers.
    pub fn len(&self) -> usize {
        self.memory.len() + self.passivated.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memory.is_empty() && self.passivated.is_empty()
    }
}

impl<I: Identifier, M: Clone + Send + Sync + 'static> Default for MemoryStore<I, M> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<I, M> EntryStore<I, M> for MemoryStore<I, M>
where
    I: Identifier,
    M: Clone + Send + Sync + 'static,
{
    async fn entries(&self) -> Result<EntryStream<I, M>> {
        // Snapshot so no shard lock outlives this call.
        let entries: Vec<(I, Option<M>)> = self
            .memory
            .iter()
            .chain(self.passivated.iter())
            .map(|entry| (entry.key().clone(), Some(entry.value().clone())))
            .collect();
        Ok(EntryStream::new(entries))
    }
}

#[async_trait]
impl<I, M> MetadataSource<I, M> for MemoryStore<I, M>
where
    I: Identifier,
    M: Clone + Send + Sync + 'static,
{
    async fn metadata(&self, id: &I) -> Option<M> {
        self.get(id)
    }
}

#[async_trait]
impl<I, M> Remover<I> for MemoryStore<I, M>
where
    I: Identifier,
    M: Clone + Send + Sync + 'static,
{
    async fn remove(&self, id: &I) -> Result<bool> {
        Ok(MemoryStore::remove(self, id).is_some())
    }
}
