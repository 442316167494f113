//! Access to the cache entries a node holds.
//!
//! The topology coordinator walks every entry on a rehash, including entries
//! passivated to the store tier, to decide which ones to schedule or cancel.

mod memory;

pub use memory::MemoryStore;

use crate::error::Result;
use async_trait::async_trait;

/// Iterates the entries held by a node.
#[async_trait]
pub trait EntryStore<I, M>: Send + Sync {
    /// Stream every entry from both the memory and the store tier.
    ///
    /// Entries the store has no metadata for come with `None`; the caller
    /// schedules those by identifier alone.
    async fn entries(&self) -> Result<EntryStream<I, M>>;
}

/// Single-pass stream over a node's entries.
///
/// A store that holds resources open for the iteration (a cursor, a read
/// snapshot) registers an [`on_close`](Self::on_close) hook. The hook runs
/// exactly once, on [`close`](Self::close) or when the stream is dropped.
pub struct EntryStream<I, M> {
    inner: Box<dyn Iterator<Item = (I, Option<M>)> + Send>,
    on_close: Option<Box<dyn FnOnce() + Send>>,
}

impl<I, M> EntryStream<I, M> {
    pub fn new<T>(entries: T) -> Self
    where
        T: IntoIterator<Item = (I, Option<M>)>,
        T::IntoIter: Send + 'static,
    {
        Self {
            inner: Box::new(entries.into_iter()),
            on_close: None,
        }
    }

    /// Run `hook` when the stream is closed or dropped.
    pub fn on_close<F>(mut self, hook: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_close = Some(Box::new(hook));
        self
    }

    /// A stream with no entries.
    pub fn empty() -> Self
    where
        I: Send + 'static,
        M: Send + 'static,
    {
        Self::new(std::iter::empty())
    }

    /// End the iteration and release the store's resources.
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(hook) = self.on_close.take() {
            hook();
        }
    }
}

impl<I, M> Drop for EntryStream<I, M> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<I, M> Iterator for EntryStream<I, M> {
    type Item = (I, Option<M>);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

impl<I, M> std::fmt::Debug for EntryStream<I, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryStream")
            .field("open", &self.on_close.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counted(entries: Vec<(u64, Option<u64>)>) -> (EntryStream<u64, u64>, Arc<AtomicUsize>) {
        let closed = Arc::new(AtomicUsize::new(0));
        let counter = closed.clone();
        let stream = EntryStream::new(entries).on_close(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (stream, closed)
    }

    #[test]
    fn test_close_runs_hook_once() {
        let (mut stream, closed) = counted(vec![(1, Some(10)), (2, None)]);
        assert_eq!(stream.next(), Some((1, Some(10))));
        assert_eq!(closed.load(Ordering::SeqCst), 0);

        stream.close();
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_runs_hook() {
        let (stream, closed) = counted(vec![(1, None)]);
        let collected: Vec<_> = stream.collect();
        assert_eq!(collected, vec![(1, None)]);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_empty_stream_without_hook() {
        let mut stream = EntryStream::<u64, u64>::empty();
        assert!(stream.next().is_none());
        stream.close();
    }
}
