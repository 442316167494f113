//! Expiration as a scheduled action.
//!
//! The timer for an entry fires at `last_accessed + timeout`. By then the
//! entry may have been touched again on another path, so the action re-reads
//! the metadata and only removes entries that are still expired.

use crate::error::Result;
use crate::scheduler::{EntryAction, MetadataSource, ScheduleMetadata};
use crate::types::Identifier;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, trace, warn};

/// Expiration metadata of a cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpirationMetadata {
    /// Last time the entry was accessed.
    pub last_accessed: SystemTime,

    /// Idle timeout. `None` means the entry never expires.
    pub timeout: Option<Duration>,
}

impl ExpirationMetadata {
    pub fn new(last_accessed: SystemTime, timeout: Option<Duration>) -> Self {
        Self {
            last_accessed,
            timeout,
        }
    }

    /// Metadata of an entry that never expires.
    pub fn immortal(last_accessed: SystemTime) -> Self {
        Self::new(last_accessed, None)
    }

    /// Record an access at `now`.
    pub fn touch(&mut self, now: SystemTime) {
        self.last_accessed = now;
    }

    /// Check if the entry is expired at `now`.
    pub fn is_expired(&self, now: SystemTime) -> bool {
        self.deadline().is_some_and(|deadline| deadline <= now)
    }
}

impl ScheduleMetadata for ExpirationMetadata {
    fn basis(&self) -> SystemTime {
        self.last_accessed
    }

    fn duration(&self) -> Duration {
        self.timeout.unwrap_or(Duration::MAX)
    }

    fn skip(&self) -> bool {
        self.timeout.is_none()
    }
}

/// Removes an expired entry from the cache.
#[async_trait]
pub trait Remover<I>: Send + Sync {
    /// Remove `id`. Returns whether an entry was removed.
    async fn remove(&self, id: &I) -> Result<bool>;
}

/// [`EntryAction`] that removes entries whose deadline has passed.
pub struct ExpirationAction<I, M> {
    metadata: Arc<dyn MetadataSource<I, M>>,
    remover: Arc<dyn Remover<I>>,
    _marker: PhantomData<fn() -> M>,
}

impl<I, M> ExpirationAction<I, M> {
    pub fn new(metadata: Arc<dyn MetadataSource<I, M>>, remover: Arc<dyn Remover<I>>) -> Self {
        Self {
            metadata,
            remover,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<I, M> EntryAction<I> for ExpirationAction<I, M>
where
    I: Identifier,
    M: ScheduleMetadata,
{
    async fn execute(&self, id: I) {
        let Some(metadata) = self.metadata.metadata(&id).await else {
            trace!(?id, "Entry already gone");
            return;
        };

        let expired = metadata
            .deadline()
            .is_some_and(|deadline| deadline <= SystemTime::now());
        if !expired {
            // Touched since the timer was installed; a later schedule covers it.
            trace!(?id, "Entry no longer expired");
            return;
        }

        match self.remover.remove(&id).await {
            Ok(true) => debug!(?id, "Expired entry removed"),
            Ok(false) => trace!(?id, "Expired entry removed concurrently"),
            Err(e) => warn!(?id, error = %e, "Failed to remove expired entry"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    #[derive(Default)]
    struct Entries {
        metadata: Mutex<HashMap<String, ExpirationMetadata>>,
        removed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MetadataSource<String, ExpirationMetadata> for Entries {
        async fn metadata(&self, id: &String) -> Option<ExpirationMetadata> {
            self.metadata.lock().get(id).cloned()
        }
    }

    #[async_trait]
    impl Remover<String> for Entries {
        async fn remove(&self, id: &String) -> Result<bool> {
            let removed = self.metadata.lock().remove(id).is_some();
            if removed {
                self.removed.lock().push(id.clone());
            }
            Ok(removed)
        }
    }

    fn action(entries: &Arc<Entries>) -> ExpirationAction<String, ExpirationMetadata> {
        ExpirationAction::new(entries.clone(), entries.clone())
    }

    #[test]
    fn test_expiration_metadata_deadline() {
        let accessed = SystemTime::UNIX_EPOCH + Duration::from_secs(100);
        let metadata = ExpirationMetadata::new(accessed, Some(Duration::from_secs(30)));

        assert_eq!(metadata.deadline(), Some(accessed + Duration::from_secs(30)));
        assert!(!metadata.is_expired(accessed + Duration::from_secs(29)));
        assert!(metadata.is_expired(accessed + Duration::from_secs(30)));

        let immortal = ExpirationMetadata::immortal(accessed);
        assert!(immortal.skip());
        assert_eq!(immortal.deadline(), None);
        assert!(!immortal.is_expired(SystemTime::now()));
    }

    #[tokio::test]
    async fn test_removes_expired_entry() {
        let entries = Arc::new(Entries::default());
        entries.metadata.lock().insert(
            "a".into(),
            ExpirationMetadata::new(
                SystemTime::now() - Duration::from_secs(10),
                Some(Duration::from_secs(1)),
            ),
        );

        action(&entries).execute("a".into()).await;

        assert_eq!(entries.removed.lock().as_slice(), &["a".to_string()]);
    }

    #[tokio::test]
    async fn test_keeps_touched_entry() {
        let entries = Arc::new(Entries::default());
        let mut metadata = ExpirationMetadata::new(
            SystemTime::now() - Duration::from_secs(10),
            Some(Duration::from_secs(5)),
        );
        metadata.touch(SystemTime::now());
        entries.metadata.lock().insert("a".into(), metadata);

        action(&entries).execute("a".into()).await;

        assert!(entries.removed.lock().is_empty());
        assert!(entries.metadata.lock().contains_key("a"));
    }

    #[tokio::test]
    async fn test_missing_entry_is_ignored() {
        let entries = Arc::new(Entries::default());
        action(&entries).execute("gone".into()).await;
        assert!(entries.removed.lock().is_empty());
    }
}
