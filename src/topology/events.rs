//! Topology change events.

use crate::partitioning::{ConsistentHash, CurrentHash};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// A change in key-to-owner assignment.
#[derive(Debug, Clone)]
pub enum TopologyEvent {
    /// A rehash is about to start. Data still lives under `old`.
    PreRehash {
        /// Hash before the rehash.
        old: Arc<ConsistentHash>,
        /// Hash the rehash moves to.
        new: Arc<ConsistentHash>,
    },

    /// A rehash finished; `new` is now in effect.
    PostRehash {
        /// Hash before the rehash.
        old: Arc<ConsistentHash>,
        /// Hash now in effect.
        new: Arc<ConsistentHash>,
    },

    /// Membership changed without moving data.
    TopologyChanged {
        /// Hash before the change.
        start: Arc<ConsistentHash>,
        /// Hash after the change.
        end: Arc<ConsistentHash>,
    },
}

impl TopologyEvent {
    /// Short name of the event, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            TopologyEvent::PreRehash { .. } => "pre_rehash",
            TopologyEvent::PostRehash { .. } => "post_rehash",
            TopologyEvent::TopologyChanged { .. } => "topology_changed",
        }
    }

    /// The (before, after) hashes of the event.
    pub fn hashes(&self) -> (&Arc<ConsistentHash>, &Arc<ConsistentHash>) {
        match self {
            TopologyEvent::PreRehash { old, new } | TopologyEvent::PostRehash { old, new } => {
                (old, new)
            }
            TopologyEvent::TopologyChanged { start, end } => (start, end),
        }
    }
}

/// Receives topology events.
///
/// Called synchronously on the publishing thread; implementations must not
/// block.
pub trait TopologyListener: Send + Sync + 'static {
    fn on_event(&self, event: &TopologyEvent);
}

/// Handle returned by [`TopologySource::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Something that publishes topology events.
pub trait TopologySource: Send + Sync {
    /// Start delivering events to `listener`.
    fn register(&self, listener: Arc<dyn TopologyListener>) -> ListenerId;

    /// Stop delivering events to a listener. Returns whether it was registered.
    fn unregister(&self, id: ListenerId) -> bool;
}

/// In-memory topology source that also tracks the settled hash.
///
/// Listeners are invoked outside the registry lock, so a listener may
/// unregister itself while handling an event.
pub struct TopologyNotifier {
    current: Arc<CurrentHash>,
    listeners: RwLock<Vec<(ListenerId, Arc<dyn TopologyListener>)>>,
    next_id: AtomicU64,
}

impl TopologyNotifier {
    /// Create a notifier whose settled hash is `initial`.
    pub fn new(initial: ConsistentHash) -> Self {
        Self {
            current: Arc::new(CurrentHash::new(initial)),
            listeners: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// The settled hash, shared with owner lookups.
    pub fn current_hash(&self) -> Arc<CurrentHash> {
        Arc::clone(&self.current)
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Deliver `event` to every listener.
    pub fn publish(&self, event: &TopologyEvent) {
        let listeners: Vec<Arc<dyn TopologyListener>> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        debug!(
            event = event.kind(),
            listeners = listeners.len(),
            "Publishing topology event"
        );
        for listener in listeners {
            listener.on_event(event);
        }
    }

    /// Move to `new` through a rehash: pre-rehash, install, post-rehash.
    pub fn rehash(&self, new: ConsistentHash) {
        let old = self.current.load();
        let new = Arc::new(new);
        info!(
            old_members = ?old.members(),
            new_members = ?new.members(),
            "Rehash started"
        );

        self.publish(&TopologyEvent::PreRehash {
            old: Arc::clone(&old),
            new: Arc::clone(&new),
        });
        self.current.store(Arc::clone(&new));
        self.publish(&TopologyEvent::PostRehash { old, new });
    }

    /// Move to `end` without a rehash.
    pub fn topology_changed(&self, end: ConsistentHash) {
        let end = Arc::new(end);
        let start = self.current.store(Arc::clone(&end));
        info!(members = ?end.members(), "Topology changed");
        self.publish(&TopologyEvent::TopologyChanged { start, end });
    }
}

impl TopologySource for TopologyNotifier {
    fn register(&self, listener: Arc<dyn TopologyListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, listener));
        id
    }

    fn unregister(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(registered, _)| *registered != id);
        listeners.len() != before
    }
}

impl std::fmt::Debug for TopologyNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopologyNotifier")
            .field("current", &self.current.load())
            .field("listeners", &self.listener_count())
            .finish()
    }
}
