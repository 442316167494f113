//! Scenario tests for the topology coordinator.
//!
//! These tests drive real coordinators from a shared `TopologyNotifier` and
//! observe the scheduling calls they make:
//! - Ownership handoff between two members during a rehash
//! - No calls for entries whose locality did not change
//! - Last-one-wins scheduling passes
//! - Shutdown behaviour
//! - Stray timers on non-owners are cleared by the next rehash

#[cfg(test)]
mod tests {
    use crate::config::CoordinatorConfig;
    use crate::partitioning::ConsistentHash;
    use crate::scheduler::{ExpirationMetadata, Scheduler};
    use crate::store::{EntryStore, MemoryStore};
    use crate::testing::{init_tracing, wait_for, RecordingScheduler, SchedulerCall};
    use crate::topology::{RehashState, SchedulerTopologyCoordinator, TopologyNotifier, TopologySource};
    use crate::types::{key_affinity, NodeId};
    use std::sync::Arc;
    use std::time::{Duration, SystemTime};

    type Recording = RecordingScheduler<String, ExpirationMetadata>;
    type Store = MemoryStore<String, ExpirationMetadata>;

    const WAIT: Duration = Duration::from_secs(5);
    const POLL: Duration = Duration::from_millis(5);

    fn assignment(owners: &[NodeId]) -> ConsistentHash {
        ConsistentHash::from_assignment(owners.iter().map(|&owner| vec![owner]).collect())
    }

    /// `count` keys that fall into `segment` of a two-segment hash.
    fn keys_in_segment(segment: usize, count: usize) -> Vec<String> {
        let hash = assignment(&[1, 2]);
        let mut keys: Vec<String> = (0..)
            .map(|i| format!("entry-{}", i))
            .filter(|key| hash.segment_of(key.as_bytes()) == segment)
            .take(count)
            .collect();
        keys.sort();
        keys
    }

    fn metadata() -> ExpirationMetadata {
        ExpirationMetadata::new(SystemTime::now(), Some(Duration::from_secs(600)))
    }

    fn store_with(keys: &[String]) -> Arc<Store> {
        let store = Arc::new(Store::new());
        for key in keys {
            store.insert(key.clone(), metadata());
        }
        store
    }

    fn start(
        node: NodeId,
        recording: &Arc<Recording>,
        store: &Arc<Store>,
        notifier: &Arc<TopologyNotifier>,
        config: CoordinatorConfig,
    ) -> SchedulerTopologyCoordinator {
        let scheduler: Arc<dyn Scheduler<String, ExpirationMetadata>> = recording.clone();
        let store: Arc<dyn EntryStore<String, ExpirationMetadata>> = store.clone();
        let source: Arc<dyn TopologySource> = notifier.clone();
        SchedulerTopologyCoordinator::start(
            node,
            scheduler,
            store,
            key_affinity::<String>(),
            source,
            config,
        )
        .unwrap()
    }

    fn sorted(mut ids: Vec<String>) -> Vec<String> {
        ids.sort();
        ids
    }

    /// Test Case 1: Ownership handoff during a rehash
    ///
    /// Node 1 owns both segments, then segment 1 moves to node 2:
    /// - Node 1 cancels every entry of segment 1 on pre-rehash
    /// - Node 2 cancels the entries it does not own before scheduling any
    /// - Node 2 schedules every entry of segment 1 on post-rehash, with metadata
    /// - Passivated entries take part in the handoff
    #[tokio::test]
    async fn test_rehash_hands_off_segment() {
        init_tracing();

        let moving = keys_in_segment(1, 20);
        let staying = keys_in_segment(0, 20);
        let all: Vec<String> = moving.iter().chain(staying.iter()).cloned().collect();

        let notifier = Arc::new(TopologyNotifier::new(assignment(&[1, 1])));
        let store_a = store_with(&all);
        let store_b = store_with(&all);
        store_b.passivate(&moving[0]);

        let a = Arc::new(Recording::new().with_delay(Duration::from_millis(1)));
        let b = Arc::new(Recording::new());
        let coordinator_a = start(1, &a, &store_a, &notifier, CoordinatorConfig::default());
        let coordinator_b = start(2, &b, &store_b, &notifier, CoordinatorConfig::default());

        notifier.rehash(assignment(&[1, 2]));

        assert!(wait_for(|| a.cancelled_ids().len() == moving.len(), WAIT, POLL).await);
        assert!(wait_for(|| b.scheduled_ids().len() == moving.len(), WAIT, POLL).await);

        assert_eq!(sorted(a.cancelled_ids()), moving);
        assert!(a.scheduled_ids().is_empty());

        assert_eq!(sorted(b.scheduled_ids()), moving);
        assert_eq!(sorted(b.cancelled_ids()), staying);

        // The cancellation pass finishes before the scheduling pass starts.
        let calls = b.calls();
        let (cancels, schedules) = calls.split_at(staying.len());
        assert!(cancels
            .iter()
            .all(|call| matches!(call, SchedulerCall::Cancel(_))));
        for call in schedules {
            assert!(
                matches!(call, SchedulerCall::ScheduleWithMetadata(..)),
                "unexpected call {:?}",
                call
            );
        }

        coordinator_a.close().await;
        coordinator_b.close().await;
    }

    /// Test Case 2: Unchanged locality
    ///
    /// Adding a backup owner does not change any primary owner. Owned entries
    /// see no call at all; entries owned elsewhere only get the idempotent
    /// pre-rehash cancel.
    #[tokio::test]
    async fn test_unchanged_locality_schedules_nothing() {
        let first = keys_in_segment(0, 10);
        let second = keys_in_segment(1, 10);
        let keys: Vec<String> = first.iter().chain(second.iter()).cloned().collect();

        let notifier = Arc::new(TopologyNotifier::new(assignment(&[1, 2])));
        let store = store_with(&keys);
        let a = Arc::new(Recording::new());
        let b = Arc::new(Recording::new());
        let coordinator_a = start(1, &a, &store, &notifier, CoordinatorConfig::default());
        let coordinator_b = start(2, &b, &store, &notifier, CoordinatorConfig::default());

        notifier.rehash(ConsistentHash::from_assignment(vec![vec![1, 3], vec![2, 3]]));

        // One cancellation and one scheduling pass per member.
        assert!(
            wait_for(
                || coordinator_a.metrics().rehash_completed.get() == 2
                    && coordinator_b.metrics().rehash_completed.get() == 2,
                WAIT,
                POLL
            )
            .await
        );
        assert!(a.scheduled_ids().is_empty());
        assert!(b.scheduled_ids().is_empty());
        assert_eq!(sorted(a.cancelled_ids()), second);
        assert_eq!(sorted(b.cancelled_ids()), first);
        assert_eq!(a.calls().len(), second.len());
        assert_eq!(b.calls().len(), first.len());

        coordinator_a.close().await;
        coordinator_b.close().await;
    }

    /// Test Case 3: Last-one-wins scheduling passes
    ///
    /// A second topology change arrives while the first scheduling pass is
    /// still iterating. The first pass stops and only the second pass's
    /// entries are scheduled from then on.
    #[tokio::test]
    async fn test_new_event_supersedes_running_pass() {
        init_tracing();

        let first_wave = keys_in_segment(1, 40);
        let second_wave = keys_in_segment(0, 5);
        let all: Vec<String> = first_wave
            .iter()
            .chain(second_wave.iter())
            .cloned()
            .collect();

        let notifier = Arc::new(TopologyNotifier::new(assignment(&[1, 1])));
        let store = store_with(&all);
        let b = Arc::new(Recording::new().with_delay(Duration::from_millis(20)));
        let coordinator = start(2, &b, &store, &notifier, CoordinatorConfig::default());

        // Node 2 gains segment 1.
        notifier.topology_changed(assignment(&[1, 2]));
        assert!(wait_for(|| !b.scheduled_ids().is_empty(), WAIT, POLL).await);
        let first = coordinator.current_task().unwrap();

        // Node 2 swaps segment 1 for segment 0.
        notifier.topology_changed(assignment(&[2, 1]));
        let second = coordinator.current_task().unwrap();
        assert_ne!(first.id(), second.id());
        assert!(first.is_cancelled());

        assert!(
            wait_for(
                || second.state() == RehashState::Completed,
                WAIT,
                POLL
            )
            .await
        );
        assert_eq!(first.state(), RehashState::Cancelled);

        let scheduled = b.scheduled_ids();
        let split = scheduled
            .iter()
            .position(|id| second_wave.contains(id))
            .unwrap();
        let (from_first, from_second) = scheduled.split_at(split);

        assert!(from_first.len() < first_wave.len());
        assert!(from_first.iter().all(|id| first_wave.contains(id)));
        assert_eq!(sorted(from_second.to_vec()), second_wave);
        assert_eq!(coordinator.metrics().rehash_superseded.get(), 1);

        coordinator.close().await;
    }

    /// Test Case 4: No primary segments, no scheduling pass
    #[tokio::test]
    async fn test_node_without_segments_skips_scheduling() {
        let keys = keys_in_segment(0, 5);
        let notifier = Arc::new(TopologyNotifier::new(assignment(&[1, 2])));
        let store = store_with(&keys);
        let c = Arc::new(Recording::new());
        let coordinator = start(3, &c, &store, &notifier, CoordinatorConfig::default());

        notifier.rehash(assignment(&[2, 1]));

        // Only the cancellation pass runs, and it cancels everything.
        assert!(
            wait_for(
                || coordinator.metrics().rehash_completed.get() == 1,
                WAIT,
                POLL
            )
            .await
        );
        assert!(coordinator.current_task().is_none());
        assert_eq!(coordinator.metrics().rehash_submitted.get(), 1);
        assert!(c.scheduled_ids().is_empty());
        assert_eq!(sorted(c.cancelled_ids()), keys);

        coordinator.close().await;
    }

    /// Test Case 5: Close stops the running pass and ignores later events
    #[tokio::test]
    async fn test_close_cancels_work_and_unregisters() {
        let keys = keys_in_segment(1, 50);
        let notifier = Arc::new(TopologyNotifier::new(assignment(&[1, 1])));
        let store = store_with(&keys);
        let b = Arc::new(Recording::new().with_delay(Duration::from_millis(10)));
        let coordinator = start(2, &b, &store, &notifier, CoordinatorConfig::default());
        assert_eq!(notifier.listener_count(), 1);

        notifier.topology_changed(assignment(&[1, 2]));
        assert!(wait_for(|| !b.scheduled_ids().is_empty(), WAIT, POLL).await);
        let task = coordinator.current_task().unwrap();

        coordinator.close().await;
        coordinator.close().await;

        assert!(coordinator.is_closed());
        assert_eq!(notifier.listener_count(), 0);
        assert!(coordinator.current_task().is_none());
        assert_eq!(task.state(), RehashState::Cancelled);

        let calls = b.calls().len();
        assert!(calls < keys.len());
        notifier.topology_changed(assignment(&[2, 2]));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(b.calls().len(), calls);
    }

    /// Test Case 6: Close gives up on a stuck worker after the stop timeout
    #[tokio::test]
    async fn test_close_aborts_stuck_worker() {
        let notifier = Arc::new(TopologyNotifier::new(assignment(&[1, 1])));
        let store = store_with(&keys_in_segment(1, 3));
        let b = Arc::new(Recording::new().with_delay(Duration::from_secs(30)));
        let coordinator = start(
            2,
            &b,
            &store,
            &notifier,
            CoordinatorConfig::default().with_stop_timeout(Duration::from_millis(50)),
        );

        notifier.topology_changed(assignment(&[1, 2]));
        let task = coordinator.current_task().unwrap();
        assert!(wait_for(|| task.state() == RehashState::Running, WAIT, POLL).await);

        let started = tokio::time::Instant::now();
        coordinator.close().await;
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(b.calls().is_empty());
    }

    /// Test Case 7: Entries without metadata are scheduled by identifier
    ///
    /// The pass also closes the store's stream when it is done.
    #[tokio::test]
    async fn test_entries_without_metadata_use_transient_schedule() {
        use crate::store::EntryStream;
        use async_trait::async_trait;
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct KeysOnly {
            keys: Vec<String>,
            closed: Arc<AtomicUsize>,
        }

        #[async_trait]
        impl EntryStore<String, ExpirationMetadata> for KeysOnly {
            async fn entries(&self) -> crate::error::Result<EntryStream<String, ExpirationMetadata>> {
                let closed = Arc::clone(&self.closed);
                Ok(EntryStream::new(
                    self.keys.clone().into_iter().map(|id| (id, None)).collect::<Vec<_>>(),
                )
                .on_close(move || {
                    closed.fetch_add(1, Ordering::SeqCst);
                }))
            }
        }

        let keys = keys_in_segment(1, 3);
        let closed = Arc::new(AtomicUsize::new(0));
        let notifier = Arc::new(TopologyNotifier::new(assignment(&[1, 1])));
        let b = Arc::new(Recording::new());
        let scheduler: Arc<dyn Scheduler<String, ExpirationMetadata>> = b.clone();
        let store: Arc<dyn EntryStore<String, ExpirationMetadata>> = Arc::new(KeysOnly {
            keys: keys.clone(),
            closed: closed.clone(),
        });
        let source: Arc<dyn TopologySource> = notifier.clone();
        let coordinator = SchedulerTopologyCoordinator::start(
            2,
            scheduler,
            store,
            key_affinity::<String>(),
            source,
            CoordinatorConfig::default().with_yield_interval(1),
        )
        .unwrap();

        notifier.topology_changed(assignment(&[1, 2]));
        assert!(wait_for(|| b.calls().len() == keys.len(), WAIT, POLL).await);

        let expected: Vec<SchedulerCall<String, ExpirationMetadata>> =
            keys.iter().cloned().map(SchedulerCall::Schedule).collect();
        assert_eq!(b.calls(), expected);
        assert!(wait_for(|| closed.load(Ordering::SeqCst) == 1, WAIT, POLL).await);

        coordinator.close().await;
    }

    /// Test Case 8: A stray timer on a non-owner is cancelled by the next rehash
    ///
    /// Node 3 owns segment 1 under neither hash, but a forwarded schedule
    /// that raced an ownership change left a timer for one of its entries.
    /// The pre-rehash pass cancels it, so only the owner keeps a timer.
    #[tokio::test]
    async fn test_rehash_cancels_stray_timer_on_non_owner() {
        let stray = keys_in_segment(1, 1);
        let owned = keys_in_segment(0, 2);
        let all: Vec<String> = stray.iter().chain(owned.iter()).cloned().collect();

        let notifier = Arc::new(TopologyNotifier::new(assignment(&[1, 2])));
        let store = store_with(&all);
        let c = Arc::new(Recording::new());
        c.schedule(stray[0].clone()).await.unwrap();
        c.clear();
        let coordinator = start(3, &c, &store, &notifier, CoordinatorConfig::default());

        notifier.rehash(assignment(&[3, 1]));

        assert!(
            wait_for(
                || coordinator.metrics().rehash_completed.get() == 2,
                WAIT,
                POLL
            )
            .await
        );
        assert_eq!(c.cancelled_ids(), stray);
        assert!(!c.contains(&stray[0]).await.unwrap());
        assert_eq!(sorted(c.scheduled_ids()), owned);

        coordinator.close().await;
    }
}
