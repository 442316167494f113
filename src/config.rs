//! Configuration types for the entry scheduler.

use crate::types::NodeId;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration for a node's scheduling stack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Identifier of this node.
    pub node_id: NodeId,

    /// Retry policy for forwarded commands.
    pub retry: RetryConfig,

    /// Whether forwarded schedules carry their metadata.
    pub forwarding: MetadataForwarding,

    /// How long a forwarded cancel keeps retrying before giving up.
    pub cancel_timeout: Duration,

    /// Topology coordinator configuration.
    pub coordinator: CoordinatorConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            node_id: 1,
            retry: RetryConfig::default(),
            forwarding: MetadataForwarding::default(),
            cancel_timeout: Duration::from_secs(30),
            coordinator: CoordinatorConfig::default(),
        }
    }
}

impl SchedulerConfig {
    /// Create a configuration for the given node.
    pub fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            ..Default::default()
        }
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set the metadata forwarding policy.
    pub fn with_forwarding(mut self, forwarding: MetadataForwarding) -> Self {
        self.forwarding = forwarding;
        self
    }

    /// Set the forwarded cancel timeout.
    pub fn with_cancel_timeout(mut self, timeout: Duration) -> Self {
        self.cancel_timeout = timeout;
        self
    }

    /// Set the coordinator configuration.
    pub fn with_coordinator(mut self, coordinator: CoordinatorConfig) -> Self {
        self.coordinator = coordinator;
        self
    }
}

/// Backoff schedule for forwarded commands.
///
/// Each entry is the delay before one attempt, so the number of attempts is
/// `delays.len()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Delay before each attempt.
    pub delays: Vec<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            delays: vec![
                Duration::ZERO,
                Duration::from_millis(10),
                Duration::from_millis(100),
            ],
        }
    }
}

impl RetryConfig {
    /// Create a policy from explicit delays.
    pub fn with_delays(delays: Vec<Duration>) -> Self {
        Self { delays }
    }

    /// A single immediate attempt.
    pub fn no_retry() -> Self {
        Self {
            delays: vec![Duration::ZERO],
        }
    }

    /// Number of attempts.
    pub fn attempts(&self) -> usize {
        self.delays.len().max(1)
    }

    /// Delay before the given attempt (0-based). Past the end, the last delay
    /// repeats.
    pub fn delay(&self, attempt: usize) -> Duration {
        self.delays
            .get(attempt)
            .or_else(|| self.delays.last())
            .copied()
            .unwrap_or(Duration::ZERO)
    }
}

/// Policy for forwarding metadata with remote schedule commands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetadataForwarding {
    /// Send only the identifier; the owner reads metadata from its own store.
    #[default]
    Transient,
    /// Marshal the metadata along with the identifier.
    WithMetadata,
}

/// Topology coordinator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Upper bound on waiting for the worker during close.
    pub stop_timeout: Duration,

    /// The worker yields to the runtime after this many entries.
    pub yield_interval: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            stop_timeout: Duration::from_secs(30),
            yield_interval: 128,
        }
    }
}

impl CoordinatorConfig {
    /// Set the stop timeout.
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Set the yield interval.
    pub fn with_yield_interval(mut self, interval: usize) -> Self {
        self.yield_interval = interval.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_retry_policy() {
        let retry = RetryConfig::default();
        assert_eq!(retry.attempts(), 3);
        assert_eq!(retry.delay(0), Duration::ZERO);
        assert_eq!(retry.delay(1), Duration::from_millis(10));
        assert_eq!(retry.delay(2), Duration::from_millis(100));
        // Past the end the last delay repeats.
        assert_eq!(retry.delay(7), Duration::from_millis(100));
    }

    #[test]
    fn test_empty_retry_policy_still_attempts_once() {
        let retry = RetryConfig::with_delays(Vec::new());
        assert_eq!(retry.attempts(), 1);
        assert_eq!(retry.delay(0), Duration::ZERO);
    }

    #[test]
    fn test_config_builders() {
        let config = SchedulerConfig::new(4)
            .with_retry(RetryConfig::no_retry())
            .with_forwarding(MetadataForwarding::WithMetadata)
            .with_cancel_timeout(Duration::from_secs(2))
            .with_coordinator(
                CoordinatorConfig::default()
                    .with_stop_timeout(Duration::from_secs(1))
                    .with_yield_interval(0),
            );

        assert_eq!(config.node_id, 4);
        assert_eq!(config.retry.attempts(), 1);
        assert_eq!(config.forwarding, MetadataForwarding::WithMetadata);
        assert_eq!(config.cancel_timeout, Duration::from_secs(2));
        assert_eq!(config.coordinator.stop_timeout, Duration::from_secs(1));
        assert_eq!(config.coordinator.yield_interval, 1);
    }

    #[test]
    fn test_default_forwarding_is_transient() {
        assert_eq!(SchedulerConfig::default().forwarding, MetadataForwarding::Transient);
    }
}
