//! Dispatcher double that fails a configurable number of times.

use crate::command::{Command, CommandResult};
use crate::dispatch::CommandDispatcher;
use crate::error::{DispatchError, Result};
use crate::types::NodeId;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Wraps a dispatcher and fails its first `failures` calls.
///
/// Failures are [`DispatchError::MemberUnavailable`] (transient) unless
/// built with [`rejecting`](Self::rejecting).
pub struct FlakyDispatcher<I, M> {
    inner: Arc<dyn CommandDispatcher<I, M>>,
    remaining: AtomicUsize,
    attempts: AtomicUsize,
    terminal: bool,
}

impl<I, M> FlakyDispatcher<I, M> {
    pub fn new(inner: Arc<dyn CommandDispatcher<I, M>>, failures: usize) -> Self {
        Self {
            inner,
            remaining: AtomicUsize::new(failures),
            attempts: AtomicUsize::new(0),
            terminal: false,
        }
    }

    /// Fail with a non-retryable rejection instead.
    pub fn rejecting(inner: Arc<dyn CommandDispatcher<I, M>>, failures: usize) -> Self {
        Self {
            terminal: true,
            ..Self::new(inner, failures)
        }
    }

    /// Number of dispatch attempts seen, failed or not.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Stop failing.
    pub fn heal(&self) {
        self.remaining.store(0, Ordering::SeqCst);
    }
}

#[async_trait]
impl<I, M> CommandDispatcher<I, M> for FlakyDispatcher<I, M>
where
    I: Send + 'static,
    M: Send + 'static,
{
    async fn execute_on_member(
        &self,
        command: Command<I, M>,
        member: NodeId,
    ) -> Result<CommandResult<I>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let failing = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            let error = if self.terminal {
                DispatchError::Rejected {
                    member,
                    reason: "injected".to_string(),
                }
            } else {
                DispatchError::MemberUnavailable(member)
            };
            return Err(error.into());
        }

        self.inner.execute_on_member(command, member).await
    }

    async fn close(&self) {
        self.inner.close().await;
    }
}
