//! Dispatcher connecting members that share a process.
//!
//! Commands still go through the wire codec, so an in-process cluster
//! exercises the same encode/execute/decode path as a networked one.

use crate::command::{decode_result, encode_command, Command, CommandResult};
use crate::dispatch::{CommandDispatcher, CommandHandler};
use crate::error::{DispatchError, Error, Result};
use crate::scheduler::ScheduleMetadata;
use crate::types::{Identifier, NodeId};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// Routes encoded commands to registered member handlers.
pub struct InProcessDispatcher<I, M> {
    members: DashMap<NodeId, Arc<CommandHandler<I, M>>>,
    closed: AtomicBool,
}

impl<I, M> Default for InProcessDispatcher<I, M> {
    fn default() -> Self {
        Self {
            members: DashMap::new(),
            closed: AtomicBool::new(false),
        }
    }
}

impl<I, M> InProcessDispatcher<I, M>
where
    I: Identifier + Serialize + DeserializeOwned,
    M: ScheduleMetadata + Serialize + DeserializeOwned,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `member` reachable through `handler`.
    pub fn register(&self, member: NodeId, handler: Arc<CommandHandler<I, M>>) {
        self.members.insert(member, handler);
    }

    /// Make `member` unreachable (e.g. it crashed).
    pub fn unregister(&self, member: NodeId) -> bool {
        self.members.remove(&member).is_some()
    }

    /// Registered members.
    pub fn members(&self) -> Vec<NodeId> {
        let mut members: Vec<NodeId> = self.members.iter().map(|e| *e.key()).collect();
        members.sort_unstable();
        members
    }
}

#[async_trait]
impl<I, M> CommandDispatcher<I, M> for InProcessDispatcher<I, M>
where
    I: Identifier + Serialize + DeserializeOwned,
    M: ScheduleMetadata + Serialize + DeserializeOwned,
{
    async fn execute_on_member(
        &self,
        command: Command<I, M>,
        member: NodeId,
    ) -> Result<CommandResult<I>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }

        let handler = self
            .members
            .get(&member)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(DispatchError::MemberUnavailable(member))?;

        trace!(member, command = command.kind(), "Dispatching command");
        let request = encode_command(&command)?;
        let response = handler
            .handle(&request)
            .await
            .map_err(|e| DispatchError::Remote(e.to_string()))?;

        Ok(decode_result(&response)?)
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!(members = self.members.len(), "In-process dispatcher closed");
        }
    }
}
