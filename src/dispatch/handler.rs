//! Receiving side of command dispatch.

use crate::command::{decode_command, encode_result, Command};
use crate::error::Result;
use crate::scheduler::{ScheduleMetadata, Scheduler};
use crate::types::{Identifier, NodeId};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, trace};

/// Runs incoming commands against a member's local scheduler.
pub struct CommandHandler<I, M> {
    /// This member's ID.
    node_id: NodeId,

    /// Scheduler commands execute against.
    scheduler: Arc<dyn Scheduler<I, M>>,
}

impl<I, M> CommandHandler<I, M>
where
    I: Identifier + Serialize + DeserializeOwned,
    M: ScheduleMetadata + Serialize + DeserializeOwned,
{
    /// Create a handler for `node_id`.
    pub fn new(node_id: NodeId, scheduler: Arc<dyn Scheduler<I, M>>) -> Self {
        Self { node_id, scheduler }
    }

    /// This member's ID.
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Decode a request, execute it and encode the result.
    pub async fn handle(&self, request: &[u8]) -> Result<Bytes> {
        let command: Command<I, M> = decode_command(request)?;
        trace!(node_id = self.node_id, command = command.kind(), "Handling command");

        let result = match command.execute(self.scheduler.as_ref()).await {
            Ok(result) => result,
            Err(e) => {
                debug!(node_id = self.node_id, error = %e, "Command failed");
                return Err(e);
            }
        };

        Ok(encode_result(&result)?)
    }
}
