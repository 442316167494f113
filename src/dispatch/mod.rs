//! Delivering commands to cluster members.
//!
//! The sending side sees a [`CommandDispatcher`]; the receiving side runs a
//! [`CommandHandler`] that decodes each request, executes it against the
//! member's local scheduler and encodes the answer.

mod handler;
mod in_process;

pub use handler::CommandHandler;
pub use in_process::InProcessDispatcher;

use crate::command::{Command, CommandResult};
use crate::error::Result;
use crate::types::NodeId;
use async_trait::async_trait;

/// Executes commands on a specific member.
#[async_trait]
pub trait CommandDispatcher<I, M>: Send + Sync {
    /// Execute `command` on `member` and wait for its result.
    ///
    /// Transport and membership failures surface as
    /// [`DispatchError`](crate::error::DispatchError)s so callers can decide
    /// whether to retry.
    async fn execute_on_member(
        &self,
        command: Command<I, M>,
        member: NodeId,
    ) -> Result<CommandResult<I>>;

    /// Release the dispatcher. Later calls fail.
    async fn close(&self);
}
