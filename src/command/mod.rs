//! Scheduler commands exchanged between members.
//!
//! A command is built at the call site, encoded, executed exactly once
//! against the receiving member's local scheduler, and answered with a
//! [`CommandResult`].

pub mod codec;

pub use codec::{decode_command, decode_result, encode_command, encode_result};

use crate::error::{Error, Result};
use crate::scheduler::Scheduler;
use crate::types::Identifier;

/// A scheduling operation to run on a specific member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<I, M> {
    /// Schedule with metadata marshalled by the sender.
    ScheduleWithMetadata {
        /// Entry identifier.
        id: I,
        /// Metadata the target instant is derived from.
        metadata: M,
    },

    /// Schedule; the receiver reads metadata from its own store.
    ScheduleTransient {
        /// Entry identifier.
        id: I,
    },

    /// Cancel any timer for the entry.
    Cancel {
        /// Entry identifier.
        id: I,
    },

    /// Ask whether a timer is installed for the entry.
    Contains {
        /// Entry identifier.
        id: I,
    },

    /// List the receiver's scheduled identifiers.
    ListEntries,
}

impl<I, M> Command<I, M> {
    /// Short name of the command, used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Command::ScheduleWithMetadata { .. } => "schedule_with_metadata",
            Command::ScheduleTransient { .. } => "schedule_transient",
            Command::Cancel { .. } => "cancel",
            Command::Contains { .. } => "contains",
            Command::ListEntries => "list_entries",
        }
    }

    /// Identifier the command targets, if any.
    pub fn id(&self) -> Option<&I> {
        match self {
            Command::ScheduleWithMetadata { id, .. }
            | Command::ScheduleTransient { id }
            | Command::Cancel { id }
            | Command::Contains { id } => Some(id),
            Command::ListEntries => None,
        }
    }
}

impl<I, M> Command<I, M>
where
    I: Identifier,
    M: Send + 'static,
{
    /// Run the command against `scheduler`.
    pub async fn execute(self, scheduler: &dyn Scheduler<I, M>) -> Result<CommandResult<I>> {
        match self {
            Command::ScheduleWithMetadata { id, metadata } => {
                scheduler.schedule_with_metadata(id, metadata).await?;
                Ok(CommandResult::Void)
            }
            Command::ScheduleTransient { id } => {
                scheduler.schedule(id).await?;
                Ok(CommandResult::Void)
            }
            Command::Cancel { id } => {
                scheduler.cancel(&id).await?;
                Ok(CommandResult::Void)
            }
            Command::Contains { id } => scheduler.contains(&id).await.map(CommandResult::Bool),
            Command::ListEntries => {
                let entries = scheduler.entries().await?;
                Ok(CommandResult::Entries(entries.to_vec()))
            }
        }
    }
}

/// Result of executing a [`Command`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult<I> {
    /// No value (schedule, cancel).
    Void,
    /// Answer to `Contains`.
    Bool(bool),
    /// Answer to `ListEntries`.
    Entries(Vec<I>),
}

impl<I> CommandResult<I> {
    pub fn kind(&self) -> &'static str {
        match self {
            CommandResult::Void => "void",
            CommandResult::Bool(_) => "bool",
            CommandResult::Entries(_) => "entries",
        }
    }

    pub fn into_unit(self) -> Result<()> {
        match self {
            CommandResult::Void => Ok(()),
            other => Err(other.unexpected("void")),
        }
    }

    pub fn into_bool(self) -> Result<bool> {
        match self {
            CommandResult::Bool(value) => Ok(value),
            other => Err(other.unexpected("bool")),
        }
    }

    pub fn into_entries(self) -> Result<Vec<I>> {
        match self {
            CommandResult::Entries(entries) => Ok(entries),
            other => Err(other.unexpected("entries")),
        }
    }

    fn unexpected(&self, expected: &'static str) -> Error {
        Error::UnexpectedResult {
            expected,
            actual: self.kind(),
        }
    }
}
