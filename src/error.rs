//! Error types for the entry scheduler.

use crate::types::NodeId;
use thiserror::Error;

/// Result type alias for scheduler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the entry scheduler.
#[derive(Error, Debug)]
pub enum Error {
    /// Command dispatch errors.
    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// Command encoding/decoding errors.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The scheduler has been closed.
    #[error("scheduler closed")]
    Closed,

    /// The operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// `schedule(id)` was called but no metadata source is configured.
    #[error("no metadata source configured")]
    MetadataUnavailable,

    /// A scheduler was built outside of a tokio runtime.
    #[error("no tokio runtime available")]
    NoRuntime,

    /// A command produced a result of the wrong kind.
    #[error("unexpected command result: expected {expected}, got {actual}")]
    UnexpectedResult {
        expected: &'static str,
        actual: &'static str,
    },
}

impl Error {
    /// Whether retrying the same operation may succeed.
    ///
    /// Transient failures are the ones seen while a member is moving during
    /// failover: the owner is gone, unknown, or the transport dropped.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Dispatch(e) => e.is_transient(),
            Error::Timeout => true,
            _ => false,
        }
    }
}

/// Errors raised while routing a command to a cluster member.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// The target member is not (or no longer) reachable.
    #[error("member unavailable: {0}")]
    MemberUnavailable(NodeId),

    /// The current hash has no primary owner for the key.
    #[error("no primary owner for key")]
    NoPrimaryOwner,

    /// The transport failed before a response arrived.
    #[error("transport failed: {0}")]
    Transport(String),

    /// The member refused the command.
    #[error("member {member} rejected command: {reason}")]
    Rejected { member: NodeId, reason: String },

    /// The command failed while executing on the remote member.
    #[error("remote error: {0}")]
    Remote(String),
}

impl DispatchError {
    /// Whether the failure is expected to clear once topology settles.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DispatchError::MemberUnavailable(_)
                | DispatchError::NoPrimaryOwner
                | DispatchError::Transport(_)
        )
    }
}

/// Command wire-format errors.
#[derive(Error, Debug)]
pub enum CodecError {
    /// The protobuf envelope was malformed or truncated.
    #[error("wire error: {0}")]
    Wire(String),

    /// The command kind is not known to this version.
    #[error("unknown command kind: {0}")]
    UnknownCommand(u64),

    /// The result kind is not known to this version.
    #[error("unknown result kind: {0}")]
    UnknownResult(u64),

    /// A required field was absent.
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// Identifier or metadata payload could not be (de)serialized.
    #[error("payload error: {0}")]
    Payload(String),
}

impl From<bincode::Error> for CodecError {
    fn from(e: bincode::Error) -> Self {
        CodecError::Payload(e.to_string())
    }
}

impl From<protobuf::ProtobufError> for CodecError {
    fn from(e: protobuf::ProtobufError) -> Self {
        CodecError::Wire(e.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Codec(e.into())
    }
}
