//! Procedure layer errors

use pscore_l3::{DecodeError, EncodeError};
use thiserror::Error;

use crate::procedure::ProcId;

/// Errors raised while dispatching messages to procedures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcedureError {
    /// Message valid on the wire but not expected in the current state
    #[error("Unexpected message {message} ({context})")]
    UnexpectedMessage {
        /// Message name
        message: String,
        /// What the session was doing
        context: String,
    },

    /// Peer behaviour inconsistent with protocol rules
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Inbound message could not be decoded
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Outbound message does not fit its descriptor
    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),

    /// Another procedure holds exclusive ownership of the stack
    #[error("Procedure stack is held by {owner}")]
    StackBusy {
        /// Procedure holding the stack
        owner: ProcId,
    },

    /// No procedure with this id is on the stack
    #[error("No such procedure: {0}")]
    NoSuchProcedure(ProcId),

    /// An injected collaborator failed
    #[error("Provider error: {0}")]
    Provider(String),
}

impl ProcedureError {
    /// Builds an `UnexpectedMessage` error.
    pub fn unexpected(message: impl Into<String>, context: impl Into<String>) -> Self {
        ProcedureError::UnexpectedMessage {
            message: message.into(),
            context: context.into(),
        }
    }
}

/// Result type for procedure operations.
pub type ProcResult<T> = Result<T, ProcedureError>;
