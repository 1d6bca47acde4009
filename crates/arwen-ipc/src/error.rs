//! Transport and protocol errors shared by both ends of the pipe.

use std::io;
use std::time::Duration;

use crate::bridge::kind::MessageKind;

/// Failure of a pipe dialogue.
///
/// Every variant is critical for the dialogue it occurred in: the pipes can no
/// longer be trusted to be in sync, and the supervisor throws the child away.
/// Application-level failures never show up here; they travel in-band inside
/// response payloads.
#[derive(Debug, thiserror::Error)]
pub enum IpcError {
    #[error("pipe i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("timed out after {0:?} waiting for a message")]
    Timeout(Duration),

    #[error("pipe closed by peer")]
    PipeClosed,

    #[error("frame of {size} bytes exceeds the {max} byte limit")]
    FrameTooLarge { size: usize, max: usize },

    #[error("dialogue nonce mismatch: expected {expected}, received {received}")]
    NonceMismatch { expected: u32, received: u32 },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("frame kind {header:?} does not match payload kind {payload:?}")]
    KindMismatch {
        header: MessageKind,
        payload: MessageKind,
    },

    #[error("unexpected message of kind {kind}")]
    UnexpectedMessage { kind: u32 },

    #[error("no handler for message kind {0}")]
    UnhandledKind(u32),

    #[error("hook call {request:?} was answered with {response:?}")]
    BadHookResponse {
        request: MessageKind,
        response: MessageKind,
    },

    #[error("peer reported a critical error: {0}")]
    PeerCritical(String),

    #[error("dialogue stopped on request")]
    Stopped,

    #[error("protocol version mismatch: expected {expected}, received {received}")]
    ProtocolVersion { expected: u32, received: u32 },

    #[error("contract call exceeded its {0:?} time budget")]
    BudgetExceeded(Duration),
}

impl IpcError {
    /// True for receive deadlines, including an exhausted per-call budget.
    pub fn is_timeout(&self) -> bool {
        matches!(self, IpcError::Timeout(_) | IpcError::BudgetExceeded(_))
    }

    /// True when the dialogue ended because the parent asked the child to stop.
    pub fn is_stop(&self) -> bool {
        matches!(self, IpcError::Stopped)
    }
}
