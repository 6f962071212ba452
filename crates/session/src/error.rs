use roomdrop_protocol::ProtocolError;
use roomdrop_transfer::TransferError;
use roomdrop_transport::{SendError, TransportError};

use crate::SessionState;

/// Errors surfaced by sessions.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The transport could not create the local endpoint.
    #[error("could not open room: {0}")]
    TransportOpen(#[source] TransportError),

    /// Nothing is listening at the room identity.
    #[error("could not connect to room: {0}")]
    ConnectFailed(#[source] TransportError),

    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("connection closed mid-transfer ({bytes} of {total} bytes)")]
    UnexpectedClosure { bytes: u64, total: u64 },

    /// A reply could not be queued on a link.
    #[error("link send failed: {0}")]
    Send(#[from] SendError),

    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition {
        from: SessionState,
        to: SessionState,
    },

    #[error("session stopped")]
    Stopped,
}

impl From<ProtocolError> for SessionError {
    fn from(e: ProtocolError) -> Self {
        SessionError::MalformedMessage(e.to_string())
    }
}
