//! Wire protocol and room identity for roomdrop sessions.
//!
//! Every data-channel message is a JSON [`Message`] envelope whose payload
//! is decoded into a typed [`Frame`]. The [`room`] module turns a
//! human-readable room code into the sender's network identity and the
//! chunk obfuscation key.

pub mod constants;
pub mod envelope;
pub mod messages;
pub mod room;
pub mod types;

// Re-export primary types for convenience.
pub use constants::MessageType;
pub use envelope::Message;
pub use messages::{ChatMessage, ChunkPayload, ChunkRequest, Frame};
pub use room::{RoomCode, RoomCodeError, derive_connect_id, derive_key};
pub use types::FileMetadata;

/// Errors produced while encoding or validating messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("message too large ({size} bytes, max {max})")]
    TooLarge { size: usize, max: usize },
}
