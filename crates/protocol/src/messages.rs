use serde::{Deserialize, Serialize};

use crate::ProtocolError;
use crate::constants::MessageType;
use crate::envelope::Message;
use crate::types::FileMetadata;

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// Pulls the chunk that starts at `offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRequest {
    pub offset: u64,
}

/// Obfuscated bytes for `[offset, offset + buffer.len())`.
///
/// The `buffer` field is base64-encoded in JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkPayload {
    pub offset: u64,
    #[serde(with = "base64_bytes")]
    pub buffer: Vec<u8>,
}

impl ChunkPayload {
    /// Offset one past the last byte carried by this chunk.
    pub fn end(&self) -> u64 {
        self.offset + self.buffer.len() as u64
    }
}

/// Free-text control-plane message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}

// ---------------------------------------------------------------------------
// Typed view
// ---------------------------------------------------------------------------

/// A validated data-channel message.
///
/// [`Frame::from_message`] is the single place where an envelope's shape
/// is checked; anything it rejects is a malformed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    RequestMetadata,
    Metadata(FileMetadata),
    RequestChunk(ChunkRequest),
    Chunk(ChunkPayload),
    Chat(ChatMessage),
}

impl Frame {
    pub fn message_type(&self) -> MessageType {
        match self {
            Frame::RequestMetadata => MessageType::RequestMetadata,
            Frame::Metadata(_) => MessageType::Metadata,
            Frame::RequestChunk(_) => MessageType::RequestChunk,
            Frame::Chunk(_) => MessageType::Chunk,
            Frame::Chat(_) => MessageType::Chat,
        }
    }

    /// Validates an envelope and converts it to a typed frame.
    pub fn from_message(msg: &Message) -> Result<Self, ProtocolError> {
        let frame = match msg.msg_type {
            MessageType::RequestMetadata => Frame::RequestMetadata,
            MessageType::Metadata => Frame::Metadata(msg.require_payload()?),
            MessageType::RequestChunk => Frame::RequestChunk(msg.require_payload()?),
            MessageType::Chunk => Frame::Chunk(msg.require_payload()?),
            MessageType::Chat => Frame::Chat(msg.require_payload()?),
        };
        Ok(frame)
    }

    /// Wraps the frame in an envelope.
    pub fn to_message(&self) -> Result<Message, ProtocolError> {
        let ty = self.message_type();
        let msg = match self {
            Frame::RequestMetadata => Message::bare(ty),
            Frame::Metadata(m) => Message::new(ty, Some(m))?,
            Frame::RequestChunk(r) => Message::new(ty, Some(r))?,
            Frame::Chunk(c) => Message::new(ty, Some(c))?,
            Frame::Chat(c) => Message::new(ty, Some(c))?,
        };
        Ok(msg)
    }

    pub fn request_chunk(offset: u64) -> Self {
        Frame::RequestChunk(ChunkRequest { offset })
    }

    pub fn chat(text: impl Into<String>, from: Option<String>) -> Self {
        Frame::Chat(ChatMessage {
            text: text.into(),
            from,
        })
    }
}

mod base64_bytes {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        STANDARD.encode(data).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}
