use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Size of one file chunk on the wire (16 KiB).
///
/// Kept small relative to the transport's frame limit: a chunk travels
/// base64-encoded inside a JSON text frame.
pub const CHUNK_SIZE: usize = 16 * 1024;

/// Interval between `request-metadata` attempts while the handshake is
/// still waiting for the sender's reply.
pub const METADATA_RETRY_INTERVAL: Duration = Duration::from_millis(500);

/// Time a completed session stays alive before it tears itself down.
pub const SELF_DESTRUCT_AFTER: Duration = Duration::from_secs(300);

/// Resolution of the lifecycle timers (connection counter, self-destruct).
pub const TIMER_TICK: Duration = Duration::from_secs(1);

/// Prefix applied to every connect identity so roomdrop identities never
/// collide with other users of the shared transport namespace.
pub const ROOM_NAMESPACE: &str = "roomdrop-";

/// Source value used for the cipher key when the PIN is missing or
/// unparsable. `1024 % 256 == 0`, so the fallback key disables obfuscation.
pub const MISSING_PIN_SOURCE: u32 = 1024;

/// Maximum accepted message size in bytes (1 MiB).
///
/// A full chunk encodes to ~22 KiB, so this leaves ample headroom for
/// metadata with long names and chat text.
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// How often a link sends keepalive pings.
pub const PING_PERIOD: Duration = Duration::from_secs(5);

/// Read deadline: a link with no inbound traffic for this long is dead.
pub const PONG_WAIT: Duration = Duration::from_secs(30);

/// Data-channel message type identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    /// Receiver asks the sender to (re)send the file metadata.
    #[serde(rename = "request-metadata")]
    RequestMetadata,
    /// Sender describes the shared file.
    #[serde(rename = "metadata")]
    Metadata,
    /// Receiver pulls the chunk starting at an offset.
    #[serde(rename = "request-chunk")]
    RequestChunk,
    /// Sender answers a chunk request with obfuscated bytes.
    #[serde(rename = "chunk")]
    Chunk,
    /// Free-text control-plane message.
    #[serde(rename = "chat")]
    Chat,
}

impl MessageType {
    /// Wire name of the message type.
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::RequestMetadata => "request-metadata",
            MessageType::Metadata => "metadata",
            MessageType::RequestChunk => "request-chunk",
            MessageType::Chunk => "chunk",
            MessageType::Chat => "chat",
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
