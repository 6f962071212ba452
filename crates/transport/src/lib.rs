//! Reliable, ordered, message-framed links between a sender and its
//! receivers.
//!
//! A [`Transport`] either listens on a room identity or opens one link to
//! it. Every link reports its lifecycle into an inbox channel as
//! [`Delivery`] values: `Opened` first, then any number of `Message`s, then
//! exactly one `Closed`. Sessions talk back through the [`LinkSender`]
//! carried by `Opened`.
//!
//! [`MemoryTransport`] links sessions inside one process; [`WsTransport`]
//! carries the same messages over WebSocket, found via mDNS.

mod link;
mod memory;
mod transport;
mod ws;

pub use link::{Delivery, Inbox, LinkEvent, LinkId, LinkSender};
pub use memory::MemoryTransport;
pub use transport::{ListenerGuard, Transport, TransportFuture};
pub use ws::{WsConfig, WsTransport};

/// Per-link outbound buffer capacity.
///
/// A receiver keeps one chunk request in flight, so the buffer only has to
/// absorb metadata retries and chat bursts.
pub const SEND_BUFFER_SIZE: usize = 256;

/// Errors produced while opening links.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("identity already in use: {0}")]
    AddressInUse(String),

    #[error("no listener for {0}")]
    NoListener(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("discovery error: {0}")]
    Discovery(#[from] roomdrop_discovery::DiscoveryError),

    #[error("inbox closed")]
    InboxClosed,
}

/// Error returned when a message cannot be queued on a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("send failed: buffer full")]
    Full,

    #[error("send failed: link closed")]
    Closed,
}
