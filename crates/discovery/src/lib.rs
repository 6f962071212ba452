//! mDNS/DNS-SD publication and resolution of room identities.
//!
//! A sender's [`Server`] advertises its room identity as the instance name
//! of a `_roomdrop._tcp` service; a receiver's [`Client`] browses for that
//! instance and yields the address to connect to.

pub mod client;
pub mod server;
pub mod types;

// Re-export primary types.
pub use client::Client;
pub use server::{Server, get_hostname, get_local_ips};
pub use types::{DEFAULT_TTL, DiscoveredRoom, RoomAdvert, SERVICE_NAME, service_type};

/// Errors for discovery operations.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("mDNS error: {0}")]
    Mdns(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("no room advertised as {0}")]
    NotFound(String),
}
