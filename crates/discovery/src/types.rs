use std::net::{IpAddr, SocketAddr};

use serde::{Deserialize, Serialize};

/// mDNS service type for roomdrop senders.
pub const SERVICE_NAME: &str = "_roomdrop._tcp";

/// Default TTL for mDNS records (seconds).
pub const DEFAULT_TTL: u64 = 120;

/// Fully qualified service type, as mDNS expects it.
pub fn service_type() -> String {
    format!("{SERVICE_NAME}.local.")
}

/// What a listening sender publishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomAdvert {
    /// Room identity; also the mDNS instance name.
    pub identity: String,
    pub version: String,
    pub port: u16,
    #[serde(skip)]
    pub ips: Vec<IpAddr>,
}

impl RoomAdvert {
    pub fn new(identity: impl Into<String>, port: u16) -> Self {
        Self {
            identity: identity.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            port,
            ips: Vec::new(),
        }
    }

    /// Full mDNS name of this advert.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.identity, service_type())
    }
}

/// A sender found on the local network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredRoom {
    pub identity: String,
    pub version: String,
    pub host: String,
    pub port: u16,
    #[serde(skip)]
    pub ips: Vec<IpAddr>,
}

impl DiscoveredRoom {
    /// Returns the address (IP:port or host:port) for connecting.
    pub fn address(&self) -> String {
        if let Some(ip) = self.ips.first() {
            SocketAddr::new(*ip, self.port).to_string()
        } else {
            format!("{}:{}", self.host.trim_end_matches('.'), self.port)
        }
    }

    /// Returns the WebSocket URL of the sender's endpoint.
    pub fn websocket_url(&self) -> String {
        format!("ws://{}/ws", self.address())
    }
}

/// Non-loopback, non-link-local IPv4.
pub(crate) fn is_routable_v4(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => !v4.is_loopback() && !v4.is_link_local() && !v4.is_unspecified(),
        IpAddr::V6(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_room() -> DiscoveredRoom {
        DiscoveredRoom {
            identity: "roomdrop-abcdef".into(),
            version: "0.1.0".into(),
            host: "laptop.local.".into(),
            port: 8765,
            ips: vec!["192.168.1.100".parse().unwrap()],
        }
    }

    #[test]
    fn address_with_ip() {
        assert_eq!(test_room().address(), "192.168.1.100:8765");
    }

    #[test]
    fn address_without_ip() {
        let mut room = test_room();
        room.ips.clear();
        assert_eq!(room.address(), "laptop.local:8765");
    }

    #[test]
    fn websocket_url() {
        assert_eq!(test_room().websocket_url(), "ws://192.168.1.100:8765/ws");
    }

    #[test]
    fn advert_full_name() {
        let advert = RoomAdvert::new("roomdrop-k7mx2p", 4000);
        assert_eq!(advert.full_name(), "roomdrop-k7mx2p._roomdrop._tcp.local.");
        assert!(!advert.version.is_empty());
    }

    #[test]
    fn routable_filter() {
        assert!(is_routable_v4(&"10.0.0.2".parse().unwrap()));
        assert!(!is_routable_v4(&"127.0.0.1".parse().unwrap()));
        assert!(!is_routable_v4(&"169.254.3.4".parse().unwrap()));
        assert!(!is_routable_v4(&"::1".parse().unwrap()));
    }
}
