use std::net::IpAddr;

use mdns_sd::{ServiceDaemon, ServiceInfo as MdnsServiceInfo};
use tracing::{debug, info};

use crate::DiscoveryError;
use crate::types::{RoomAdvert, is_routable_v4, service_type};

/// Publishes a room identity on the local network via mDNS/DNS-SD.
pub struct Server {
    advert: RoomAdvert,
    daemon: Option<ServiceDaemon>,
}

impl Server {
    pub fn new(advert: RoomAdvert) -> Self {
        Self {
            advert,
            daemon: None,
        }
    }

    /// Begins advertising the room.
    ///
    /// The port must be set before calling start. Calling it again
    /// re-registers from scratch.
    pub fn start(&mut self) -> Result<(), DiscoveryError> {
        if self.advert.port == 0 {
            return Err(DiscoveryError::Config(
                "port must be set before starting mDNS server".into(),
            ));
        }

        self.stop();

        let daemon = ServiceDaemon::new()
            .map_err(|e| DiscoveryError::Mdns(format!("failed to create mDNS daemon: {e}")))?;

        let ips = if self.advert.ips.is_empty() {
            get_local_ips()
        } else {
            self.advert.ips.clone()
        };
        if ips.is_empty() {
            return Err(DiscoveryError::Network("no valid network IPs found".into()));
        }

        let hostname = get_hostname();
        let properties = [
            ("id", self.advert.identity.as_str()),
            ("version", self.advert.version.as_str()),
        ];

        let service = MdnsServiceInfo::new(
            &service_type(),
            &self.advert.identity,
            &hostname,
            &ips[..],
            self.advert.port,
            &properties[..],
        )
        .map_err(|e| DiscoveryError::Mdns(format!("failed to create service info: {e}")))?;

        daemon.register(service).map_err(|e| {
            DiscoveryError::Mdns(format!(
                "failed to register mDNS service '{}': {e}",
                self.advert.full_name()
            ))
        })?;

        info!(
            identity = %self.advert.identity,
            port = self.advert.port,
            ips = ?ips,
            "room advertised"
        );
        self.daemon = Some(daemon);
        Ok(())
    }

    /// Withdraws the advert. Idempotent.
    pub fn stop(&mut self) {
        if let Some(daemon) = self.daemon.take() {
            let _ = daemon.unregister(&self.advert.full_name());
            let _ = daemon.shutdown();
            debug!(identity = %self.advert.identity, "room advert withdrawn");
        }
    }

    pub fn advert(&self) -> &RoomAdvert {
        &self.advert
    }

    pub fn is_running(&self) -> bool {
        self.daemon.is_some()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Returns local non-loopback IPv4 addresses, excluding link-local (169.254.x.x).
pub fn get_local_ips() -> Vec<IpAddr> {
    let Ok(interfaces) = if_addrs::get_if_addrs() else {
        return Vec::new();
    };

    interfaces
        .into_iter()
        .filter(|iface| !iface.is_loopback())
        .map(|iface| iface.ip())
        .filter(is_routable_v4)
        .collect()
}

/// Returns the local hostname suffixed with `.local.` as required by mDNS.
pub fn get_hostname() -> String {
    let mut name = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".into());

    if !name.ends_with(".local.") {
        name = name.trim_end_matches('.').to_string();
        name.push_str(".local.");
    }
    name
}
