use std::net::IpAddr;
use std::time::Duration;

use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::DiscoveryError;
use crate::types::{DiscoveredRoom, is_routable_v4, service_type};

/// Resolves room identities to network addresses via mDNS/DNS-SD.
#[derive(Debug, Clone)]
pub struct Client {
    poll: Duration,
}

impl Client {
    pub fn new() -> Self {
        Self {
            poll: Duration::from_millis(100),
        }
    }

    /// Browses until a sender advertising `identity` resolves or `timeout`
    /// elapses.
    pub async fn resolve(
        &self,
        identity: &str,
        timeout: Duration,
    ) -> Result<DiscoveredRoom, DiscoveryError> {
        self.browse(identity, timeout)
            .await?
            .ok_or_else(|| DiscoveryError::NotFound(identity.to_string()))
    }

    async fn browse(
        &self,
        wanted: &str,
        timeout: Duration,
    ) -> Result<Option<DiscoveredRoom>, DiscoveryError> {
        let daemon = ServiceDaemon::new()
            .map_err(|e| DiscoveryError::Mdns(format!("failed to create mDNS daemon: {e}")))?;
        let receiver = daemon
            .browse(&service_type())
            .map_err(|e| DiscoveryError::Mdns(format!("failed to browse mDNS: {e}")))?;

        debug!(identity = %wanted, ?timeout, "browsing for room");
        let mut found = None;
        let deadline = Instant::now() + timeout;

        while Instant::now() < deadline {
            let poll = self.poll;
            let next = tokio::time::timeout(
                deadline.saturating_duration_since(Instant::now()),
                tokio::task::spawn_blocking({
                    let receiver = receiver.clone();
                    move || receiver.recv_timeout(poll)
                }),
            )
            .await;

            let Ok(Ok(Ok(ServiceEvent::ServiceResolved(info)))) = next else {
                continue;
            };
            let Some(room) = room_from_info(&info) else {
                continue;
            };
            trace!(identity = %room.identity, addr = %room.address(), "room resolved");

            if room.identity == wanted {
                found = Some(room);
                break;
            }
        }

        let _ = daemon.shutdown();
        Ok(found)
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads a resolved service into a [`DiscoveredRoom`].
///
/// The identity comes from the `id` TXT record, falling back to the
/// instance part of the full name. Returns `None` without a usable address.
fn room_from_info(info: &ServiceInfo) -> Option<DiscoveredRoom> {
    let mut identity = String::new();
    let mut version = String::new();
    for property in info.get_properties().iter() {
        match property.key() {
            "id" => identity = property.val_str().to_string(),
            "version" => version = property.val_str().to_string(),
            _ => {}
        }
    }
    if identity.is_empty() {
        identity = instance_name(info.get_fullname()).to_string();
    }

    let mut ips: Vec<IpAddr> = info
        .get_addresses()
        .iter()
        .copied()
        .filter(is_routable_v4)
        .collect();
    ips.sort();

    let host = info.get_hostname().to_string();
    if ips.is_empty() && host.is_empty() {
        return None;
    }

    Some(DiscoveredRoom {
        identity,
        version,
        host,
        port: info.get_port(),
        ips,
    })
}

fn instance_name(fullname: &str) -> &str {
    fullname
        .strip_suffix(&service_type())
        .map(|s| s.trim_end_matches('.'))
        .unwrap_or(fullname)
}
