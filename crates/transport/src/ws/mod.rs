//! WebSocket transport.
//!
//! The listener binds a TCP port, upgrades connections to WebSocket and
//! advertises the room identity over mDNS. The connector resolves the
//! identity (or uses a fixed address) and dials `ws://<addr>/ws`. Every
//! link runs a read pump and a write pump; `Closed` is delivered once both
//! have stopped.

mod pumps;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use roomdrop_discovery::{Client, RoomAdvert, Server};
use roomdrop_protocol::Message;
use roomdrop_protocol::constants::{MAX_MESSAGE_SIZE, PING_PERIOD, PONG_WAIT};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::{WebSocketStream, accept_async_with_config, connect_async_with_config};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::link::{Delivery, Inbox, LinkId, LinkSender};
use crate::transport::{ListenerGuard, Transport, TransportFuture};
use crate::{SEND_BUFFER_SIZE, TransportError};

/// WebSocket transport tunables.
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// TCP port to listen on (0 = OS-assigned).
    pub port: u16,
    /// How long `connect` browses mDNS for the identity.
    pub resolve_timeout: Duration,
    pub max_message_size: usize,
    pub ping_period: Duration,
    pub pong_wait: Duration,
    /// Dial this address instead of resolving the identity.
    pub direct_addr: Option<SocketAddr>,
    /// Publish listeners over mDNS.
    pub advertise: bool,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            port: 0,
            resolve_timeout: Duration::from_secs(5),
            max_message_size: MAX_MESSAGE_SIZE,
            ping_period: PING_PERIOD,
            pong_wait: PONG_WAIT,
            direct_addr: None,
            advertise: true,
        }
    }
}

impl WsConfig {
    fn websocket_config(&self) -> WebSocketConfig {
        let mut ws_config = WebSocketConfig::default();
        ws_config.max_message_size = Some(self.max_message_size);
        ws_config.max_frame_size = Some(self.max_message_size);
        ws_config
    }
}

/// [`Transport`] over WebSocket with mDNS discovery.
#[derive(Debug, Clone, Default)]
pub struct WsTransport {
    config: Arc<WsConfig>,
}

impl WsTransport {
    pub fn new(config: WsConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &WsConfig {
        &self.config
    }

    async fn target_url(&self, identity: &str) -> Result<String, TransportError> {
        if let Some(addr) = self.config.direct_addr {
            return Ok(format!("ws://{addr}/ws"));
        }
        let room = Client::new()
            .resolve(identity, self.config.resolve_timeout)
            .await
            .map_err(|e| match e {
                roomdrop_discovery::DiscoveryError::NotFound(id) => TransportError::NoListener(id),
                other => TransportError::Discovery(other),
            })?;
        Ok(room.websocket_url())
    }
}

impl Transport for WsTransport {
    fn listen<'a>(&'a self, identity: &'a str, inbox: Inbox) -> TransportFuture<'a, ListenerGuard> {
        Box::pin(async move {
            let addr: SocketAddr = ([0, 0, 0, 0], self.config.port).into();
            let listener = TcpListener::bind(addr).await?;
            let local_addr = listener.local_addr()?;
            info!(identity, %local_addr, "room listener bound");

            let advert = if self.config.advertise {
                let mut server = Server::new(RoomAdvert::new(identity, local_addr.port()));
                match server.start() {
                    Ok(()) => Some(server),
                    Err(e) => {
                        // Direct addressing still works without mDNS.
                        warn!(identity, "mDNS advertisement failed: {e}");
                        None
                    }
                }
            } else {
                None
            };

            let cancel = CancellationToken::new();
            tokio::spawn(accept_loop(
                listener,
                inbox,
                Arc::clone(&self.config),
                cancel.clone(),
                advert,
            ));
            Ok(ListenerGuard::new(cancel).with_local_addr(local_addr))
        })
    }

    fn connect<'a>(&'a self, identity: &'a str, inbox: Inbox) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            let url = self.target_url(identity).await?;
            debug!(identity, %url, "dialing room");
            let (ws_stream, _) =
                connect_async_with_config(url.as_str(), Some(self.config.websocket_config()), false)
                    .await
                    .map_err(|e| {
                        warn!(identity, %url, "connect failed: {e}");
                        TransportError::NoListener(identity.to_string())
                    })?;
            info!(identity, %url, "connected to room");
            spawn_link(ws_stream, inbox, &self.config, CancellationToken::new()).await
        })
    }
}

/// Accepts connections until the listener guard is dropped.
///
/// Owns the mDNS advert so it is withdrawn when the loop exits.
async fn accept_loop(
    listener: TcpListener,
    inbox: Inbox,
    config: Arc<WsConfig>,
    cancel: CancellationToken,
    advert: Option<Server>,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            _ = inbox.closed() => break,

            result = listener.accept() => {
                match result {
                    Ok((stream, peer_addr)) => {
                        let inbox = inbox.clone();
                        let config = Arc::clone(&config);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, peer_addr, inbox, &config).await {
                                warn!(%peer_addr, "connection error: {e}");
                            }
                        });
                    }
                    Err(e) => error!("accept error: {e}"),
                }
            }
        }
    }
    drop(advert);
    debug!("room listener stopped");
}

async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    inbox: Inbox,
    config: &WsConfig,
) -> Result<(), TransportError> {
    let ws_stream = accept_async_with_config(stream, Some(config.websocket_config())).await?;
    info!(%peer_addr, "WebSocket connection established");
    // Links outlive the listener: their lifetime is owned by the session.
    spawn_link(ws_stream, inbox, config, CancellationToken::new()).await
}

/// Announces a link and starts its pumps.
async fn spawn_link<S>(
    ws_stream: WebSocketStream<S>,
    inbox: Inbox,
    config: &WsConfig,
    cancel: CancellationToken,
) -> Result<(), TransportError>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    let id = LinkId::next();
    let (tx, rx) = mpsc::channel::<Message>(SEND_BUFFER_SIZE);
    let (control_tx, control_rx) = mpsc::channel(16);
    let sender = LinkSender::new(id, tx, cancel.clone());

    if inbox.send(Delivery::opened(id, sender)).await.is_err() {
        return Err(TransportError::InboxClosed);
    }

    let (sink, stream) = ws_stream.split();
    let writer = tokio::spawn(pumps::write_pump(
        sink,
        id,
        rx,
        control_rx,
        config.ping_period,
        cancel.clone(),
    ));
    let pong_wait = config.pong_wait;
    tokio::spawn(async move {
        pumps::read_pump(stream, id, inbox.clone(), control_tx, pong_wait, cancel).await;
        let _ = writer.await;
        let _ = inbox.send(Delivery::closed(id)).await;
        info!(link = %id, "link closed");
    });
    Ok(())
}
