//! In-process transport.
//!
//! A broker maps identities to listener inboxes. `connect` creates a pair
//! of linked endpoints; each endpoint's outbound queue is forwarded into the
//! peer's inbox by a small task, which also delivers the peer's `Closed`
//! once the pair is torn down. Forwarding is lossless and preserves order.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use roomdrop_protocol::Message;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::link::{Delivery, Inbox, LinkId, LinkSender};
use crate::transport::{ListenerGuard, Transport, TransportFuture};
use crate::{SEND_BUFFER_SIZE, TransportError};

struct Listener {
    inbox: Inbox,
    cancel: CancellationToken,
}

/// In-process [`Transport`]. Clones share the same broker.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    listeners: Arc<Mutex<HashMap<String, Listener>>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if something is listening at `identity`.
    pub fn is_listening(&self, identity: &str) -> bool {
        let listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        listeners
            .get(identity)
            .is_some_and(|l| !l.cancel.is_cancelled() && !l.inbox.is_closed())
    }

    fn lookup(&self, identity: &str) -> Result<Inbox, TransportError> {
        let listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        match listeners.get(identity) {
            Some(l) if !l.cancel.is_cancelled() && !l.inbox.is_closed() => Ok(l.inbox.clone()),
            _ => Err(TransportError::NoListener(identity.to_string())),
        }
    }
}

impl Transport for MemoryTransport {
    fn listen<'a>(&'a self, identity: &'a str, inbox: Inbox) -> TransportFuture<'a, ListenerGuard> {
        Box::pin(async move {
            let cancel = CancellationToken::new();
            {
                let mut listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
                if let Some(existing) = listeners.get(identity)
                    && !existing.cancel.is_cancelled()
                    && !existing.inbox.is_closed()
                {
                    return Err(TransportError::AddressInUse(identity.to_string()));
                }
                listeners.insert(
                    identity.to_string(),
                    Listener {
                        inbox,
                        cancel: cancel.clone(),
                    },
                );
            }
            info!(identity, "memory listener registered");

            let registry = Arc::clone(&self.listeners);
            let key = identity.to_string();
            Ok(ListenerGuard::new(cancel).on_drop(move || {
                let mut listeners = registry.lock().unwrap_or_else(|e| e.into_inner());
                // A live entry belongs to a newer listener.
                if listeners.get(&key).is_some_and(|l| l.cancel.is_cancelled()) {
                    listeners.remove(&key);
                }
                debug!(identity = %key, "memory listener removed");
            }))
        })
    }

    fn connect<'a>(&'a self, identity: &'a str, inbox: Inbox) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            let remote = self.lookup(identity)?;

            let local_id = LinkId::next();
            let remote_id = LinkId::next();
            let cancel = CancellationToken::new();
            let (local_tx, local_rx) = mpsc::channel::<Message>(SEND_BUFFER_SIZE);
            let (remote_tx, remote_rx) = mpsc::channel::<Message>(SEND_BUFFER_SIZE);

            let local = LinkSender::new(local_id, local_tx, cancel.clone());
            let peer = LinkSender::new(remote_id, remote_tx, cancel.clone());

            // Both Opened events land before any forwarder runs, so no
            // message can overtake the Opened of its link.
            remote
                .send(Delivery::opened(remote_id, peer))
                .await
                .map_err(|_| TransportError::NoListener(identity.to_string()))?;
            if inbox.send(Delivery::opened(local_id, local)).await.is_err() {
                cancel.cancel();
                tokio::spawn(forward(remote_rx, inbox.clone(), local_id, cancel.clone()));
                tokio::spawn(forward(local_rx, remote, remote_id, cancel));
                return Err(TransportError::InboxClosed);
            }

            info!(identity, local = %local_id, remote = %remote_id, "memory link opened");
            tokio::spawn(forward(remote_rx, inbox, local_id, cancel.clone()));
            tokio::spawn(forward(local_rx, remote, remote_id, cancel));
            Ok(())
        })
    }
}

/// Moves one endpoint's outbound queue into the peer's inbox, then tells
/// the peer its link closed.
async fn forward(
    mut rx: mpsc::Receiver<Message>,
    peer: Inbox,
    peer_link: LinkId,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;

            msg = rx.recv() => match msg {
                Some(msg) => {
                    if peer.send(Delivery::message(peer_link, msg)).await.is_err() {
                        break;
                    }
                }
                None => break,
            },

            _ = cancel.cancelled() => break,
        }
    }
    cancel.cancel();

    // Flush anything queued before the close was observed.
    rx.close();
    while let Ok(msg) = rx.try_recv() {
        if peer.send(Delivery::message(peer_link, msg)).await.is_err() {
            break;
        }
    }
    let _ = peer.send(Delivery::closed(peer_link)).await;
    debug!(link = %peer_link, "memory link closed");
}
