use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;

use tokio_util::sync::CancellationToken;

use crate::TransportError;
use crate::link::Inbox;

/// A boxed future returned by transport methods.
pub type TransportFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, TransportError>> + Send + 'a>>;

/// Factory for links addressed by room identity.
pub trait Transport: Send + Sync + 'static {
    /// Publishes `identity` and delivers every inbound link's events into
    /// `inbox` until the returned guard is dropped.
    ///
    /// An error here means the local endpoint could not be created.
    fn listen<'a>(&'a self, identity: &'a str, inbox: Inbox) -> TransportFuture<'a, ListenerGuard>;

    /// Opens one link to the listener at `identity`; its events go to
    /// `inbox`, starting with `Opened`.
    ///
    /// An error here means nothing is listening at `identity`.
    fn connect<'a>(&'a self, identity: &'a str, inbox: Inbox) -> TransportFuture<'a, ()>;
}

/// Keeps a listener published. Dropping it withdraws the identity and stops
/// accepting; links that are already open are unaffected.
pub struct ListenerGuard {
    cancel: CancellationToken,
    local_addr: Option<SocketAddr>,
    on_drop: Option<Box<dyn FnOnce() + Send>>,
}

impl ListenerGuard {
    pub(crate) fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            local_addr: None,
            on_drop: None,
        }
    }

    pub(crate) fn with_local_addr(mut self, addr: SocketAddr) -> Self {
        self.local_addr = Some(addr);
        self
    }

    pub(crate) fn on_drop(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.on_drop = Some(Box::new(f));
        self
    }

    /// Socket address of a network listener.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled()
    }
}

impl std::fmt::Debug for ListenerGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerGuard")
            .field("active", &self.is_active())
            .field("local_addr", &self.local_addr)
            .finish()
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(f) = self.on_drop.take() {
            f();
        }
    }
}
