use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use roomdrop_protocol::Message;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::SendError;

/// Channel a transport delivers link events into.
pub type Inbox = mpsc::Sender<Delivery>;

/// Process-unique link identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(u64);

impl LinkId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link-{}", self.0)
    }
}

/// One event on one link.
#[derive(Debug)]
pub struct Delivery {
    pub link: LinkId,
    pub event: LinkEvent,
}

impl Delivery {
    pub(crate) fn opened(link: LinkId, sender: LinkSender) -> Self {
        Self {
            link,
            event: LinkEvent::Opened(sender),
        }
    }

    pub(crate) fn message(link: LinkId, msg: Message) -> Self {
        Self {
            link,
            event: LinkEvent::Message(msg),
        }
    }

    pub(crate) fn invalid(link: LinkId, reason: String) -> Self {
        Self {
            link,
            event: LinkEvent::Invalid(reason),
        }
    }

    pub(crate) fn closed(link: LinkId) -> Self {
        Self {
            link,
            event: LinkEvent::Closed,
        }
    }
}

/// Link lifecycle.
#[derive(Debug)]
pub enum LinkEvent {
    /// The link is open; replies go through the sender.
    Opened(LinkSender),
    /// A well-formed envelope arrived.
    Message(Message),
    /// A frame arrived that is not a valid envelope.
    Invalid(String),
    /// The link is gone. Last event for this link.
    Closed,
}

/// Handle for queueing messages on one link.
///
/// Cheap to clone. Sending never waits: a full buffer is an error.
#[derive(Debug, Clone)]
pub struct LinkSender {
    id: LinkId,
    tx: mpsc::Sender<Message>,
    cancel: CancellationToken,
}

impl LinkSender {
    pub(crate) fn new(id: LinkId, tx: mpsc::Sender<Message>, cancel: CancellationToken) -> Self {
        Self { id, tx, cancel }
    }

    pub fn id(&self) -> LinkId {
        self.id
    }

    /// Queues `msg` for delivery.
    pub fn send(&self, msg: Message) -> Result<(), SendError> {
        if self.cancel.is_cancelled() {
            return Err(SendError::Closed);
        }
        self.tx.try_send(msg).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                tracing::warn!(link = %self.id, "send buffer full, dropping message");
                SendError::Full
            }
            mpsc::error::TrySendError::Closed(_) => SendError::Closed,
        })
    }

    /// Returns `true` while the link can still carry messages.
    pub fn is_open(&self) -> bool {
        !self.cancel.is_cancelled() && !self.tx.is_closed()
    }

    /// Tears the link down from this side. Both ends observe `Closed`.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}
