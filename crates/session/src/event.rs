use std::time::Duration;

use roomdrop_protocol::{ChatMessage, FileMetadata, Frame};
use roomdrop_transfer::ReceivedFile;
use roomdrop_transport::LinkId;

use crate::timers::TimerEvent;
use crate::{SessionError, SessionState};

/// Events a running session reports to its owner.
#[derive(Debug)]
pub enum SessionEvent {
    StateChanged(SessionState),

    /// Receiver: the sender described the file.
    Metadata(FileMetadata),
    /// Receiver: bytes reassembled so far.
    Progress { bytes: u64, total: u64, percent: u8 },
    /// Receiver: the whole file is in.
    Received(ReceivedFile),

    /// Sender: a receiver connected.
    PeerJoined { link: LinkId, peers: usize },
    /// Sender: a receiver's link closed.
    PeerLeft { link: LinkId, peers: usize },
    /// Sender: bytes served to one receiver.
    PeerProgress {
        link: LinkId,
        bytes: u64,
        total: u64,
        percent: u8,
    },
    /// Sender: one receiver has every byte.
    Served { link: LinkId },
    /// Sender: the last receiver left. Reported once per emptying.
    RoomEmpty,

    Chat {
        link: LinkId,
        message: ChatMessage,
    },
    /// `link` is set when the error only affects that link.
    Error {
        link: Option<LinkId>,
        error: SessionError,
    },

    ConnectedFor(Duration),
    SelfDestructIn(Duration),

    /// Teardown finished; the session task is exiting.
    TornDown,
}

/// Output of the sans-IO session cores, carried out by the actor.
#[derive(Debug)]
pub enum Action {
    Send { link: LinkId, frame: Frame },
    Close { link: LinkId },
    Emit(SessionEvent),
    /// Tear the whole session down.
    Teardown,
}

impl Action {
    pub(crate) fn emit(event: SessionEvent) -> Self {
        Action::Emit(event)
    }

    pub(crate) fn state(state: SessionState) -> Self {
        Action::Emit(SessionEvent::StateChanged(state))
    }

    /// Maps a timer event; expiry becomes a teardown request.
    pub(crate) fn timer(event: TimerEvent) -> Self {
        match event {
            TimerEvent::ConnectedFor(d) => Action::Emit(SessionEvent::ConnectedFor(d)),
            TimerEvent::SelfDestructIn(d) => Action::Emit(SessionEvent::SelfDestructIn(d)),
            TimerEvent::SelfDestructExpired => Action::Teardown,
        }
    }
}
