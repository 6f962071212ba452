//! Sender rooms and receiver sessions.
//!
//! The protocol logic is sans-IO: [`Room`] (sender) and [`ReceiverSession`]
//! take link events and the current time and return [`Action`]s. The
//! [`SendSession`] and [`ReceiveSession`] handles run one of them inside a
//! tokio task wired to a [`Transport`](roomdrop_transport::Transport).
//!
//! ```text
//! receiver                      sender room
//!    | -- request-metadata -->     |   (every 500 ms until answered)
//!    | <-- metadata ------------   |
//!    | -- request-chunk(0) ---->   |
//!    | <-- chunk(0, 16 KiB) ----   |
//!    | -- request-chunk(16384) ->  |
//!    |           ...               |
//! ```

mod actor;
mod config;
mod error;
mod event;
mod flow;
mod handle;
mod handshake;
mod receiver;
mod room;
mod state;
mod timers;

pub use actor::SessionCore;
pub use config::SessionConfig;
pub use error::SessionError;
pub use event::{Action, SessionEvent};
pub use flow::{FlowStep, ReceiveFlow, serve_chunk};
pub use handle::{ReceiveSession, SendSession};
pub use handshake::{HandshakeCoordinator, HandshakePhase, RetryPolicy};
pub use receiver::ReceiverSession;
pub use room::{FileOffer, PeerPhase, Room};
pub use state::{Role, SessionState, StateMachine};
pub use timers::{LifecycleTimers, TimerEvent};
