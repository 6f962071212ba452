use std::fmt;

use tracing::{debug, warn};

use crate::SessionError;

/// Which side of a transfer a session plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Sender,
    Receiver,
}

/// Lifecycle of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    /// Local endpoint created; listening or dialing.
    Connecting,
    /// Link open, metadata not exchanged yet.
    Connected,
    Transferring,
    Complete,
    Errored,
    Closed,
}

impl SessionState {
    /// `Errored` and `Closed` only leave through teardown.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Errored | SessionState::Closed)
    }

    /// Whether `self -> to` is a legal transition.
    ///
    /// Teardown (`-> Idle`) is legal from anywhere.
    pub fn can_transition_to(self, to: SessionState) -> bool {
        use SessionState::*;
        match (self, to) {
            (_, Idle) => true,
            (Idle, Connecting)
            | (Connecting, Connected)
            | (Connected, Transferring)
            | (Transferring, Complete) => true,
            (from, Errored | Closed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Transferring => "transferring",
            SessionState::Complete => "complete",
            SessionState::Errored => "errored",
            SessionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Current state of a session plus its role, guarded by the transition
/// table in [`SessionState::can_transition_to`].
#[derive(Debug, Clone)]
pub struct StateMachine {
    role: Role,
    state: SessionState,
}

impl StateMachine {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            state: SessionState::Idle,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Moves to `to`. A transition to the current state is a no-op and
    /// returns `Ok(false)`.
    pub fn transition(&mut self, to: SessionState) -> Result<bool, SessionError> {
        if self.state == to {
            return Ok(false);
        }
        if !self.state.can_transition_to(to) {
            return Err(SessionError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        debug!(role = ?self.role, from = %self.state, to = %to, "state transition");
        self.state = to;
        Ok(true)
    }

    /// Like [`transition`](Self::transition) but logs and ignores illegal
    /// moves. Returns `true` if the state changed.
    pub fn advance(&mut self, to: SessionState) -> bool {
        match self.transition(to) {
            Ok(changed) => changed,
            Err(e) => {
                warn!(role = ?self.role, "{e}");
                false
            }
        }
    }
}
