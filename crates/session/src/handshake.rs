//! Receiver-side metadata handshake.
//!
//! On link open the receiver asks for metadata, then keeps asking at a fixed
//! interval until metadata arrives or the link goes away. There is no overall
//! deadline. All timing is driven by the caller passing `now`, so the
//! schedule runs the same under simulated time.

use std::time::Duration;

use roomdrop_protocol::FileMetadata;
use tokio::time::Instant;
use tracing::debug;

/// When to resend `request-metadata`, and when to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
}

impl RetryPolicy {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn next_attempt(&self, from: Instant) -> Instant {
        from + self.interval
    }

    /// Retrying continues only while waiting for metadata on an open link.
    pub fn should_retry(&self, phase: HandshakePhase, link_open: bool) -> bool {
        link_open && phase == HandshakePhase::AwaitingMetadata
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakePhase {
    AwaitingMetadata,
    MetadataReceived,
}

/// Drives the `awaiting-metadata -> metadata-received` exchange for one
/// link.
#[derive(Debug)]
pub struct HandshakeCoordinator {
    policy: RetryPolicy,
    phase: HandshakePhase,
    link_open: bool,
    next_attempt: Option<Instant>,
    attempts: u32,
}

impl HandshakeCoordinator {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            phase: HandshakePhase::AwaitingMetadata,
            link_open: false,
            next_attempt: None,
            attempts: 0,
        }
    }

    pub fn phase(&self) -> HandshakePhase {
        self.phase
    }

    /// Requests sent so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// When the next retry is due, if one is scheduled.
    pub fn deadline(&self) -> Option<Instant> {
        self.next_attempt
    }

    /// The link opened. Returns `true` if a request should go out now.
    pub fn on_open(&mut self, now: Instant) -> bool {
        self.link_open = true;
        self.fire(now)
    }

    /// Returns `true` if a retry is due at `now`. Stops the schedule once
    /// the policy says so.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.next_attempt {
            Some(due) if now >= due => self.fire(now),
            _ => false,
        }
    }

    /// Takes the first metadata; later ones return `false` and must be
    /// ignored.
    pub fn accept(&mut self, metadata: &FileMetadata) -> bool {
        if self.phase != HandshakePhase::AwaitingMetadata {
            debug!(name = %metadata.name, "ignoring duplicate metadata");
            return false;
        }
        self.phase = HandshakePhase::MetadataReceived;
        self.next_attempt = None;
        debug!(name = %metadata.name, size = metadata.size, attempts = self.attempts, "metadata received");
        true
    }

    /// The link closed or the session is going away.
    pub fn cancel(&mut self) {
        self.link_open = false;
        self.next_attempt = None;
    }

    fn fire(&mut self, now: Instant) -> bool {
        if !self.policy.should_retry(self.phase, self.link_open) {
            self.next_attempt = None;
            return false;
        }
        self.attempts += 1;
        self.next_attempt = Some(self.policy.next_attempt(now));
        true
    }
}
