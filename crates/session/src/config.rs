use std::time::Duration;

use roomdrop_protocol::constants::{
    CHUNK_SIZE, METADATA_RETRY_INTERVAL, SELF_DESTRUCT_AFTER, TIMER_TICK,
};

/// Tunables shared by sender and receiver sessions.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Bytes per chunk served by the sender.
    pub chunk_size: usize,
    pub metadata_retry_interval: Duration,
    pub self_destruct_after: Duration,
    /// Granularity of the connected-for counter and the countdown.
    pub timer_tick: Duration,
    /// Capacity of the inbox and event channels.
    pub event_buffer: usize,
    /// Attached to outgoing chat messages.
    pub display_name: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            metadata_retry_interval: METADATA_RETRY_INTERVAL,
            self_destruct_after: SELF_DESTRUCT_AFTER,
            timer_tick: TIMER_TICK,
            event_buffer: 256,
            display_name: None,
        }
    }
}

impl SessionConfig {
    /// Clamps values that would stall the session.
    pub(crate) fn normalized(mut self) -> Self {
        self.chunk_size = self.chunk_size.max(1);
        self.timer_tick = self.timer_tick.max(Duration::from_millis(1));
        self.metadata_retry_interval = self.metadata_retry_interval.max(Duration::from_millis(1));
        self.event_buffer = self.event_buffer.max(1);
        self
    }
}
