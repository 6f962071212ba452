//! Connected-for counter and self-destruct countdown.
//!
//! Both run on their own tick grid starting when they are started, so a
//! countdown armed at `t` expires at exactly `t + self_destruct_after`.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

/// Something a timer wants reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    ConnectedFor(Duration),
    SelfDestructIn(Duration),
    SelfDestructExpired,
}

#[derive(Debug, Clone, Copy)]
struct Counter {
    ticks: u64,
    next: Instant,
}

#[derive(Debug, Clone, Copy)]
struct Countdown {
    remaining: u64,
    next: Instant,
}

#[derive(Debug)]
pub struct LifecycleTimers {
    tick: Duration,
    countdown_ticks: u64,
    counter: Option<Counter>,
    countdown: Option<Countdown>,
}

impl LifecycleTimers {
    pub fn new(tick: Duration, self_destruct_after: Duration) -> Self {
        let tick = tick.max(Duration::from_millis(1));
        let countdown_ticks = self_destruct_after
            .as_nanos()
            .div_ceil(tick.as_nanos())
            .max(1)
            .try_into()
            .unwrap_or(u64::MAX);
        Self {
            tick,
            countdown_ticks,
            counter: None,
            countdown: None,
        }
    }

    /// Starts the connected-for counter at zero unless it is running.
    pub fn start_counter(&mut self, now: Instant) -> Option<TimerEvent> {
        if self.counter.is_some() {
            return None;
        }
        self.counter = Some(Counter {
            ticks: 0,
            next: now + self.tick,
        });
        Some(TimerEvent::ConnectedFor(Duration::ZERO))
    }

    /// Connectivity lost: the counter drops back to zero and stops.
    pub fn stop_counter(&mut self) -> Option<TimerEvent> {
        self.counter
            .take()
            .map(|_| TimerEvent::ConnectedFor(Duration::ZERO))
    }

    pub fn connected_for(&self) -> Option<Duration> {
        self.counter.map(|c| self.span(c.ticks))
    }

    /// Arms the self-destruct countdown unless it is already running.
    pub fn arm_self_destruct(&mut self, now: Instant) -> Option<TimerEvent> {
        if self.countdown.is_some() {
            return None;
        }
        info!(after = ?self.span(self.countdown_ticks), "self-destruct armed");
        self.countdown = Some(Countdown {
            remaining: self.countdown_ticks,
            next: now + self.tick,
        });
        Some(TimerEvent::SelfDestructIn(self.span(self.countdown_ticks)))
    }

    /// Returns `true` if a running countdown was cancelled.
    pub fn disarm_self_destruct(&mut self) -> bool {
        let was_armed = self.countdown.take().is_some();
        if was_armed {
            debug!("self-destruct disarmed");
        }
        was_armed
    }

    pub fn self_destruct_armed(&self) -> bool {
        self.countdown.is_some()
    }

    pub fn self_destruct_remaining(&self) -> Option<Duration> {
        self.countdown.map(|c| self.span(c.remaining))
    }

    /// Earliest instant at which [`poll`](Self::poll) has work.
    pub fn next_deadline(&self) -> Option<Instant> {
        let counter = self.counter.map(|c| c.next);
        let countdown = self.countdown.map(|c| c.next);
        match (counter, countdown) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Runs every tick due at or before `now`.
    pub fn poll(&mut self, now: Instant) -> Vec<TimerEvent> {
        let mut events = Vec::new();

        if let Some(counter) = self.counter.as_mut() {
            while counter.next <= now {
                counter.ticks += 1;
                counter.next += self.tick;
                events.push(TimerEvent::ConnectedFor(span(self.tick, counter.ticks)));
            }
        }

        if let Some(countdown) = self.countdown.as_mut() {
            while countdown.next <= now && countdown.remaining > 0 {
                countdown.remaining -= 1;
                countdown.next += self.tick;
                if countdown.remaining == 0 {
                    break;
                }
                events.push(TimerEvent::SelfDestructIn(span(self.tick, countdown.remaining)));
            }
            if countdown.remaining == 0 {
                self.countdown = None;
                info!("self-destruct expired");
                events.push(TimerEvent::SelfDestructExpired);
            }
        }

        events
    }

    /// Stops both timers.
    pub fn clear(&mut self) {
        self.counter = None;
        self.countdown = None;
    }

    fn span(&self, ticks: u64) -> Duration {
        span(self.tick, ticks)
    }
}

fn span(tick: Duration, ticks: u64) -> Duration {
    tick.saturating_mul(u32::try_from(ticks).unwrap_or(u32::MAX))
}
