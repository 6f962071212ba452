//! The task that owns one session.
//!
//! All inputs (link deliveries, user commands, deadlines) are funnelled
//! through one `select!` loop into a sans-IO core, so session state needs no
//! locks and a late message can never reach a torn-down session.

use std::collections::HashMap;

use roomdrop_protocol::Message;
use roomdrop_transport::{Delivery, LinkEvent, LinkId, LinkSender, ListenerGuard, SendError};
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, trace, warn};

use crate::SessionError;
use crate::event::{Action, SessionEvent};

/// Inputs and outputs of a sans-IO session.
///
/// Implemented by [`Room`](crate::Room) and
/// [`ReceiverSession`](crate::ReceiverSession); every input returns the
/// actions the caller must carry out, in order.
pub trait SessionCore: Send + 'static {
    fn on_open(&mut self, link: LinkId, now: Instant) -> Vec<Action>;
    fn on_message(&mut self, link: LinkId, msg: Message, now: Instant) -> Vec<Action>;
    fn on_invalid(&mut self, link: LinkId, reason: String) -> Vec<Action>;
    fn on_closed(&mut self, link: LinkId, now: Instant) -> Vec<Action>;
    /// Called once [`next_deadline`](Self::next_deadline) has passed.
    fn on_deadline(&mut self, now: Instant) -> Vec<Action>;
    fn next_deadline(&self) -> Option<Instant>;
    fn chat(&mut self, text: String) -> Vec<Action>;
    fn teardown(&mut self) -> Vec<Action>;
}

/// Commands sent from a session handle.
#[derive(Debug)]
pub(crate) enum Command {
    Chat(String),
    Reset,
}

pub(crate) struct Actor<C> {
    core: C,
    links: HashMap<LinkId, LinkSender>,
    inbox: mpsc::Receiver<Delivery>,
    commands: mpsc::Receiver<Command>,
    events: mpsc::Sender<SessionEvent>,
    listener: Option<ListenerGuard>,
}

impl<C: SessionCore> Actor<C> {
    pub(crate) fn new(
        core: C,
        inbox: mpsc::Receiver<Delivery>,
        commands: mpsc::Receiver<Command>,
        events: mpsc::Sender<SessionEvent>,
        listener: Option<ListenerGuard>,
    ) -> Self {
        Self {
            core,
            links: HashMap::new(),
            inbox,
            commands,
            events,
            listener,
        }
    }

    /// Runs until teardown.
    pub(crate) async fn run(mut self, initial: Vec<Action>) {
        if self.apply(initial).await {
            return;
        }
        let mut inbox_open = true;

        loop {
            let deadline = self.core.next_deadline();
            let actions = tokio::select! {
                biased;

                cmd = self.commands.recv() => match cmd {
                    Some(Command::Chat(text)) => self.core.chat(text),
                    Some(Command::Reset) => {
                        debug!("reset requested");
                        vec![Action::Teardown]
                    }
                    None => {
                        debug!("session handle dropped");
                        vec![Action::Teardown]
                    }
                },

                delivery = self.inbox.recv(), if inbox_open => match delivery {
                    Some(delivery) => self.dispatch(delivery),
                    None => {
                        inbox_open = false;
                        Vec::new()
                    }
                },

                () = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.core.on_deadline(Instant::now())
                }
            };

            if self.apply(actions).await {
                break;
            }
        }
    }

    fn dispatch(&mut self, delivery: Delivery) -> Vec<Action> {
        let Delivery { link, event } = delivery;
        let now = Instant::now();
        match event {
            LinkEvent::Opened(sender) => {
                self.links.insert(link, sender);
                self.core.on_open(link, now)
            }
            LinkEvent::Message(msg) => {
                trace!(%link, msg_type = ?msg.msg_type, "message");
                self.core.on_message(link, msg, now)
            }
            LinkEvent::Invalid(reason) => self.core.on_invalid(link, reason),
            LinkEvent::Closed => {
                self.links.remove(&link);
                self.core.on_closed(link, now)
            }
        }
    }

    /// Carries out `actions`. Returns `true` once the session is torn down.
    async fn apply(&mut self, actions: Vec<Action>) -> bool {
        for action in actions {
            match action {
                Action::Send { link, frame } => {
                    let Some(sender) = self.links.get(&link) else {
                        trace!(%link, "dropping send to departed link");
                        continue;
                    };
                    let msg = match frame.to_message() {
                        Ok(msg) => msg,
                        Err(e) => {
                            warn!(%link, "could not encode {:?}: {e}", frame.message_type());
                            continue;
                        }
                    };
                    match sender.send(msg) {
                        Ok(()) => {}
                        Err(SendError::Closed) => debug!(%link, "send skipped, link closing"),
                        Err(e @ SendError::Full) => {
                            warn!(%link, "peer stopped reading, closing link");
                            sender.close();
                            self.emit(SessionEvent::Error {
                                link: Some(link),
                                error: SessionError::Send(e),
                            })
                            .await;
                        }
                    }
                }
                Action::Close { link } => {
                    if let Some(sender) = self.links.get(&link) {
                        sender.close();
                    }
                }
                Action::Emit(event) => self.emit(event).await,
                Action::Teardown => {
                    self.teardown().await;
                    return true;
                }
            }
        }
        false
    }

    async fn teardown(&mut self) {
        // Stop accepting before closing what is already open.
        drop(self.listener.take());
        for action in self.core.teardown() {
            match action {
                Action::Emit(event) => self.emit(event).await,
                Action::Close { link } => {
                    if let Some(sender) = self.links.get(&link) {
                        sender.close();
                    }
                }
                Action::Send { .. } | Action::Teardown => {}
            }
        }
        for sender in self.links.values() {
            sender.close();
        }
        self.links.clear();
        self.inbox.close();
    }

    async fn emit(&mut self, event: SessionEvent) {
        if self.events.send(event).await.is_err() {
            trace!("event receiver dropped");
        }
    }
}
