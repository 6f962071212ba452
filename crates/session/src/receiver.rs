//! Receiver session core: one link, one handshake, one pull loop.

use roomdrop_protocol::{ChunkPayload, FileMetadata, Frame, Message};
use roomdrop_transport::LinkId;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::actor::SessionCore;
use crate::event::{Action, SessionEvent};
use crate::flow::{FlowStep, ReceiveFlow};
use crate::handshake::{HandshakeCoordinator, RetryPolicy};
use crate::state::{Role, StateMachine};
use crate::timers::LifecycleTimers;
use crate::{SessionConfig, SessionError, SessionState};

/// Sans-IO receiver. Every input returns the actions to carry out.
#[derive(Debug)]
pub struct ReceiverSession {
    machine: StateMachine,
    key: u8,
    display_name: Option<String>,
    link: Option<LinkId>,
    handshake: HandshakeCoordinator,
    flow: Option<ReceiveFlow>,
    metadata: Option<FileMetadata>,
    bytes_transferred: u64,
    timers: LifecycleTimers,
}

impl ReceiverSession {
    pub fn new(key: u8, config: &SessionConfig) -> Self {
        Self {
            machine: StateMachine::new(Role::Receiver),
            key,
            display_name: config.display_name.clone(),
            link: None,
            handshake: HandshakeCoordinator::new(RetryPolicy::new(config.metadata_retry_interval)),
            flow: None,
            metadata: None,
            bytes_transferred: 0,
            timers: LifecycleTimers::new(config.timer_tick, config.self_destruct_after),
        }
    }

    pub fn state(&self) -> SessionState {
        self.machine.state()
    }

    pub fn metadata(&self) -> Option<&FileMetadata> {
        self.metadata.as_ref()
    }

    pub fn bytes_transferred(&self) -> u64 {
        self.bytes_transferred
    }

    pub fn link(&self) -> Option<LinkId> {
        self.link
    }

    pub fn handshake(&self) -> &HandshakeCoordinator {
        &self.handshake
    }

    pub fn timers(&self) -> &LifecycleTimers {
        &self.timers
    }

    /// Entering receive mode: the connect attempt is under way.
    pub fn start(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();
        self.set_state(SessionState::Connecting, &mut actions);
        actions
    }

    fn set_state(&mut self, to: SessionState, actions: &mut Vec<Action>) {
        if self.machine.advance(to) {
            actions.push(Action::state(to));
        }
    }

    fn on_metadata(&mut self, metadata: FileMetadata, now: Instant, actions: &mut Vec<Action>) {
        if !self.handshake.accept(&metadata) {
            return;
        }
        info!(name = %metadata.name, size = metadata.size, mime = %metadata.mime_type, "metadata accepted");
        self.metadata = Some(metadata.clone());
        actions.push(Action::emit(SessionEvent::Metadata(metadata.clone())));
        self.set_state(SessionState::Transferring, actions);

        let mut flow = ReceiveFlow::new(metadata, self.key);
        let step = flow.start();
        self.flow = Some(flow);
        self.advance(step, now, actions);
    }

    fn on_chunk(&mut self, chunk: ChunkPayload, now: Instant, actions: &mut Vec<Action>) {
        let Some(flow) = self.flow.as_mut() else {
            self.fail(
                SessionError::MalformedMessage(format!("chunk at offset {} before metadata", chunk.offset)),
                actions,
            );
            return;
        };
        match flow.on_chunk(chunk) {
            Ok(step) => {
                self.bytes_transferred = flow.bytes_transferred();
                let progress = flow.progress();
                actions.push(Action::emit(SessionEvent::Progress {
                    bytes: progress.bytes(),
                    total: progress.total(),
                    percent: progress.percent(),
                }));
                self.advance(step, now, actions);
            }
            Err(e) => self.fail(SessionError::MalformedMessage(e.to_string()), actions),
        }
    }

    /// Requests the next chunk or wraps up the transfer.
    fn advance(&mut self, step: FlowStep, now: Instant, actions: &mut Vec<Action>) {
        let Some(link) = self.link else { return };
        match step {
            FlowStep::Request(offset) => {
                debug!(%link, offset, "requesting chunk");
                actions.push(Action::Send {
                    link,
                    frame: Frame::request_chunk(offset),
                });
            }
            FlowStep::Finished => {
                let Some(flow) = self.flow.take() else { return };
                match flow.finish() {
                    Ok(file) => {
                        self.bytes_transferred = file.metadata().size;
                        info!(%link, name = %file.metadata().name, size = file.metadata().size, "file received");
                        if file.metadata().size == 0 {
                            actions.push(Action::emit(SessionEvent::Progress {
                                bytes: 0,
                                total: 0,
                                percent: 100,
                            }));
                        }
                        self.set_state(SessionState::Complete, actions);
                        actions.push(Action::emit(SessionEvent::Received(file)));
                        if let Some(event) = self.timers.arm_self_destruct(now) {
                            actions.push(Action::timer(event));
                        }
                    }
                    Err(e) => self.fail(e.into(), actions),
                }
            }
        }
    }

    /// Session-fatal error: report, drop the link, go to `Errored`.
    fn fail(&mut self, error: SessionError, actions: &mut Vec<Action>) {
        warn!(link = ?self.link, "receive session failed: {error}");
        self.handshake.cancel();
        self.flow = None;
        if let Some(link) = self.link.take() {
            actions.push(Action::Close { link });
            if let Some(event) = self.timers.stop_counter() {
                actions.push(Action::timer(event));
            }
        }
        self.set_state(SessionState::Errored, actions);
        actions.push(Action::emit(SessionEvent::Error { link: None, error }));
    }
}

impl SessionCore for ReceiverSession {
    fn on_open(&mut self, link: LinkId, now: Instant) -> Vec<Action> {
        let mut actions = Vec::new();
        if self.link.is_some() || self.machine.state() != SessionState::Connecting {
            debug!(%link, "ignoring extra link");
            actions.push(Action::Close { link });
            return actions;
        }
        self.link = Some(link);
        info!(%link, "connected to sender");
        self.set_state(SessionState::Connected, &mut actions);
        if let Some(event) = self.timers.start_counter(now) {
            actions.push(Action::timer(event));
        }
        if self.handshake.on_open(now) {
            actions.push(Action::Send {
                link,
                frame: Frame::RequestMetadata,
            });
        }
        actions
    }

    fn on_message(&mut self, link: LinkId, msg: Message, now: Instant) -> Vec<Action> {
        let mut actions = Vec::new();
        if self.link != Some(link) || self.machine.state().is_terminal() {
            return actions;
        }
        let frame = match Frame::from_message(&msg) {
            Ok(frame) => frame,
            Err(e) => {
                self.fail(e.into(), &mut actions);
                return actions;
            }
        };
        match frame {
            Frame::Metadata(metadata) => self.on_metadata(metadata, now, &mut actions),
            Frame::Chunk(chunk) => self.on_chunk(chunk, now, &mut actions),
            Frame::Chat(message) => actions.push(Action::emit(SessionEvent::Chat { link, message })),
            Frame::RequestMetadata | Frame::RequestChunk(_) => {
                warn!(%link, msg_type = ?msg.msg_type, "ignoring sender-bound message");
            }
        }
        actions
    }

    fn on_invalid(&mut self, link: LinkId, reason: String) -> Vec<Action> {
        let mut actions = Vec::new();
        if self.link == Some(link) && !self.machine.state().is_terminal() {
            self.fail(SessionError::MalformedMessage(reason), &mut actions);
        }
        actions
    }

    fn on_closed(&mut self, link: LinkId, _now: Instant) -> Vec<Action> {
        let mut actions = Vec::new();
        if self.link != Some(link) {
            return actions;
        }
        self.link = None;
        self.handshake.cancel();
        if let Some(event) = self.timers.stop_counter() {
            actions.push(Action::timer(event));
        }

        let total = self.metadata.as_ref().map_or(0, |m| m.size);
        let mid_transfer = self.machine.state() == SessionState::Transferring
            && self.bytes_transferred > 0
            && self.bytes_transferred < total;
        if self.machine.state().is_terminal() {
            debug!(%link, state = %self.machine.state(), "link closed after session ended");
        } else if mid_transfer {
            warn!(%link, bytes = self.bytes_transferred, total, "sender went away mid-transfer");
            self.flow = None;
            self.set_state(SessionState::Errored, &mut actions);
            actions.push(Action::emit(SessionEvent::Error {
                link: Some(link),
                error: SessionError::UnexpectedClosure {
                    bytes: self.bytes_transferred,
                    total,
                },
            }));
        } else {
            info!(%link, "link to sender closed");
            self.set_state(SessionState::Closed, &mut actions);
        }
        actions
    }

    fn on_deadline(&mut self, now: Instant) -> Vec<Action> {
        let mut actions = Vec::new();
        if let Some(link) = self.link
            && self.handshake.poll(now)
        {
            debug!(%link, attempt = self.handshake.attempts(), "re-requesting metadata");
            actions.push(Action::Send {
                link,
                frame: Frame::RequestMetadata,
            });
        }
        actions.extend(self.timers.poll(now).into_iter().map(Action::timer));
        actions
    }

    fn next_deadline(&self) -> Option<Instant> {
        match (self.handshake.deadline(), self.timers.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn chat(&mut self, text: String) -> Vec<Action> {
        match self.link {
            Some(link) => vec![Action::Send {
                link,
                frame: Frame::chat(text, self.display_name.clone()),
            }],
            None => {
                debug!("chat dropped, no link");
                Vec::new()
            }
        }
    }

    fn teardown(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();
        self.handshake.cancel();
        self.timers.clear();
        if let Some(link) = self.link.take() {
            actions.push(Action::Close { link });
        }
        self.flow = None;
        self.metadata = None;
        self.bytes_transferred = 0;
        self.set_state(SessionState::Idle, &mut actions);
        info!("receive session torn down");
        actions.push(Action::emit(SessionEvent::TornDown));
        actions
    }
}
