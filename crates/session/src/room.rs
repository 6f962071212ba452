//! Sender session core: a room of independent receiver links sharing one
//! read-only source.

use std::collections::BTreeMap;
use std::sync::Arc;

use roomdrop_protocol::{ChatMessage, ChunkRequest, FileMetadata, Frame, Message};
use roomdrop_transfer::{ChunkSource, ProgressMeter, TransferError};
use roomdrop_transport::LinkId;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::actor::SessionCore;
use crate::event::{Action, SessionEvent};
use crate::flow::serve_chunk;
use crate::state::{Role, StateMachine};
use crate::timers::LifecycleTimers;
use crate::{SessionConfig, SessionError, SessionState};

/// The file a sender shares.
#[derive(Clone)]
pub struct FileOffer {
    metadata: FileMetadata,
    source: Arc<dyn ChunkSource>,
}

impl FileOffer {
    /// The metadata size is taken from the source.
    pub fn new(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        source: Arc<dyn ChunkSource>,
    ) -> Self {
        let metadata = FileMetadata::new(name, source.size(), mime_type);
        Self { metadata, source }
    }

    pub fn metadata(&self) -> &FileMetadata {
        &self.metadata
    }

    pub fn source(&self) -> &Arc<dyn ChunkSource> {
        &self.source
    }
}

impl std::fmt::Debug for FileOffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileOffer")
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerPhase {
    /// Linked, has not asked for metadata.
    Connected,
    Transferring,
    Complete,
}

#[derive(Debug)]
struct Peer {
    phase: PeerPhase,
    progress: ProgressMeter,
    metadata_sent: u32,
}

/// Sans-IO sender. Each receiver link is isolated: its own handshake
/// replies, its own progress.
pub struct Room {
    machine: StateMachine,
    offer: FileOffer,
    key: u8,
    chunk_size: usize,
    display_name: Option<String>,
    peers: BTreeMap<LinkId, Peer>,
    served: usize,
    empty_notified: bool,
    timers: LifecycleTimers,
}

impl Room {
    pub fn new(offer: FileOffer, key: u8, config: &SessionConfig) -> Self {
        Self {
            machine: StateMachine::new(Role::Sender),
            offer,
            key,
            chunk_size: config.chunk_size,
            display_name: config.display_name.clone(),
            peers: BTreeMap::new(),
            served: 0,
            empty_notified: false,
            timers: LifecycleTimers::new(config.timer_tick, config.self_destruct_after),
        }
    }

    pub fn state(&self) -> SessionState {
        self.machine.state()
    }

    pub fn metadata(&self) -> &FileMetadata {
        self.offer.metadata()
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn peer_phase(&self, link: LinkId) -> Option<PeerPhase> {
        self.peers.get(&link).map(|p| p.phase)
    }

    /// How often `link` asked for metadata.
    pub fn metadata_requests(&self, link: LinkId) -> Option<u32> {
        self.peers.get(&link).map(|p| p.metadata_sent)
    }

    /// Receivers that got every byte, including ones that left since.
    pub fn served_count(&self) -> usize {
        self.served
    }

    pub fn timers(&self) -> &LifecycleTimers {
        &self.timers
    }

    /// Entering send mode: the listener is being created.
    pub fn start(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();
        self.set_state(SessionState::Connecting, &mut actions);
        actions
    }

    /// Sends `frame` to every open link except `except`.
    pub fn broadcast(&self, frame: &Frame, except: Option<LinkId>) -> Vec<Action> {
        self.peers
            .keys()
            .filter(|link| Some(**link) != except)
            .map(|&link| Action::Send {
                link,
                frame: frame.clone(),
            })
            .collect()
    }

    fn set_state(&mut self, to: SessionState, actions: &mut Vec<Action>) {
        if self.machine.advance(to) {
            actions.push(Action::state(to));
        }
    }

    fn on_request_metadata(&mut self, link: LinkId, now: Instant, actions: &mut Vec<Action>) {
        let Some(peer) = self.peers.get_mut(&link) else { return };
        peer.metadata_sent += 1;
        trace!(%link, count = peer.metadata_sent, "metadata requested");
        actions.push(Action::Send {
            link,
            frame: Frame::Metadata(self.offer.metadata().clone()),
        });
        if peer.phase != PeerPhase::Connected {
            return;
        }
        peer.phase = PeerPhase::Transferring;
        if self.machine.state() == SessionState::Connected {
            self.set_state(SessionState::Transferring, actions);
        }
        if self.offer.metadata().size == 0 {
            self.complete_peer(link, now, actions);
        }
    }

    fn on_request_chunk(
        &mut self,
        link: LinkId,
        request: ChunkRequest,
        now: Instant,
        actions: &mut Vec<Action>,
    ) {
        let chunk = match serve_chunk(self.offer.source().as_ref(), request, self.chunk_size, self.key)
        {
            Ok(chunk) => chunk,
            Err(e @ TransferError::OffsetOutOfRange { .. }) => {
                self.reject_link(link, e.to_string(), actions);
                return;
            }
            Err(e) => {
                self.fail(e.into(), actions);
                return;
            }
        };
        let end = chunk.end();
        trace!(%link, offset = request.offset, len = chunk.buffer.len(), "serving chunk");
        actions.push(Action::Send {
            link,
            frame: Frame::Chunk(chunk),
        });

        let Some(peer) = self.peers.get_mut(&link) else { return };
        let percent = peer.progress.update(end);
        actions.push(Action::emit(SessionEvent::PeerProgress {
            link,
            bytes: peer.progress.bytes(),
            total: peer.progress.total(),
            percent,
        }));
        if peer.progress.is_complete() && peer.phase != PeerPhase::Complete {
            self.complete_peer(link, now, actions);
        }
    }

    fn on_chat(&mut self, link: LinkId, message: ChatMessage, actions: &mut Vec<Action>) {
        debug!(%link, "relaying chat");
        actions.extend(self.broadcast(&Frame::Chat(message.clone()), Some(link)));
        actions.push(Action::emit(SessionEvent::Chat { link, message }));
    }

    fn complete_peer(&mut self, link: LinkId, now: Instant, actions: &mut Vec<Action>) {
        let Some(peer) = self.peers.get_mut(&link) else { return };
        peer.phase = PeerPhase::Complete;
        self.served += 1;
        info!(%link, served = self.served, "receiver has the whole file");
        actions.push(Action::emit(SessionEvent::Served { link }));
        if self.machine.state() == SessionState::Transferring {
            self.set_state(SessionState::Complete, actions);
        }
        self.update_self_destruct(now, actions);
    }

    /// Armed once someone was served and every open link is complete.
    fn update_self_destruct(&mut self, now: Instant, actions: &mut Vec<Action>) {
        let idle = self.served > 0 && self.peers.values().all(|p| p.phase == PeerPhase::Complete);
        if idle {
            if let Some(event) = self.timers.arm_self_destruct(now) {
                actions.push(Action::timer(event));
            }
        } else {
            self.timers.disarm_self_destruct();
        }
    }

    /// Link-local protocol violation: drop that receiver only.
    fn reject_link(&mut self, link: LinkId, reason: String, actions: &mut Vec<Action>) {
        warn!(%link, "malformed message from receiver: {reason}");
        actions.push(Action::Close { link });
        actions.push(Action::emit(SessionEvent::Error {
            link: Some(link),
            error: SessionError::MalformedMessage(reason),
        }));
    }

    /// The source failed; nobody can be served any more.
    fn fail(&mut self, error: SessionError, actions: &mut Vec<Action>) {
        warn!("send session failed: {error}");
        actions.extend(self.peers.keys().map(|&link| Action::Close { link }));
        self.timers.clear();
        self.set_state(SessionState::Errored, actions);
        actions.push(Action::emit(SessionEvent::Error { link: None, error }));
    }
}

impl SessionCore for Room {
    fn on_open(&mut self, link: LinkId, now: Instant) -> Vec<Action> {
        let mut actions = Vec::new();
        if self.machine.state().is_terminal() {
            actions.push(Action::Close { link });
            return actions;
        }
        self.peers.insert(
            link,
            Peer {
                phase: PeerPhase::Connected,
                progress: ProgressMeter::new(self.offer.metadata().size),
                metadata_sent: 0,
            },
        );
        self.empty_notified = false;
        info!(%link, peers = self.peers.len(), "receiver joined");
        if self.machine.state() == SessionState::Connecting {
            self.set_state(SessionState::Connected, &mut actions);
        }
        if let Some(event) = self.timers.start_counter(now) {
            actions.push(Action::timer(event));
        }
        actions.push(Action::emit(SessionEvent::PeerJoined {
            link,
            peers: self.peers.len(),
        }));
        self.update_self_destruct(now, &mut actions);
        actions
    }

    fn on_message(&mut self, link: LinkId, msg: Message, now: Instant) -> Vec<Action> {
        let mut actions = Vec::new();
        if !self.peers.contains_key(&link) || self.machine.state().is_terminal() {
            return actions;
        }
        let frame = match Frame::from_message(&msg) {
            Ok(frame) => frame,
            Err(e) => {
                self.reject_link(link, e.to_string(), &mut actions);
                return actions;
            }
        };
        match frame {
            Frame::RequestMetadata => self.on_request_metadata(link, now, &mut actions),
            Frame::RequestChunk(request) => self.on_request_chunk(link, request, now, &mut actions),
            Frame::Chat(message) => self.on_chat(link, message, &mut actions),
            Frame::Metadata(_) | Frame::Chunk(_) => {
                warn!(%link, msg_type = ?msg.msg_type, "ignoring receiver-bound message");
            }
        }
        actions
    }

    fn on_invalid(&mut self, link: LinkId, reason: String) -> Vec<Action> {
        let mut actions = Vec::new();
        if self.peers.contains_key(&link) && !self.machine.state().is_terminal() {
            self.reject_link(link, reason, &mut actions);
        }
        actions
    }

    fn on_closed(&mut self, link: LinkId, now: Instant) -> Vec<Action> {
        let mut actions = Vec::new();
        let Some(peer) = self.peers.remove(&link) else {
            return actions;
        };
        let bytes = peer.progress.bytes();
        let total = peer.progress.total();
        if peer.phase != PeerPhase::Complete && bytes > 0 && bytes < total {
            warn!(%link, bytes, total, "receiver left mid-transfer");
            actions.push(Action::emit(SessionEvent::Error {
                link: Some(link),
                error: SessionError::UnexpectedClosure { bytes, total },
            }));
        }
        info!(%link, peers = self.peers.len(), "receiver left");
        actions.push(Action::emit(SessionEvent::PeerLeft {
            link,
            peers: self.peers.len(),
        }));

        if self.peers.is_empty() {
            if let Some(event) = self.timers.stop_counter() {
                actions.push(Action::timer(event));
            }
            if !self.empty_notified {
                self.empty_notified = true;
                info!("room is empty");
                actions.push(Action::emit(SessionEvent::RoomEmpty));
            }
        }
        if !self.machine.state().is_terminal() {
            self.update_self_destruct(now, &mut actions);
        }
        actions
    }

    fn on_deadline(&mut self, now: Instant) -> Vec<Action> {
        self.timers.poll(now).into_iter().map(Action::timer).collect()
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    fn chat(&mut self, text: String) -> Vec<Action> {
        self.broadcast(&Frame::chat(text, self.display_name.clone()), None)
    }

    fn teardown(&mut self) -> Vec<Action> {
        let mut actions: Vec<Action> = self.peers.keys().map(|&link| Action::Close { link }).collect();
        self.peers.clear();
        self.timers.clear();
        self.set_state(SessionState::Idle, &mut actions);
        info!(served = self.served, "room torn down");
        actions.push(Action::emit(SessionEvent::TornDown));
        actions
    }
}
