use std::net::SocketAddr;
use std::sync::Arc;

use roomdrop_protocol::RoomCode;
use roomdrop_transport::{Delivery, ListenerGuard, Transport};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::actor::{Actor, Command, SessionCore};
use crate::event::{Action, SessionEvent};
use crate::receiver::ReceiverSession;
use crate::room::{FileOffer, Room};
use crate::{SessionConfig, SessionError};

/// Plumbing shared by both handles.
struct Handle {
    code: RoomCode,
    commands: mpsc::Sender<Command>,
    events: Option<mpsc::Receiver<SessionEvent>>,
    task: JoinHandle<()>,
}

impl Handle {
    fn spawn<C: SessionCore>(
        code: RoomCode,
        core: C,
        initial: Vec<Action>,
        inbox: mpsc::Receiver<Delivery>,
        listener: Option<ListenerGuard>,
        config: &SessionConfig,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let (event_tx, event_rx) = mpsc::channel(config.event_buffer);
        let actor = Actor::new(core, inbox, cmd_rx, event_tx, listener);
        let task = tokio::spawn(actor.run(initial));
        Self {
            code,
            commands: cmd_tx,
            events: Some(event_rx),
            task,
        }
    }

    async fn send(&self, cmd: Command) -> Result<(), SessionError> {
        self.commands
            .send(cmd)
            .await
            .map_err(|_| SessionError::Stopped)
    }

    async fn join(self) {
        // Dropping the command sender would itself tear the session down.
        let Handle { code, commands, task, .. } = self;
        if let Err(e) = task.await {
            error!(%code, "session task failed: {e}");
        }
        drop(commands);
    }
}

/// A running sender room.
///
/// Events must be drained from [`take_events`](Self::take_events); the
/// session pauses while its event channel is full. Dropping the handle
/// tears the session down.
pub struct SendSession {
    inner: Handle,
    local_addr: Option<SocketAddr>,
}

impl SendSession {
    /// Generates a fresh room code and starts listening on it.
    pub async fn start(
        transport: Arc<dyn Transport>,
        offer: FileOffer,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        Self::start_with_code(transport, offer, RoomCode::generate(), config).await
    }

    /// Like [`start`](Self::start) with a caller-chosen code.
    pub async fn start_with_code(
        transport: Arc<dyn Transport>,
        offer: FileOffer,
        code: RoomCode,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        let config = config.normalized();
        let identity = code.connect_id();
        let mut room = Room::new(offer, code.key(), &config);
        let initial = room.start();

        let (inbox_tx, inbox_rx) = mpsc::channel(config.event_buffer);
        let guard = transport
            .listen(&identity, inbox_tx)
            .await
            .map_err(SessionError::TransportOpen)?;
        let local_addr = guard.local_addr();
        info!(%identity, name = %room.metadata().name, size = room.metadata().size, "room open");

        Ok(Self {
            inner: Handle::spawn(code, room, initial, inbox_rx, Some(guard), &config),
            local_addr,
        })
    }

    pub fn code(&self) -> &RoomCode {
        &self.inner.code
    }

    /// Socket address of a network listener.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Takes the event stream. Returns `None` after the first call.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<SessionEvent>> {
        self.inner.events.take()
    }

    /// Broadcasts a chat message to every receiver.
    pub async fn chat(&self, text: impl Into<String>) -> Result<(), SessionError> {
        self.inner.send(Command::Chat(text.into())).await
    }

    /// Tears the room down.
    pub async fn reset(&self) -> Result<(), SessionError> {
        self.inner.send(Command::Reset).await
    }

    /// Waits for the session task to exit.
    pub async fn join(self) {
        self.inner.join().await
    }
}

/// A running receiver session.
///
/// The same event-draining and drop rules as [`SendSession`] apply.
pub struct ReceiveSession {
    inner: Handle,
}

impl ReceiveSession {
    /// Connects to the room named by `code`.
    pub async fn start(
        transport: Arc<dyn Transport>,
        code: RoomCode,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        let config = config.normalized();
        let identity = code.connect_id();
        let mut session = ReceiverSession::new(code.key(), &config);
        let initial = session.start();

        let (inbox_tx, inbox_rx) = mpsc::channel(config.event_buffer);
        transport
            .connect(&identity, inbox_tx)
            .await
            .map_err(SessionError::ConnectFailed)?;
        info!(%identity, "joining room");

        Ok(Self {
            inner: Handle::spawn(code, session, initial, inbox_rx, None, &config),
        })
    }

    pub fn code(&self) -> &RoomCode {
        &self.inner.code
    }

    pub fn take_events(&mut self) -> Option<mpsc::Receiver<SessionEvent>> {
        self.inner.events.take()
    }

    /// Sends a chat message to the sender.
    pub async fn chat(&self, text: impl Into<String>) -> Result<(), SessionError> {
        self.inner.send(Command::Chat(text.into())).await
    }

    pub async fn reset(&self) -> Result<(), SessionError> {
        self.inner.send(Command::Reset).await
    }

    pub async fn join(self) {
        self.inner.join().await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::SessionState;
    use roomdrop_protocol::{ChunkPayload, FileMetadata, Frame, MessageType};
    use roomdrop_transfer::MemorySource;
    use roomdrop_transfer::cipher::transform;
    use roomdrop_transport::{LinkEvent, LinkSender, MemoryTransport, TransportError};
    use tokio::time::Instant;

    type Events = mpsc::Receiver<SessionEvent>;

    fn transport() -> Arc<MemoryTransport> {
        Arc::new(MemoryTransport::new())
    }

    fn offer(data: Vec<u8>) -> FileOffer {
        FileOffer::new(
            "report.pdf",
            "application/pdf",
            Arc::new(MemorySource::from(data)),
        )
    }

    fn content(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 256) as u8).collect()
    }

    async fn next(rx: &mut Events) -> SessionEvent {
        tokio::time::timeout(Duration::from_secs(3600), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event stream ended")
    }

    /// Collects events up to and including the first one matching `pred`.
    async fn until(rx: &mut Events, pred: impl Fn(&SessionEvent) -> bool) -> Vec<SessionEvent> {
        let mut seen = Vec::new();
        loop {
            let event = next(rx).await;
            let done = pred(&event);
            seen.push(event);
            if done {
                return seen;
            }
        }
    }

    fn is_received(e: &SessionEvent) -> bool {
        matches!(e, SessionEvent::Received(_))
    }

    fn is_torn_down(e: &SessionEvent) -> bool {
        matches!(e, SessionEvent::TornDown)
    }

    fn states(events: &[SessionEvent]) -> Vec<SessionState> {
        events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::StateChanged(s) => Some(*s),
                _ => None,
            })
            .collect()
    }

    async fn start_pair(data: Vec<u8>) -> (SendSession, ReceiveSession) {
        let transport = transport();
        let send = SendSession::start(transport.clone(), offer(data), SessionConfig::default())
            .await
            .unwrap();
        let recv = ReceiveSession::start(transport, send.code().clone(), SessionConfig::default())
            .await
            .unwrap();
        (send, recv)
    }

    #[tokio::test(start_paused = true)]
    async fn forty_kib_file_arrives_in_three_chunks() {
        let data = content(40 * 1024);
        let (mut send, mut recv) = start_pair(data.clone()).await;
        let mut send_events = send.take_events().unwrap();
        let mut recv_events = recv.take_events().unwrap();
        assert!(recv.take_events().is_none());

        let events = until(&mut recv_events, is_received).await;
        assert_eq!(
            states(&events),
            vec![
                SessionState::Connecting,
                SessionState::Connected,
                SessionState::Transferring,
                SessionState::Complete
            ]
        );
        let progress: Vec<(u64, u8)> = events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::Progress { bytes, percent, .. } => Some((*bytes, *percent)),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![(16384, 40), (32768, 80), (40960, 100)]);
        let Some(SessionEvent::Received(file)) = events.last() else {
            unreachable!()
        };
        assert_eq!(file.data(), data.as_slice());
        assert_eq!(file.metadata().name, "report.pdf");

        let served = until(&mut send_events, |e| matches!(e, SessionEvent::Served { .. })).await;
        let peer_progress: Vec<u64> = served
            .iter()
            .filter_map(|e| match e {
                SessionEvent::PeerProgress { bytes, .. } => Some(*bytes),
                _ => None,
            })
            .collect();
        assert_eq!(peer_progress, vec![16384, 32768, 40960]);
    }

    #[tokio::test]
    async fn join_survives_a_failed_task() {
        let (commands, _rx) = mpsc::channel(1);
        let handle = Handle {
            code: RoomCode::parse("abc-def#1234").unwrap(),
            commands,
            events: None,
            task: tokio::spawn(async { panic!("session task blew up") }),
        };
        handle.join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn receiver_that_stops_reading_is_dropped() {
        let transport = transport();
        let mut send = SendSession::start(transport.clone(), offer(content(10)), SessionConfig::default())
            .await
            .unwrap();
        let mut events = send.take_events().unwrap();

        // Room for the Opened event and nothing else; never drained after it.
        let (tx, mut inbox) = mpsc::channel(1);
        transport.connect(&send.code().connect_id(), tx).await.unwrap();
        assert!(matches!(
            inbox.recv().await.map(|d| d.event),
            Some(LinkEvent::Opened(_))
        ));
        until(&mut events, |e| matches!(e, SessionEvent::PeerJoined { .. })).await;

        for i in 0..roomdrop_transport::SEND_BUFFER_SIZE + 8 {
            send.chat(format!("line {i}")).await.unwrap();
        }
        let seen = until(&mut events, |e| matches!(e, SessionEvent::Error { .. })).await;
        assert!(matches!(
            seen.last(),
            Some(SessionEvent::Error {
                link: Some(_),
                error: SessionError::Send(roomdrop_transport::SendError::Full),
            })
        ));
        let rest = until(&mut events, |e| matches!(e, SessionEvent::PeerLeft { .. })).await;
        assert!(!rest.iter().any(|e| matches!(e, SessionEvent::Error { .. })));
        assert!(matches!(rest.last(), Some(SessionEvent::PeerLeft { peers: 0, .. })));
    }

    /// A hand-driven sender on the raw transport.
    async fn fake_sender(
        transport: &MemoryTransport,
        code: &RoomCode,
    ) -> (ListenerGuard, mpsc::Receiver<Delivery>) {
        let (tx, rx) = mpsc::channel(64);
        let guard = transport.listen(&code.connect_id(), tx).await.unwrap();
        (guard, rx)
    }

    async fn next_delivery(rx: &mut mpsc::Receiver<Delivery>) -> LinkEvent {
        tokio::time::timeout(Duration::from_secs(60), rx.recv())
            .await
            .expect("timed out waiting for delivery")
            .expect("inbox closed")
            .event
    }

    async fn expect_opened(rx: &mut mpsc::Receiver<Delivery>) -> LinkSender {
        match next_delivery(rx).await {
            LinkEvent::Opened(sender) => sender,
            other => panic!("expected Opened, got {other:?}"),
        }
    }

    async fn expect_frame(rx: &mut mpsc::Receiver<Delivery>) -> Frame {
        match next_delivery(rx).await {
            LinkEvent::Message(msg) => Frame::from_message(&msg).unwrap(),
            other => panic!("expected Message, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_sender_reply_transitions_once() {
        let transport = MemoryTransport::new();
        let code = RoomCode::generate();
        let (_guard, mut inbox) = fake_sender(&transport, &code).await;

        let mut recv = ReceiveSession::start(
            Arc::new(transport.clone()),
            code.clone(),
            SessionConfig::default(),
        )
        .await
        .unwrap();
        let mut events = recv.take_events().unwrap();
        let link = expect_opened(&mut inbox).await;

        // Three requests, 500 ms apart, before any reply.
        let started = Instant::now();
        for _ in 0..3 {
            assert_eq!(expect_frame(&mut inbox).await, Frame::RequestMetadata);
        }
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(1000), "{waited:?}");
        assert!(waited < Duration::from_millis(1100), "{waited:?}");

        let data = b"hello world".to_vec();
        let meta = FileMetadata::new("hello.txt", data.len() as u64, "text/plain");
        for _ in 0..3 {
            link.send(Frame::Metadata(meta.clone()).to_message().unwrap())
                .unwrap();
        }

        assert_eq!(expect_frame(&mut inbox).await, Frame::request_chunk(0));
        link.send(
            Frame::Chunk(ChunkPayload {
                offset: 0,
                buffer: transform(&data, code.key()),
            })
            .to_message()
            .unwrap(),
        )
        .unwrap();

        let seen = until(&mut events, is_received).await;
        let transferring = states(&seen)
            .into_iter()
            .filter(|s| *s == SessionState::Transferring)
            .count();
        assert_eq!(transferring, 1);
        assert_eq!(
            seen.iter()
                .filter(|e| matches!(e, SessionEvent::Metadata(_)))
                .count(),
            1
        );

        // No stray chunk request or retry after completion.
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(inbox.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn sender_leaving_mid_transfer_is_reported() {
        let transport = MemoryTransport::new();
        let code = RoomCode::generate();
        let (_guard, mut inbox) = fake_sender(&transport, &code).await;
        let mut recv = ReceiveSession::start(
            Arc::new(transport.clone()),
            code.clone(),
            SessionConfig::default(),
        )
        .await
        .unwrap();
        let mut events = recv.take_events().unwrap();
        let link = expect_opened(&mut inbox).await;
        assert_eq!(expect_frame(&mut inbox).await, Frame::RequestMetadata);

        let data = content(40 * 1024);
        let meta = FileMetadata::new("big.bin", data.len() as u64, "application/octet-stream");
        link.send(Frame::Metadata(meta).to_message().unwrap()).unwrap();
        assert_eq!(expect_frame(&mut inbox).await, Frame::request_chunk(0));
        link.send(
            Frame::Chunk(ChunkPayload {
                offset: 0,
                buffer: transform(&data[..16384], code.key()),
            })
            .to_message()
            .unwrap(),
        )
        .unwrap();
        assert_eq!(expect_frame(&mut inbox).await, Frame::request_chunk(16384));
        link.close();

        let seen = until(&mut events, |e| matches!(e, SessionEvent::Error { .. })).await;
        assert_eq!(states(&seen).last(), Some(&SessionState::Errored));
        assert!(matches!(
            seen.last(),
            Some(SessionEvent::Error {
                error: SessionError::UnexpectedClosure {
                    bytes: 16384,
                    total: 40960
                },
                ..
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn room_serves_receivers_independently() {
        let transport = transport();
        let data = content(40 * 1024);
        let mut send = SendSession::start(transport.clone(), offer(data.clone()), SessionConfig::default())
            .await
            .unwrap();
        let mut send_events = send.take_events().unwrap();

        let mut receivers = Vec::new();
        for _ in 0..3 {
            let mut recv =
                ReceiveSession::start(transport.clone(), send.code().clone(), SessionConfig::default())
                    .await
                    .unwrap();
            let events = recv.take_events().unwrap();
            receivers.push((recv, events));
        }
        for (_, events) in receivers.iter_mut() {
            let seen = until(events, is_received).await;
            let Some(SessionEvent::Received(file)) = seen.last() else {
                unreachable!()
            };
            assert_eq!(file.data(), data.as_slice());
        }

        // One leaves; the others are untouched and the room stays up.
        let (first, _) = receivers.remove(0);
        first.reset().await.unwrap();
        first.join().await;
        let seen = until(&mut send_events, |e| matches!(e, SessionEvent::PeerLeft { .. })).await;
        assert!(matches!(seen.last(), Some(SessionEvent::PeerLeft { peers: 2, .. })));
        assert!(!seen.iter().any(|e| matches!(e, SessionEvent::RoomEmpty)));

        for (recv, _) in receivers.drain(..) {
            recv.reset().await.unwrap();
            recv.join().await;
        }

        // The room eventually self-destructs; RoomEmpty was reported once.
        let rest = until(&mut send_events, is_torn_down).await;
        let empties = rest
            .iter()
            .filter(|e| matches!(e, SessionEvent::RoomEmpty))
            .count();
        assert_eq!(empties, 1);
        let served = seen
            .iter()
            .chain(rest.iter())
            .filter(|e| matches!(e, SessionEvent::Served { .. }))
            .count();
        assert_eq!(served, 3);
        send.join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn self_destruct_returns_to_idle_after_300s() {
        let (mut send, mut recv) = start_pair(content(1000)).await;
        drop(send.take_events());
        let mut events = recv.take_events().unwrap();

        until(&mut events, is_received).await;
        let completed_at = Instant::now();

        let seen = until(&mut events, is_torn_down).await;
        let elapsed = completed_at.elapsed();
        assert!(elapsed >= Duration::from_secs(300), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(301), "{elapsed:?}");
        assert_eq!(states(&seen).last(), Some(&SessionState::Idle));
        assert!(seen
            .iter()
            .any(|e| matches!(e, SessionEvent::SelfDestructIn(d) if *d == Duration::from_secs(1))));

        // The actor is gone.
        assert!(events.recv().await.is_none());
        assert!(matches!(recv.reset().await, Err(SessionError::Stopped)));
        drop(send);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_cancels_self_destruct() {
        let (mut send, mut recv) = start_pair(content(1000)).await;
        drop(send.take_events());
        let mut events = recv.take_events().unwrap();
        until(&mut events, is_received).await;

        tokio::time::sleep(Duration::from_secs(60)).await;
        recv.reset().await.unwrap();

        let mut torn_down = 0;
        while let Ok(Some(event)) =
            tokio::time::timeout(Duration::from_secs(600), events.recv()).await
        {
            if is_torn_down(&event) {
                torn_down += 1;
            }
        }
        assert_eq!(torn_down, 1);
        recv.join().await;
        send.reset().await.unwrap();
        send.join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn zero_size_file_completes_without_chunks() {
        let (mut send, mut recv) = start_pair(Vec::new()).await;
        let mut send_events = send.take_events().unwrap();
        let mut events = recv.take_events().unwrap();

        let seen = until(&mut events, is_received).await;
        assert!(states(&seen).ends_with(&[SessionState::Transferring, SessionState::Complete]));
        let Some(SessionEvent::Received(file)) = seen.last() else {
            unreachable!()
        };
        assert!(file.data().is_empty());

        let sent = until(&mut send_events, |e| matches!(e, SessionEvent::Served { .. })).await;
        assert!(!sent
            .iter()
            .any(|e| matches!(e, SessionEvent::PeerProgress { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn chat_flows_through_the_room() {
        let transport = transport();
        let mut send = SendSession::start(transport.clone(), offer(content(10)), SessionConfig::default())
            .await
            .unwrap();
        let mut send_events = send.take_events().unwrap();
        let config = SessionConfig {
            display_name: Some("bob".into()),
            ..SessionConfig::default()
        };
        let mut a = ReceiveSession::start(transport.clone(), send.code().clone(), config.clone())
            .await
            .unwrap();
        let mut b = ReceiveSession::start(transport.clone(), send.code().clone(), config)
            .await
            .unwrap();
        let mut a_events = a.take_events().unwrap();
        let mut b_events = b.take_events().unwrap();
        until(&mut a_events, is_received).await;
        until(&mut b_events, is_received).await;

        send.chat("welcome").await.unwrap();
        for events in [&mut a_events, &mut b_events] {
            let seen = until(events, |e| matches!(e, SessionEvent::Chat { .. })).await;
            assert!(matches!(
                seen.last(),
                Some(SessionEvent::Chat { message, .. }) if message.text == "welcome"
            ));
        }

        a.chat("thanks").await.unwrap();
        let seen = until(&mut send_events, |e| matches!(e, SessionEvent::Chat { .. })).await;
        assert!(matches!(
            seen.last(),
            Some(SessionEvent::Chat { message, .. })
                if message.text == "thanks" && message.from.as_deref() == Some("bob")
        ));
        let seen = until(&mut b_events, |e| matches!(e, SessionEvent::Chat { .. })).await;
        assert!(matches!(
            seen.last(),
            Some(SessionEvent::Chat { message, .. }) if message.text == "thanks"
        ));
    }

    #[tokio::test]
    async fn joining_a_missing_room_fails() {
        let result =
            ReceiveSession::start(transport(), RoomCode::generate(), SessionConfig::default()).await;
        assert!(matches!(
            result,
            Err(SessionError::ConnectFailed(TransportError::NoListener(_)))
        ));
    }

    #[tokio::test]
    async fn duplicate_room_fails_to_open() {
        let transport = transport();
        let code = RoomCode::generate();
        let _first = SendSession::start_with_code(
            transport.clone(),
            offer(content(10)),
            code.clone(),
            SessionConfig::default(),
        )
        .await
        .unwrap();
        let second = SendSession::start_with_code(
            transport,
            offer(content(10)),
            code,
            SessionConfig::default(),
        )
        .await;
        assert!(matches!(
            second,
            Err(SessionError::TransportOpen(TransportError::AddressInUse(_)))
        ));
    }

    #[tokio::test]
    async fn malformed_frame_errors_the_receiver() {
        let transport = MemoryTransport::new();
        let code = RoomCode::generate();
        let (_guard, mut inbox) = fake_sender(&transport, &code).await;
        let mut recv = ReceiveSession::start(
            Arc::new(transport.clone()),
            code,
            SessionConfig::default(),
        )
        .await
        .unwrap();
        let mut events = recv.take_events().unwrap();
        let link = expect_opened(&mut inbox).await;

        // A metadata envelope without its payload fails shape validation.
        link.send(roomdrop_protocol::Message::bare(MessageType::Metadata))
            .unwrap();
        let seen = until(&mut events, |e| matches!(e, SessionEvent::Error { .. })).await;
        assert_eq!(states(&seen).last(), Some(&SessionState::Errored));
        assert!(matches!(
            seen.last(),
            Some(SessionEvent::Error {
                error: SessionError::MalformedMessage(_),
                ..
            })
        ));
    }
}
