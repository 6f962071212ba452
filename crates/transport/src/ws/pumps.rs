//! WebSocket read/write pumps for one link.

use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use roomdrop_protocol::Message;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message as WsMessage};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::link::{Delivery, Inbox, LinkId};

/// Drains the link's outbound queue as JSON text frames and sends
/// keepalive pings.
pub(crate) async fn write_pump<S>(
    mut sink: S,
    link: LinkId,
    mut rx: mpsc::Receiver<Message>,
    mut control_rx: mpsc::Receiver<WsMessage>,
    ping_period: Duration,
    cancel: CancellationToken,
) where
    S: Sink<WsMessage, Error = tungstenite::Error> + Send + Unpin,
{
    let mut ping_interval = tokio::time::interval(ping_period);
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ping_interval.tick().await; // Skip immediate first tick.

    loop {
        tokio::select! {
            biased;

            msg = rx.recv() => {
                let Some(msg) = msg else { break };
                let json = match msg.to_json() {
                    Ok(json) => json,
                    Err(e) => {
                        warn!(%link, "dropping unencodable message: {e}");
                        continue;
                    }
                };
                if let Err(e) = sink.send(WsMessage::Text(json.into())).await {
                    warn!(%link, "write pump send error: {e}");
                    break;
                }
            }

            ctrl = control_rx.recv() => {
                let Some(ctrl) = ctrl else { break };
                if let Err(e) = sink.send(ctrl).await {
                    warn!(%link, "write pump control error: {e}");
                    break;
                }
            }

            _ = ping_interval.tick() => {
                trace!(%link, "ping");
                if let Err(e) = sink.send(WsMessage::Ping(Vec::new().into())).await {
                    warn!(%link, "write pump ping error: {e}");
                    break;
                }
            }

            _ = cancel.cancelled() => break,
        }
    }

    cancel.cancel();
    // Best-effort close frame.
    let _ = sink.close().await;
}

/// Reads frames into the inbox until the link dies.
///
/// Any inbound frame resets the read deadline; a link that stays silent
/// for `pong_wait` is considered dead. Does not emit `Closed`; the caller
/// does once both pumps are done.
pub(crate) async fn read_pump<S>(
    mut stream: S,
    link: LinkId,
    inbox: Inbox,
    control_tx: mpsc::Sender<WsMessage>,
    pong_wait: Duration,
    cancel: CancellationToken,
) where
    S: Stream<Item = Result<WsMessage, tungstenite::Error>> + Send + Unpin,
{
    let deadline = tokio::time::sleep(pong_wait);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            () = &mut deadline => {
                warn!(%link, "read deadline expired, closing link");
                break;
            }

            frame = stream.next() => {
                let ws_msg = match frame {
                    Some(Ok(m)) => m,
                    Some(Err(e)) => {
                        warn!(%link, "read pump error: {e}");
                        break;
                    }
                    None => {
                        debug!(%link, "stream ended");
                        break;
                    }
                };
                deadline.as_mut().reset(tokio::time::Instant::now() + pong_wait);

                match ws_msg {
                    WsMessage::Text(text) => {
                        let delivery = match Message::from_json(text.as_str()) {
                            Ok(msg) => Delivery::message(link, msg),
                            Err(e) => {
                                warn!(%link, "invalid frame: {e}");
                                Delivery::invalid(link, e.to_string())
                            }
                        };
                        if inbox.send(delivery).await.is_err() {
                            break;
                        }
                    }
                    WsMessage::Ping(data) => {
                        let _ = control_tx.try_send(WsMessage::Pong(data));
                    }
                    WsMessage::Pong(_) => trace!(%link, "pong"),
                    WsMessage::Close(_) => {
                        debug!(%link, "received close frame");
                        break;
                    }
                    WsMessage::Binary(_) | WsMessage::Frame(_) => {
                        trace!(%link, "ignoring non-text frame");
                    }
                }
            }
        }
    }

    cancel.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LinkEvent;
    use futures_util::stream;
    use roomdrop_protocol::MessageType;

    fn frames(
        items: Vec<WsMessage>,
    ) -> impl Stream<Item = Result<WsMessage, tungstenite::Error>> + Send + Unpin {
        stream::iter(items.into_iter().map(Ok))
    }

    #[tokio::test]
    async fn read_pump_delivers_text_and_flags_garbage() {
        let link = LinkId::next();
        let (inbox, mut rx) = mpsc::channel(8);
        let (control_tx, mut control_rx) = mpsc::channel(8);
        let input = frames(vec![
            WsMessage::Text(r#"{"type":"request-metadata"}"#.into()),
            WsMessage::Ping(vec![1, 2].into()),
            WsMessage::Binary(vec![0u8; 4].into()),
            WsMessage::Text("not json".into()),
        ]);

        read_pump(
            input,
            link,
            inbox,
            control_tx,
            Duration::from_secs(30),
            CancellationToken::new(),
        )
        .await;

        let first = rx.recv().await.unwrap();
        assert_eq!(first.link, link);
        assert!(
            matches!(first.event, LinkEvent::Message(ref m) if m.msg_type == MessageType::RequestMetadata)
        );
        assert!(matches!(rx.recv().await.unwrap().event, LinkEvent::Invalid(_)));
        assert!(rx.try_recv().is_err());
        assert!(matches!(control_rx.try_recv(), Ok(WsMessage::Pong(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn read_pump_times_out_silent_link() {
        let (inbox, _rx) = mpsc::channel(8);
        let (control_tx, _control_rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        read_pump(
            stream::pending::<Result<WsMessage, tungstenite::Error>>(),
            LinkId::next(),
            inbox,
            control_tx,
            Duration::from_secs(30),
            cancel.clone(),
        )
        .await;
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn write_pump_encodes_messages() {
        let mut sent: Vec<WsMessage> = Vec::new();
        let sink = (&mut sent).sink_map_err(|e: std::convert::Infallible| match e {});
        let (tx, rx) = mpsc::channel(8);
        let (_control_tx, control_rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        tx.send(Message::bare(MessageType::RequestMetadata)).await.unwrap();
        drop(tx);
        write_pump(
            sink,
            LinkId::next(),
            rx,
            control_rx,
            Duration::from_secs(5),
            cancel.clone(),
        )
        .await;

        assert_eq!(
            sent.first(),
            Some(&WsMessage::Text(r#"{"type":"request-metadata"}"#.into()))
        );
        assert!(cancel.is_cancelled());
    }
}
