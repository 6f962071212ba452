use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, bail};
use indicatif::{MultiProgress, ProgressBar};
use roomdrop_session::{FileOffer, SendSession, SessionEvent};
use roomdrop_transfer::{FileSource, calculate_file_checksum};
use roomdrop_transport::{LinkId, WsTransport};

use super::{SHARE_LINK_BASE, bar_style};
use crate::config::Config;
use crate::mime;

pub async fn run(
    file: &Path,
    port: Option<u16>,
    name: Option<String>,
    config: &Config,
) -> anyhow::Result<()> {
    if file.is_dir() {
        bail!("{} is a directory; only single files can be shared", file.display());
    }
    let source = FileSource::open(file).with_context(|| format!("opening {}", file.display()))?;
    let file_name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .context("file has no name")?;
    let checksum = calculate_file_checksum(file)?;
    let offer = FileOffer::new(file_name.clone(), mime::guess(&file_name), Arc::new(source));
    let size = offer.metadata().size;

    let mut session_config = config.session_config();
    if let Some(name) = name {
        session_config.display_name = Some(name);
    }
    let transport = Arc::new(WsTransport::new(config.ws_config(port, None)));
    let session = SendSession::start(transport, offer, session_config)
        .await
        .context("opening room")?;

    let code = session.code().clone();
    println!("Sharing {file_name} ({size} bytes)");
    println!("  code:   {code}");
    println!("  link:   {}", code.share_link(SHARE_LINK_BASE));
    println!("  sha256: {checksum}");
    if let Some(addr) = session.local_addr() {
        println!("  port:   {}", addr.port());
    }
    println!("Waiting for receivers (Ctrl-C to stop)...");

    serve_until_closed(session, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await
}

/// Reports room events until the room is torn down. `shutdown` resolving
/// resets the room; a room-fatal error resets it and is returned.
async fn serve_until_closed(
    mut session: SendSession,
    shutdown: impl Future<Output = ()>,
) -> anyhow::Result<()> {
    let Some(mut events) = session.take_events() else {
        bail!("session events already taken");
    };
    let bars = MultiProgress::new();
    let mut peers: HashMap<LinkId, ProgressBar> = HashMap::new();
    tokio::pin!(shutdown);
    let mut stopping = false;
    let mut outcome: anyhow::Result<()> = Ok(());

    loop {
        tokio::select! {
            () = &mut shutdown, if !stopping => {
                stopping = true;
                let _ = bars.println("Stopping...");
                session.reset().await.ok();
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    SessionEvent::PeerJoined { link, peers: count } => {
                        let _ = bars.println(format!("receiver {link} joined ({count} connected)"));
                        let bar = bars.add(ProgressBar::new(0));
                        bar.set_style(bar_style());
                        bar.set_prefix(link.to_string());
                        peers.insert(link, bar);
                    }
                    SessionEvent::PeerProgress { link, bytes, total, .. } => {
                        if let Some(bar) = peers.get(&link) {
                            bar.set_length(total);
                            bar.set_position(bytes);
                        }
                    }
                    SessionEvent::Served { link } => {
                        if let Some(bar) = peers.get(&link) {
                            bar.finish_with_message("done");
                        }
                        let _ = bars.println(format!("receiver {link} has the whole file"));
                    }
                    SessionEvent::PeerLeft { link, peers: count } => {
                        if let Some(bar) = peers.remove(&link) {
                            bar.abandon();
                        }
                        let _ = bars.println(format!("receiver {link} left ({count} connected)"));
                    }
                    SessionEvent::RoomEmpty => {
                        let _ = bars.println("room is empty");
                    }
                    SessionEvent::Chat { message, .. } => {
                        let from = message.from.as_deref().unwrap_or("peer");
                        let _ = bars.println(format!("<{from}> {}", message.text));
                    }
                    SessionEvent::SelfDestructIn(left) => {
                        if left.as_secs() % 60 == 0 || left.as_secs() <= 10 {
                            let _ = bars.println(format!("room closes in {}s", left.as_secs()));
                        }
                    }
                    SessionEvent::Error { link: Some(link), error } => {
                        tracing::warn!(%link, "receiver error: {error}");
                    }
                    SessionEvent::Error { link: None, error } => {
                        outcome = Err(anyhow::Error::from(error).context("room failed"));
                        if !stopping {
                            stopping = true;
                            session.reset().await.ok();
                        }
                    }
                    SessionEvent::StateChanged(state) => tracing::debug!(%state, "state"),
                    SessionEvent::TornDown => {
                        if outcome.is_ok() {
                            println!("Room closed.");
                        }
                        break;
                    }
                    other => tracing::trace!(?other, "event"),
                }
            }
        }
    }

    drop(events);
    session.join().await;
    outcome
}
