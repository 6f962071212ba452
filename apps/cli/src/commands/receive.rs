use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, anyhow, bail};
use indicatif::ProgressBar;
use roomdrop_protocol::RoomCode;
use roomdrop_session::{ReceiveSession, SessionEvent, SessionState};
use roomdrop_transport::WsTransport;

use super::bar_style;
use crate::config::Config;

pub async fn run(
    input: &str,
    out: Option<PathBuf>,
    addr: Option<SocketAddr>,
    config: &Config,
) -> anyhow::Result<()> {
    let code = RoomCode::from_input(input).context("invalid room code")?;
    let out_dir = out.unwrap_or_else(|| config.download_dir.clone());
    let transport = Arc::new(WsTransport::new(config.ws_config(None, addr)));

    println!("Joining room {code}...");
    let mut session = ReceiveSession::start(transport, code, config.session_config())
        .await
        .context("could not reach the room")?;
    let Some(mut events) = session.take_events() else {
        bail!("session events already taken");
    };

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut bar: Option<ProgressBar> = None;
    let mut outcome: anyhow::Result<()> = Err(anyhow!("session ended before the file arrived"));
    let mut stopping = false;

    loop {
        tokio::select! {
            _ = &mut ctrl_c, if !stopping => {
                stopping = true;
                outcome = Err(anyhow!("interrupted"));
                session.reset().await.ok();
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    SessionEvent::Metadata(metadata) => {
                        println!("Receiving {} ({} bytes, {})", metadata.name, metadata.size, metadata.mime_type);
                        let pb = ProgressBar::new(metadata.size);
                        pb.set_style(bar_style());
                        pb.set_prefix("download");
                        bar = Some(pb);
                    }
                    SessionEvent::Progress { bytes, .. } => {
                        if let Some(pb) = &bar {
                            pb.set_position(bytes);
                        }
                    }
                    SessionEvent::Received(file) => {
                        if let Some(pb) = bar.take() {
                            pb.finish_with_message("done");
                        }
                        outcome = file
                            .save_to(&out_dir)
                            .map(|path| {
                                println!("Saved {}", path.display());
                                println!("  sha256: {}", file.sha256());
                            })
                            .map_err(anyhow::Error::from);
                        stopping = true;
                        session.reset().await.ok();
                    }
                    SessionEvent::Chat { message, .. } => {
                        let from = message.from.as_deref().unwrap_or("sender");
                        println!("<{from}> {}", message.text);
                    }
                    SessionEvent::Error { error, .. } => {
                        if let Some(pb) = bar.take() {
                            pb.abandon();
                        }
                        outcome = Err(anyhow::Error::from(error).context("transfer failed"));
                        if !stopping {
                            stopping = true;
                            session.reset().await.ok();
                        }
                    }
                    SessionEvent::StateChanged(SessionState::Closed) if !stopping => {
                        stopping = true;
                        session.reset().await.ok();
                    }
                    SessionEvent::StateChanged(state) => tracing::debug!(%state, "state"),
                    SessionEvent::TornDown => break,
                    other => tracing::trace!(?other, "event"),
                }
            }
        }
    }

    drop(events);
    session.join().await;
    outcome
}
