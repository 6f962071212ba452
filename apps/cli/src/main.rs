//! roomdrop command-line entry point.

mod commands;
mod config;
mod mime;

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::config::Config;

#[derive(Parser)]
#[command(name = "roomdrop")]
#[command(about = "Share a file over the local network with a room code", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use this config file instead of the default one
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a room and share a file
    Send {
        /// File to share
        file: PathBuf,
        /// Port to listen on (default: from config, else auto)
        #[arg(short, long)]
        port: Option<u16>,
        /// Name shown to receivers in chat
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Join a room and download its file
    Receive {
        /// Room code (abc-def#1234) or share link
        code: String,
        /// Directory to save into (default: from config)
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Connect to this address instead of searching the network
        #[arg(long)]
        addr: Option<SocketAddr>,
    },
    /// Print a fresh room code with its identity and key
    Code,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug,roomdrop=trace" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "starting roomdrop");

    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };

    match cli.command {
        Commands::Send { file, port, name } => {
            commands::send::run(&file, port, name, &config).await?;
        }
        Commands::Receive { code, out, addr } => {
            commands::receive::run(&code, out, addr, &config).await?;
        }
        Commands::Code => commands::print_code(),
    }

    Ok(())
}
