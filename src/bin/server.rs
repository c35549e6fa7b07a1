//! # sessionwire Server
//!
//! Demo responder: presents a root and leaf certificate, accepts a session
//! key, and answers every message with `server received: <message>`.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use sessionwire::{
    ProtocolError, ProtocolResult, ResponderIdentity, SecureSession, Transport, TransportListener,
};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "sessionwire-server")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Address to listen on
    #[arg(short, long, default_value = "0.0.0.0:9000")]
    listen: SocketAddr,

    /// Root certificate(s) sent as trust anchor (PEM)
    #[arg(long)]
    root_cert: PathBuf,

    /// Leaf certificate presented to clients (PEM)
    #[arg(long)]
    leaf_cert: PathBuf,

    /// Private key of the leaf certificate (PKCS#8 or PKCS#1 PEM)
    #[arg(long)]
    leaf_key: PathBuf,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

async fn handle_client(transport: Transport, identity: &ResponderIdentity) -> ProtocolResult<()> {
    let peer = transport.peer_addr();
    let mut session = SecureSession::accept(transport, identity).await?;
    info!("Session established with {}", peer);

    loop {
        let message = match session.recv_message().await {
            Ok(message) => message,
            Err(ProtocolError::ConnectionClosed) => break,
            Err(e) => return Err(e),
        };
        info!("[{}] Received {} bytes", peer, message.len());

        let mut reply = b"server received: ".to_vec();
        reply.extend_from_slice(&message);
        session.send_message(&reply).await?;
    }

    info!("[{}] {}", peer, session.stats());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install log subscriber")?;

    let identity = ResponderIdentity::from_files(&cli.root_cert, &cli.leaf_cert, &cli.leaf_key)
        .context("Failed to load responder identity")?;

    let listener = TransportListener::bind(cli.listen)
        .await
        .with_context(|| format!("Failed to bind {}", cli.listen))?;
    info!("Server listening on {}", listener.local_addr());

    loop {
        match listener.accept().await {
            Ok((transport, addr)) => {
                info!("New connection from {}", addr);
                let identity = identity.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_client(transport, &identity).await {
                        error!("Client {} error: {}", addr, e);
                    }
                });
            }
            Err(e) => {
                error!("Accept error: {}", e);
            }
        }
    }
}
