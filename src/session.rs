//! # Secure Session Management
//!
//! Ties a [`Transport`] to a [`FrameCodec`] once the handshake has produced
//! an acknowledged key. Any error closes the session for good; nothing is
//! retried on the same connection.

use tracing::{debug, info, warn};

use crate::config::EndpointConfig;
use crate::error::{ProtocolError, ProtocolResult};
use crate::frame::FrameCodec;
use crate::handshake::{ClientHandshake, ResponderIdentity, ServerHandshake};
use crate::transport::{Transport, TransportStats};
use crate::PEM_BUFFER_SIZE;

/// Reply buffer of the plain (unencrypted) exchange
pub const PLAIN_REPLY_BUFFER_SIZE: usize = 1024;

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Session is active and can send/receive
    Active,
    /// Session is closed
    Closed,
}

/// Secure session for encrypted communication
pub struct SecureSession {
    transport: Transport,
    codec: FrameCodec,
    state: SessionState,
    messages_sent: u64,
    messages_received: u64,
}

impl SecureSession {
    /// Connect and run the initiator handshake
    pub async fn connect(config: &EndpointConfig) -> ProtocolResult<Self> {
        info!("Connecting to {}", config.address());
        let mut transport = Transport::connect(&config.host, config.port, config.timeout()).await?;

        let mut handshake = ClientHandshake::new(config.expected_hostname.clone());
        let key = handshake.run(&mut transport).await?;

        Ok(Self::established(transport, FrameCodec::new(key)))
    }

    /// Run the responder handshake on an accepted connection
    pub async fn accept(
        mut transport: Transport,
        identity: &ResponderIdentity,
    ) -> ProtocolResult<Self> {
        let mut handshake = ServerHandshake::new(identity);
        let key = handshake.run(&mut transport).await?;

        Ok(Self::established(transport, FrameCodec::new(key)))
    }

    fn established(transport: Transport, codec: FrameCodec) -> Self {
        Self {
            transport,
            codec,
            state: SessionState::Active,
            messages_sent: 0,
            messages_received: 0,
        }
    }

    fn ensure_active(&self) -> ProtocolResult<()> {
        match self.state {
            SessionState::Active => Ok(()),
            SessionState::Closed => Err(ProtocolError::ConnectionClosed),
        }
    }

    /// Close the session if `result` is an error
    fn track<T>(&mut self, result: ProtocolResult<T>) -> ProtocolResult<T> {
        if result.is_err() {
            self.state = SessionState::Closed;
        }
        result
    }

    /// Encrypt `plaintext` into a frame and write it
    pub async fn send_message(&mut self, plaintext: &[u8]) -> ProtocolResult<()> {
        self.ensure_active()?;

        let result = match self.codec.encode(plaintext) {
            Ok(frame) => self.transport.send(&frame.to_bytes()).await,
            Err(e) => Err(e),
        };
        self.track(result)?;

        self.messages_sent += 1;
        debug!("Sent frame of {} plaintext bytes", plaintext.len());
        Ok(())
    }

    /// Read one frame and decrypt it
    pub async fn recv_message(&mut self) -> ProtocolResult<Vec<u8>> {
        self.ensure_active()?;

        let result = match self.transport.recv(PEM_BUFFER_SIZE).await {
            Ok(data) => self.codec.decode_bytes(&data),
            Err(e) => Err(e),
        };
        let plaintext = self.track(result)?;

        self.messages_received += 1;
        debug!("Received frame of {} plaintext bytes", plaintext.len());
        Ok(plaintext)
    }

    /// Shut the connection down; the socket is released on drop
    pub async fn close(mut self) -> ProtocolResult<()> {
        self.state = SessionState::Closed;
        self.transport.shutdown().await
    }

    /// Get current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Messages sent
    pub fn messages_sent(&self) -> u64 {
        self.messages_sent
    }

    /// Messages received
    pub fn messages_received(&self) -> u64 {
        self.messages_received
    }

    /// Traffic counters of the underlying transport
    pub fn stats(&self) -> TransportStats {
        self.transport.stats()
    }
}

/// Full initiator run: handshake, one message out, one reply back
pub async fn exchange_message(config: &EndpointConfig, message: &[u8]) -> ProtocolResult<Vec<u8>> {
    let mut session = SecureSession::connect(config).await?;

    session.send_message(message).await?;
    let reply = session.recv_message().await?;

    info!("Exchange finished: {}", session.stats());
    if let Err(e) = session.close().await {
        warn!("Shutdown after a completed exchange failed: {}", e);
    }

    Ok(reply)
}

/// Unauthenticated, unencrypted request/reply against the same endpoint
///
/// Offers no security at all; kept for talking to plain echo services.
pub async fn plain_exchange(config: &EndpointConfig, message: &[u8]) -> ProtocolResult<Vec<u8>> {
    let mut transport = Transport::connect(&config.host, config.port, config.timeout()).await?;

    transport.send(message).await?;
    transport.recv(PLAIN_REPLY_BUFFER_SIZE).await
}
