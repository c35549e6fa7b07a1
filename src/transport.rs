//! # Transport Layer
//!
//! TCP connection with a deadline on every read and write.
//! Each protocol step is one `send` or one `recv`; there is no framing here.

use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{timeout, Duration};
use tracing::debug;

use crate::error::{ProtocolError, ProtocolResult};
use crate::DEFAULT_IO_TIMEOUT_SECS;

/// Default read/write deadline
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(DEFAULT_IO_TIMEOUT_SECS);

/// Transport connection wrapping a TCP stream
///
/// The socket is closed when the transport is dropped.
pub struct Transport {
    /// The underlying TCP stream
    stream: TcpStream,
    /// Deadline applied to each read and each write
    io_timeout: Duration,
    /// Peer address
    peer_addr: SocketAddr,
    /// Local address
    local_addr: SocketAddr,
    /// Bytes sent
    bytes_sent: u64,
    /// Bytes received
    bytes_received: u64,
}

impl Transport {
    /// Create a transport from an existing TCP stream
    pub fn new(stream: TcpStream, io_timeout: Duration) -> ProtocolResult<Self> {
        let peer_addr = stream.peer_addr()?;
        let local_addr = stream.local_addr()?;

        Ok(Self {
            stream,
            io_timeout,
            peer_addr,
            local_addr,
            bytes_sent: 0,
            bytes_received: 0,
        })
    }

    /// Connect to `host:port`, giving up after `io_timeout`
    pub async fn connect(host: &str, port: u16, io_timeout: Duration) -> ProtocolResult<Self> {
        let addr = format!("{}:{}", host, port);

        let stream = timeout(io_timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| ProtocolError::Connect {
                addr: addr.clone(),
                reason: format!("timed out after {:?}", io_timeout),
            })?
            .map_err(|e| ProtocolError::Connect {
                addr: addr.clone(),
                reason: e.to_string(),
            })?;

        stream.set_nodelay(true)?;

        debug!("Connected to {}", addr);
        Self::new(stream, io_timeout)
    }

    /// Get the peer address
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Get the local address
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Get the read/write deadline
    pub fn io_timeout(&self) -> Duration {
        self.io_timeout
    }

    /// Get bytes sent
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    /// Get bytes received
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    /// Write all of `data` before the write deadline
    pub async fn send(&mut self, data: &[u8]) -> ProtocolResult<()> {
        let io_timeout = self.io_timeout;
        let stream = &mut self.stream;

        timeout(io_timeout, async {
            stream.write_all(data).await?;
            stream.flush().await
        })
        .await
        .map_err(|_| ProtocolError::Timeout(io_timeout))?
        .map_err(ProtocolError::IoError)?;

        self.bytes_sent += data.len() as u64;

        Ok(())
    }

    /// One read of at most `limit` bytes before the read deadline
    ///
    /// Whatever a single read returns is the message; nothing is length
    /// prefixed, so a payload larger than `limit` arrives truncated.
    pub async fn recv(&mut self, limit: usize) -> ProtocolResult<Vec<u8>> {
        let mut buf = vec![0u8; limit];

        let n = timeout(self.io_timeout, self.stream.read(&mut buf))
            .await
            .map_err(|_| ProtocolError::Timeout(self.io_timeout))?
            .map_err(ProtocolError::IoError)?;

        if n == 0 {
            return Err(ProtocolError::ConnectionClosed);
        }

        self.bytes_received += n as u64;
        buf.truncate(n);

        Ok(buf)
    }

    /// Shutdown the write half of the connection
    pub async fn shutdown(&mut self) -> ProtocolResult<()> {
        self.stream
            .shutdown()
            .await
            .map_err(ProtocolError::IoError)
    }

    /// Snapshot of the traffic counters
    pub fn stats(&self) -> TransportStats {
        TransportStats {
            peer_addr: self.peer_addr,
            local_addr: self.local_addr,
            bytes_sent: self.bytes_sent,
            bytes_received: self.bytes_received,
        }
    }
}

/// TCP listener wrapper
pub struct TransportListener {
    listener: TcpListener,
    local_addr: SocketAddr,
    io_timeout: Duration,
}

impl TransportListener {
    /// Bind to an address
    pub async fn bind(addr: SocketAddr) -> ProtocolResult<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        Ok(Self {
            listener,
            local_addr,
            io_timeout: DEFAULT_IO_TIMEOUT,
        })
    }

    /// Deadline given to accepted transports
    pub fn with_io_timeout(mut self, io_timeout: Duration) -> Self {
        self.io_timeout = io_timeout;
        self
    }

    /// Get the local address
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept a new connection
    pub async fn accept(&self) -> ProtocolResult<(Transport, SocketAddr)> {
        let (stream, addr) = self.listener.accept().await?;
        stream.set_nodelay(true)?;
        let transport = Transport::new(stream, self.io_timeout)?;
        Ok((transport, addr))
    }
}

/// Transport statistics
#[derive(Debug, Clone)]
pub struct TransportStats {
    pub peer_addr: SocketAddr,
    pub local_addr: SocketAddr,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

impl std::fmt::Display for TransportStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} -> {}: sent={} bytes, recv={} bytes",
            self.local_addr, self.peer_addr, self.bytes_sent, self.bytes_received
        )
    }
}
