//! # Protocol Error Types
//!
//! Every error is fatal to the connection it occurred on.

use thiserror::Error;

/// Main error type for protocol operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Dial failed or did not finish before the deadline
    #[error("Failed to connect to {addr}: {reason}")]
    Connect {
        addr: String,
        reason: String,
    },

    /// No usable certificate in a PEM payload, or malformed DER
    #[error("Certificate parse error: {0}")]
    CertificateParse(String),

    /// Untrusted chain, expired certificate or host name mismatch
    #[error("Certificate verification failed: {0}")]
    CertificateVerification(String),

    /// Verified certificate carries a key we cannot encrypt to
    #[error("Unsupported public key: {0}")]
    UnsupportedKey(String),

    /// Peer answered something other than the exact acknowledgment
    #[error("Acknowledgment mismatch after {stage}: got {received:?}")]
    KeyExchangeAck {
        stage: &'static str,
        received: String,
    },

    /// Frame cannot even hold its IV
    #[error("Frame too short: {len} bytes, need at least {min}")]
    FrameTooShort {
        len: usize,
        min: usize,
    },

    /// Cryptographic operation failed
    #[error("Cryptographic error: {0}")]
    CryptoError(String),

    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid state transition
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition {
        from: String,
        to: String,
    },

    /// Connection closed
    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    /// Read or write did not finish before the deadline
    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type alias for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;

impl ProtocolError {
    /// Build an acknowledgment error, keeping the received bytes printable
    pub fn ack_mismatch(stage: &'static str, received: &[u8]) -> Self {
        ProtocolError::KeyExchangeAck {
            stage,
            received: String::from_utf8_lossy(received).into_owned(),
        }
    }
}

impl From<rsa::Error> for ProtocolError {
    fn from(e: rsa::Error) -> Self {
        ProtocolError::CryptoError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ack_mismatch_display() {
        let err = ProtocolError::ack_mismatch("session key", b"OK");
        let msg = err.to_string();
        assert!(msg.contains("session key"));
        assert!(msg.contains("\"OK\""));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        let err: ProtocolError = io_err.into();
        assert!(matches!(err, ProtocolError::IoError(_)));
    }
}
