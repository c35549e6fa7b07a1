//! # Protocol Handshake
//!
//! Runs the handshake up to an acknowledged session key:
//! 1. Responder sends root certificate(s), initiator answers `ok`
//! 2. Responder sends its leaf certificate, initiator verifies it
//! 3. Initiator sends a fresh session key encrypted to the leaf's RSA key
//! 4. Responder answers `ok`; only then is the key usable
//!
//! ## Security Properties
//!
//! - Server authentication only; the initiator stays anonymous
//! - No forward secrecy: the session key is recoverable with the leaf key

use std::fs;
use std::path::Path;

use rsa::{RsaPrivateKey, RsaPublicKey};
use tracing::{debug, info, warn};

use crate::crypto::{load_private_key_pem, ActiveSessionKey, SessionKey};
use crate::error::{ProtocolError, ProtocolResult};
use crate::transport::Transport;
use crate::trust::{receive_trust_anchor, send_trust_anchor};
use crate::verify::verify_peer;
use crate::{ACK, ACK_BUFFER_SIZE, PEM_BUFFER_SIZE};

/// Handshake progress, for logging and inspection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Nothing exchanged yet
    Initial,
    /// Exchanging the trust anchor
    TrustAnchor,
    /// Exchanging the leaf certificate
    PeerCertificate,
    /// Transporting the session key
    KeyExchange,
    /// Session key acknowledged
    Complete,
    /// Handshake aborted
    Failed,
}

impl std::fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initial => write!(f, "Initial"),
            Self::TrustAnchor => write!(f, "TrustAnchor"),
            Self::PeerCertificate => write!(f, "PeerCertificate"),
            Self::KeyExchange => write!(f, "KeyExchange"),
            Self::Complete => write!(f, "Complete"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Initiator side of the key exchange
///
/// Sends a new random key encrypted to `public_key` and returns it only once
/// the peer has answered with exactly `ok`.
pub async fn establish_session_key(
    transport: &mut Transport,
    public_key: &RsaPublicKey,
) -> ProtocolResult<ActiveSessionKey> {
    let key = SessionKey::generate()?;
    let encrypted = key.encrypt_for(public_key)?;

    transport.send(&encrypted).await?;
    debug!("Sent {} byte encrypted session key", encrypted.len());

    let reply = transport.recv(ACK_BUFFER_SIZE).await?;
    if reply != ACK {
        return Err(ProtocolError::ack_mismatch("session key", &reply));
    }

    Ok(ActiveSessionKey::confirm(key))
}

/// Responder side of the key exchange: decrypt the key, then acknowledge
pub async fn accept_session_key(
    transport: &mut Transport,
    private_key: &RsaPrivateKey,
) -> ProtocolResult<ActiveSessionKey> {
    let encrypted = transport.recv(PEM_BUFFER_SIZE).await?;
    let key = SessionKey::decrypt_from(private_key, &encrypted)?;

    transport.send(ACK).await?;

    Ok(ActiveSessionKey::confirm(key))
}

/// Client-side handshake handler
pub struct ClientHandshake {
    state: HandshakeState,
    expected_hostname: String,
}

impl ClientHandshake {
    /// Create a handshake that expects a certificate for `expected_hostname`
    pub fn new(expected_hostname: impl Into<String>) -> Self {
        Self {
            state: HandshakeState::Initial,
            expected_hostname: expected_hostname.into(),
        }
    }

    /// Get current state
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Check if handshake is complete
    pub fn is_complete(&self) -> bool {
        self.state == HandshakeState::Complete
    }

    /// Run every step; the first error aborts the handshake
    pub async fn run(&mut self, transport: &mut Transport) -> ProtocolResult<ActiveSessionKey> {
        if self.state != HandshakeState::Initial {
            return Err(ProtocolError::InvalidStateTransition {
                from: self.state.to_string(),
                to: "Starting handshake".to_string(),
            });
        }

        match self.drive(transport).await {
            Ok(key) => {
                self.state = HandshakeState::Complete;
                info!("Handshake complete with {}", transport.peer_addr());
                Ok(key)
            }
            Err(e) => {
                warn!("Handshake failed during {}: {}", self.state, e);
                self.state = HandshakeState::Failed;
                Err(e)
            }
        }
    }

    async fn drive(&mut self, transport: &mut Transport) -> ProtocolResult<ActiveSessionKey> {
        self.state = HandshakeState::TrustAnchor;
        let trust_store = receive_trust_anchor(transport).await?;

        self.state = HandshakeState::PeerCertificate;
        let public_key = verify_peer(transport, &trust_store, &self.expected_hostname).await?;
        drop(trust_store);

        self.state = HandshakeState::KeyExchange;
        establish_session_key(transport, &public_key).await
    }
}

/// What a responder presents during the handshake
#[derive(Clone)]
pub struct ResponderIdentity {
    root_pem: Vec<u8>,
    leaf_pem: Vec<u8>,
    private_key: RsaPrivateKey,
}

impl ResponderIdentity {
    /// Build from in-memory PEM and the leaf's private key
    pub fn new(root_pem: Vec<u8>, leaf_pem: Vec<u8>, private_key: RsaPrivateKey) -> Self {
        Self {
            root_pem,
            leaf_pem,
            private_key,
        }
    }

    /// Load root and leaf certificates and the leaf key from PEM files
    pub fn from_files(root_cert: &Path, leaf_cert: &Path, leaf_key: &Path) -> ProtocolResult<Self> {
        let read = |path: &Path| {
            fs::read(path).map_err(|e| {
                ProtocolError::Config(format!("cannot read {}: {}", path.display(), e))
            })
        };

        let root_pem = read(root_cert)?;
        let leaf_pem = read(leaf_cert)?;
        let key_pem = String::from_utf8(read(leaf_key)?).map_err(|_| {
            ProtocolError::Config(format!("{} is not PEM text", leaf_key.display()))
        })?;

        Ok(Self::new(root_pem, leaf_pem, load_private_key_pem(&key_pem)?))
    }

    /// Public half of the leaf key
    pub fn public_key(&self) -> RsaPublicKey {
        RsaPublicKey::from(&self.private_key)
    }
}

impl std::fmt::Debug for ResponderIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponderIdentity")
            .field("root_pem_len", &self.root_pem.len())
            .field("leaf_pem_len", &self.leaf_pem.len())
            .finish_non_exhaustive()
    }
}

/// Server-side handshake handler
pub struct ServerHandshake<'a> {
    state: HandshakeState,
    identity: &'a ResponderIdentity,
}

impl<'a> ServerHandshake<'a> {
    /// Create a new server handshake
    pub fn new(identity: &'a ResponderIdentity) -> Self {
        Self {
            state: HandshakeState::Initial,
            identity,
        }
    }

    /// Get current state
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Check if handshake is complete
    pub fn is_complete(&self) -> bool {
        self.state == HandshakeState::Complete
    }

    /// Present the certificates and accept the initiator's session key
    pub async fn run(&mut self, transport: &mut Transport) -> ProtocolResult<ActiveSessionKey> {
        if self.state != HandshakeState::Initial {
            return Err(ProtocolError::InvalidStateTransition {
                from: self.state.to_string(),
                to: "Starting handshake".to_string(),
            });
        }

        match self.drive(transport).await {
            Ok(key) => {
                self.state = HandshakeState::Complete;
                info!("Handshake complete with {}", transport.peer_addr());
                Ok(key)
            }
            Err(e) => {
                warn!("Handshake failed during {}: {}", self.state, e);
                self.state = HandshakeState::Failed;
                Err(e)
            }
        }
    }

    async fn drive(&mut self, transport: &mut Transport) -> ProtocolResult<ActiveSessionKey> {
        self.state = HandshakeState::TrustAnchor;
        send_trust_anchor(transport, &self.identity.root_pem).await?;

        self.state = HandshakeState::PeerCertificate;
        transport.send(&self.identity.leaf_pem).await?;

        self.state = HandshakeState::KeyExchange;
        accept_session_key(transport, &self.identity.private_key).await
    }
}
