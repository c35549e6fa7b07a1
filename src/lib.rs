//! # sessionwire
//!
//! Client side of a small certificate-authenticated messaging protocol, plus
//! the matching responder used by the demo server and the tests:
//! - PEM trust anchor supplied by the responder
//! - X.509 leaf verification against that anchor and an expected host name
//! - RSA PKCS#1 v1.5 key transport of a 32-byte session key
//! - AES-256-CTR message framing with a random IV per message
//!
//! ## Protocol Overview
//!
//! ```text
//! Initiator                              Responder
//!   |                                        |
//!   |<------- root certificate(s) (PEM) -----|
//!   |-------- "ok" ------------------------->|
//!   |<------- leaf certificate (PEM) --------|
//!   |                                        |
//!   |  [verify chain + host name, take RSA key]
//!   |                                        |
//!   |-------- RSA(session key) ------------->|
//!   |<------- "ok" --------------------------|
//!   |                                        |
//!   |-------- IV || CTR(message) ----------->|
//!   |<------- IV || CTR(reply) --------------|
//! ```
//!
//! ## Security Properties
//!
//! - The responder is authenticated by its certificate; the initiator is not
//! - No forward secrecy: whoever holds the leaf key can recover the session key
//! - Frames carry no authentication tag, so tampering goes undetected

pub mod config;
pub mod crypto;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod session;
pub mod transport;
pub mod trust;
pub mod verify;

#[cfg(test)]
mod test_support;

pub use config::*;
pub use crypto::*;
pub use error::*;
pub use frame::*;
pub use handshake::*;
pub use session::*;
pub use transport::*;
pub use trust::*;
pub use verify::*;

/// Session key size (AES-256)
pub const SESSION_KEY_SIZE: usize = 32;

/// IV prefix carried by every frame (one AES block)
pub const IV_SIZE: usize = 16;

/// Read buffer for PEM payloads and incoming frames
pub const PEM_BUFFER_SIZE: usize = 8192;

/// Read buffer for the key exchange acknowledgment
pub const ACK_BUFFER_SIZE: usize = 256;

/// Literal acknowledgment sent after steps 1 and 4
pub const ACK: &[u8] = b"ok";

/// Default read/write deadline in seconds
pub const DEFAULT_IO_TIMEOUT_SECS: u64 = 10;
