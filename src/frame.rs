//! # Message Framing
//!
//! Every application message travels as one frame:
//!
//! ```text
//! +------------------+---------------------------+
//! | IV               | AES-256-CTR ciphertext    |
//! | 16 bytes, random | len(plaintext) bytes      |
//! +------------------+---------------------------+
//! ```
//!
//! The keystream is AES-256 in counter mode with the whole IV used as a
//! 128-bit big-endian counter. Frames carry NO authentication tag: a
//! modified ciphertext decodes to modified plaintext without any error.
//! Callers must not treat a successful decode as proof of integrity.

use aes::cipher::{KeyIvInit, StreamCipher};
use bytes::{BufMut, Bytes, BytesMut};

use crate::crypto::{random_bytes, ActiveSessionKey};
use crate::error::{ProtocolError, ProtocolResult};
use crate::IV_SIZE;

type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;

/// One encrypted message as it appears on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Per-frame random IV
    iv: [u8; IV_SIZE],
    /// Ciphertext, same length as the plaintext
    ciphertext: Bytes,
}

impl Frame {
    /// Split raw wire bytes into IV and ciphertext
    ///
    /// Anything shorter than the IV is rejected. A bare IV is a valid frame
    /// holding an empty message.
    pub fn from_bytes(data: &[u8]) -> ProtocolResult<Self> {
        if data.len() < IV_SIZE {
            return Err(ProtocolError::FrameTooShort {
                len: data.len(),
                min: IV_SIZE,
            });
        }

        let mut iv = [0u8; IV_SIZE];
        iv.copy_from_slice(&data[..IV_SIZE]);

        Ok(Self {
            iv,
            ciphertext: Bytes::copy_from_slice(&data[IV_SIZE..]),
        })
    }

    /// Serialize to `IV || ciphertext`
    pub fn to_bytes(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(self.len());
        buf.put_slice(&self.iv);
        buf.put_slice(&self.ciphertext);
        buf
    }

    /// Total wire length
    pub fn len(&self) -> usize {
        IV_SIZE + self.ciphertext.len()
    }

    /// True when the frame carries an empty message
    pub fn is_empty(&self) -> bool {
        self.ciphertext.is_empty()
    }

    /// Get the IV
    pub fn iv(&self) -> &[u8; IV_SIZE] {
        &self.iv
    }

    /// Get the ciphertext
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }
}

/// Encrypts and decrypts frames under one confirmed session key
///
/// Stateless across messages: each frame brings its own IV, so frames can be
/// decoded in any order.
#[derive(Debug)]
pub struct FrameCodec {
    key: ActiveSessionKey,
}

impl FrameCodec {
    /// Build the codec from an acknowledged session key
    pub fn new(key: ActiveSessionKey) -> Self {
        Self { key }
    }

    fn keystream(&self, iv: &[u8; IV_SIZE]) -> ProtocolResult<Aes256Ctr> {
        Aes256Ctr::new_from_slices(self.key.as_bytes(), iv)
            .map_err(|e| ProtocolError::CryptoError(format!("Failed to create cipher: {}", e)))
    }

    /// Encrypt `plaintext` under a fresh random IV
    pub fn encode(&self, plaintext: &[u8]) -> ProtocolResult<Frame> {
        let iv: [u8; IV_SIZE] = random_bytes()?;

        let mut buf = plaintext.to_vec();
        self.keystream(&iv)?.apply_keystream(&mut buf);

        Ok(Frame {
            iv,
            ciphertext: Bytes::from(buf),
        })
    }

    /// Recover the plaintext of a frame
    pub fn decode(&self, frame: &Frame) -> ProtocolResult<Vec<u8>> {
        let mut buf = frame.ciphertext.to_vec();
        self.keystream(&frame.iv)?.apply_keystream(&mut buf);
        Ok(buf)
    }

    /// Parse raw wire bytes and decrypt them
    pub fn decode_bytes(&self, data: &[u8]) -> ProtocolResult<Vec<u8>> {
        let frame = Frame::from_bytes(data)?;
        self.decode(&frame)
    }
}
