//! # Cryptographic Primitives
//!
//! - Session key generation
//! - RSA PKCS#1 v1.5 key transport
//! - Secure random generation
//!
//! ## Security Considerations
//!
//! - Session keys are zeroized on drop
//! - PKCS#1 v1.5 encryption is kept for wire compatibility; the key
//!   transport gives no forward secrecy

use rand::{rngs::OsRng, RngCore};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{ProtocolError, ProtocolResult};
use crate::SESSION_KEY_SIZE;

/// Freshly generated or freshly decrypted session key
///
/// Not usable for framing until the handshake confirms it; see
/// [`ActiveSessionKey`].
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SessionKey {
    bytes: [u8; SESSION_KEY_SIZE],
}

impl SessionKey {
    /// Generate a new random key from the OS RNG
    pub fn generate() -> ProtocolResult<Self> {
        let mut bytes = [0u8; SESSION_KEY_SIZE];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| ProtocolError::CryptoError(format!("RNG failure: {}", e)))?;
        Ok(Self { bytes })
    }

    /// Wrap raw key bytes, which must be exactly 32 bytes long
    pub fn from_slice(data: &[u8]) -> ProtocolResult<Self> {
        let bytes: [u8; SESSION_KEY_SIZE] = data.try_into().map_err(|_| {
            ProtocolError::CryptoError(format!(
                "session key must be {} bytes, got {}",
                SESSION_KEY_SIZE,
                data.len()
            ))
        })?;
        Ok(Self { bytes })
    }

    /// Encrypt this key for the holder of `public_key`
    ///
    /// The ciphertext is exactly the modulus size.
    pub fn encrypt_for(&self, public_key: &RsaPublicKey) -> ProtocolResult<Vec<u8>> {
        let ciphertext = public_key.encrypt(&mut OsRng, Pkcs1v15Encrypt, &self.bytes)?;
        Ok(ciphertext)
    }

    /// Recover a key sent by the initiator
    pub fn decrypt_from(private_key: &RsaPrivateKey, ciphertext: &[u8]) -> ProtocolResult<Self> {
        if ciphertext.len() != private_key.size() {
            return Err(ProtocolError::CryptoError(format!(
                "encrypted key is {} bytes, modulus is {}",
                ciphertext.len(),
                private_key.size()
            )));
        }

        let mut plaintext = private_key.decrypt(Pkcs1v15Encrypt, ciphertext)?;
        let key = Self::from_slice(&plaintext);
        plaintext.zeroize();
        key
    }

    pub(crate) fn as_bytes(&self) -> &[u8; SESSION_KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKey(..)")
    }
}

/// A session key the peer has acknowledged
///
/// Only the handshake can produce one, so the frame codec can never run on a
/// key the other side has not accepted.
#[derive(Debug)]
pub struct ActiveSessionKey(SessionKey);

impl ActiveSessionKey {
    pub(crate) fn confirm(key: SessionKey) -> Self {
        Self(key)
    }

    pub(crate) fn as_bytes(&self) -> &[u8; SESSION_KEY_SIZE] {
        self.0.as_bytes()
    }
}

/// Load an RSA private key from PEM, PKCS#8 or PKCS#1
pub fn load_private_key_pem(pem: &str) -> ProtocolResult<RsaPrivateKey> {
    RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
        .map_err(|e| ProtocolError::CryptoError(format!("invalid RSA private key: {}", e)))
}

/// Generate cryptographically secure random bytes
pub fn random_bytes<const N: usize>() -> ProtocolResult<[u8; N]> {
    let mut bytes = [0u8; N];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| ProtocolError::CryptoError(format!("RNG failure: {}", e)))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::rsa_key;
    use rsa::pkcs8::{EncodePrivateKey, LineEnding};

    #[test]
    fn test_session_keys_differ() {
        let a = SessionKey::generate().unwrap();
        let b = SessionKey::generate().unwrap();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_key_transport() {
        let private_key = rsa_key();
        let public_key = RsaPublicKey::from(private_key);

        let key = SessionKey::generate().unwrap();
        let ciphertext = key.encrypt_for(&public_key).unwrap();
        assert_eq!(ciphertext.len(), public_key.size());

        let recovered = SessionKey::decrypt_from(private_key, &ciphertext).unwrap();
        assert_eq!(recovered.as_bytes(), key.as_bytes());
    }

    #[test]
    fn test_decrypt_rejects_wrong_length() {
        let err = SessionKey::decrypt_from(rsa_key(), &[0u8; 17]).unwrap_err();
        assert!(matches!(err, ProtocolError::CryptoError(_)));
    }

    #[test]
    fn test_from_slice_length() {
        assert!(SessionKey::from_slice(&[7u8; 32]).is_ok());
        assert!(SessionKey::from_slice(&[7u8; 31]).is_err());
    }

    #[test]
    fn test_load_private_key_pem() {
        let pem = rsa_key().to_pkcs8_pem(LineEnding::LF).unwrap();
        let loaded = load_private_key_pem(&pem).unwrap();
        assert_eq!(loaded.size(), rsa_key().size());

        assert!(load_private_key_pem("not a key").is_err());
    }

    #[test]
    fn test_debug_hides_key() {
        let key = SessionKey::from_slice(&[0xAB; 32]).unwrap();
        assert_eq!(format!("{:?}", key), "SessionKey(..)");
    }
}
