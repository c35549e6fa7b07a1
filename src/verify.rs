//! # Peer Certificate Verification
//!
//! Step 3 of the handshake. The responder sends its leaf certificate as PEM;
//! the initiator checks it against the trust store received in step 1 and
//! the configured host name, then takes its RSA public key.
//!
//! Failure of any check aborts the connection. There is no fallback anchor
//! and no way for the caller to skip verification.

use std::time::SystemTime;

use rsa::{BigUint, RsaPublicKey};
use rustls::client::{ServerCertVerifier, WebPkiVerifier};
use rustls::{Certificate, ServerName};
use tracing::{debug, info, warn};
use x509_parser::prelude::*;
use x509_parser::public_key::PublicKey;

use crate::error::{ProtocolError, ProtocolResult};
use crate::transport::Transport;
use crate::trust::{pem_certificates, TrustStore};
use crate::PEM_BUFFER_SIZE;

/// Take the first decodable `CERTIFICATE` block out of a PEM payload
fn first_certificate(pem: &[u8]) -> ProtocolResult<Vec<u8>> {
    pem_certificates(pem).into_iter().next().ok_or_else(|| {
        ProtocolError::CertificateParse("no certificate block in PEM payload".to_string())
    })
}

/// Chain to a trusted root, validity at `now`, and host name
fn check_chain(
    der: &[u8],
    trust_store: &TrustStore,
    expected_hostname: &str,
    now: SystemTime,
) -> ProtocolResult<()> {
    let server_name = ServerName::try_from(expected_hostname).map_err(|_| {
        ProtocolError::CertificateVerification(format!(
            "invalid expected host name {:?}",
            expected_hostname
        ))
    })?;

    let verifier = WebPkiVerifier::new(trust_store.roots().clone(), None);
    verifier
        .verify_server_cert(
            &Certificate(der.to_vec()),
            &[],
            &server_name,
            &mut std::iter::empty(),
            &[],
            now,
        )
        .map_err(|e| ProtocolError::CertificateVerification(e.to_string()))?;

    Ok(())
}

/// Pull the RSA key out of a certificate; any other family is refused
fn rsa_public_key(cert: &X509Certificate<'_>) -> ProtocolResult<RsaPublicKey> {
    let spki = cert.public_key();

    match spki.parsed() {
        Ok(PublicKey::RSA(key)) => RsaPublicKey::new(
            BigUint::from_bytes_be(key.modulus),
            BigUint::from_bytes_be(key.exponent),
        )
        .map_err(|e| ProtocolError::UnsupportedKey(format!("unusable RSA key: {}", e))),
        Ok(PublicKey::EC(_)) => Err(ProtocolError::UnsupportedKey(
            "elliptic-curve key, RSA required".to_string(),
        )),
        _ => Err(ProtocolError::UnsupportedKey(format!(
            "key algorithm {}, RSA required",
            spki.algorithm.algorithm.to_id_string()
        ))),
    }
}

/// Verify a PEM leaf certificate and return its RSA public key
///
/// Parse errors, verification errors and key-family errors are reported as
/// distinct variants, in that order.
pub fn verify_certificate_pem(
    pem: &[u8],
    trust_store: &TrustStore,
    expected_hostname: &str,
    now: SystemTime,
) -> ProtocolResult<RsaPublicKey> {
    let der = first_certificate(pem)?;

    let (_, cert) = X509Certificate::from_der(&der)
        .map_err(|e| ProtocolError::CertificateParse(format!("invalid certificate DER: {}", e)))?;

    debug!("Peer certificate subject: {}", cert.subject());

    check_chain(&der, trust_store, expected_hostname, now)?;

    rsa_public_key(&cert)
}

/// Initiator side: receive the leaf certificate and verify it
pub async fn verify_peer(
    transport: &mut Transport,
    trust_store: &TrustStore,
    expected_hostname: &str,
) -> ProtocolResult<RsaPublicKey> {
    let pem = transport.recv(PEM_BUFFER_SIZE).await?;

    if pem.len() == PEM_BUFFER_SIZE {
        warn!(
            "Peer certificate filled the {} byte buffer; it may have been truncated",
            PEM_BUFFER_SIZE
        );
    }

    let public_key =
        verify_certificate_pem(&pem, trust_store, expected_hostname, SystemTime::now())?;
    info!("Peer certificate verified for {}", expected_hostname);

    Ok(public_key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{rsa_key, TestPki};
    use rsa::traits::PublicKeyParts;

    const HOST: &str = "example.test";

    fn verify(pki: &TestPki, leaf_pem: &str, hostname: &str) -> ProtocolResult<RsaPublicKey> {
        let store = TrustStore::from_pem(pki.root_pem.as_bytes()).unwrap();
        verify_certificate_pem(leaf_pem.as_bytes(), &store, hostname, SystemTime::now())
    }

    #[test]
    fn test_valid_chain_accepted() {
        let pki = TestPki::new();
        let key = verify(&pki, &pki.rsa_leaf(HOST), HOST).unwrap();

        assert_eq!(key.n(), rsa_key().n());
        assert_eq!(key.e(), rsa_key().e());
    }

    #[test]
    fn test_hostname_mismatch_rejected() {
        let pki = TestPki::new();
        let err = verify(&pki, &pki.rsa_leaf("other.test"), HOST).unwrap_err();
        assert!(matches!(err, ProtocolError::CertificateVerification(_)));
    }

    #[test]
    fn test_untrusted_root_rejected() {
        let trusted = TestPki::new();
        let stranger = TestPki::new();

        let err = verify(&trusted, &stranger.rsa_leaf(HOST), HOST).unwrap_err();
        assert!(matches!(err, ProtocolError::CertificateVerification(_)));
    }

    #[test]
    fn test_expired_leaf_rejected() {
        let pki = TestPki::new();
        let err = verify(&pki, &pki.expired_rsa_leaf(HOST), HOST).unwrap_err();
        assert!(matches!(err, ProtocolError::CertificateVerification(_)));
    }

    #[test]
    fn test_ec_key_rejected_after_verification() {
        let pki = TestPki::new();
        let err = verify(&pki, &pki.ec_leaf(HOST), HOST).unwrap_err();
        assert!(matches!(err, ProtocolError::UnsupportedKey(_)));
    }

    #[test]
    fn test_untrusted_ec_leaf_is_a_verification_error() {
        // Chain checks come before the key family check.
        let trusted = TestPki::new();
        let stranger = TestPki::new();

        let err = verify(&trusted, &stranger.ec_leaf(HOST), HOST).unwrap_err();
        assert!(matches!(err, ProtocolError::CertificateVerification(_)));
    }

    #[test]
    fn test_missing_pem_block() {
        let pki = TestPki::new();
        let err = verify(&pki, "hello, not a certificate", HOST).unwrap_err();
        assert!(matches!(err, ProtocolError::CertificateParse(_)));
    }

    #[test]
    fn test_bad_der_inside_pem() {
        let pki = TestPki::new();
        let pem = "-----BEGIN CERTIFICATE-----\nAAECAwQFBgcICQ==\n-----END CERTIFICATE-----\n";
        let err = verify(&pki, pem, HOST).unwrap_err();
        assert!(matches!(err, ProtocolError::CertificateParse(_)));
    }

    #[test]
    fn test_undecodable_block_before_leaf() {
        let pki = TestPki::new();
        let pem = format!(
            "-----BEGIN CERTIFICATE-----\n!!!notbase64!!!\n-----END CERTIFICATE-----\n{}",
            pki.rsa_leaf(HOST)
        );
        assert!(verify(&pki, &pem, HOST).is_ok());
    }

    #[test]
    fn test_first_block_wins() {
        let pki = TestPki::new();
        let bundle = format!("{}{}", pki.rsa_leaf(HOST), pki.ec_leaf(HOST));
        assert!(verify(&pki, &bundle, HOST).is_ok());
    }
}
