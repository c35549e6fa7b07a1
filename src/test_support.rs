//! Certificates, keys and a loopback responder for tests.

use std::net::SocketAddr;
use std::sync::OnceLock;

use rcgen::{BasicConstraints, Certificate, CertificateParams, DnType, IsCa, KeyPair};
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;

use crate::handshake::ResponderIdentity;
use crate::session::SecureSession;
use crate::transport::TransportListener;

/// One 2048-bit key shared by every test in the binary
pub(crate) fn rsa_key() -> &'static RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(|| RsaPrivateKey::new(&mut rand::rngs::OsRng, 2048).unwrap())
}

/// A throwaway root CA that issues leaf certificates
pub(crate) struct TestPki {
    ca: Certificate,
    pub root_pem: String,
}

impl TestPki {
    pub fn new() -> Self {
        let mut params = CertificateParams::new(Vec::<String>::new());
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params
            .distinguished_name
            .push(DnType::CommonName, "sessionwire test root");

        let ca = Certificate::from_params(params).unwrap();
        let root_pem = ca.serialize_pem().unwrap();
        Self { ca, root_pem }
    }

    fn rsa_params(hostname: &str) -> CertificateParams {
        let key_pem = rsa_key().to_pkcs8_pem(LineEnding::LF).unwrap();
        let mut params = CertificateParams::new(vec![hostname.to_string()]);
        params.alg = &rcgen::PKCS_RSA_SHA256;
        params.key_pair = Some(KeyPair::from_pem(&key_pem).unwrap());
        params
    }

    fn issue(&self, params: CertificateParams) -> String {
        let leaf = Certificate::from_params(params).unwrap();
        leaf.serialize_pem_with_signer(&self.ca).unwrap()
    }

    /// Leaf for `hostname` carrying [`rsa_key`]
    pub fn rsa_leaf(&self, hostname: &str) -> String {
        self.issue(Self::rsa_params(hostname))
    }

    /// Same as [`TestPki::rsa_leaf`] but expired in 2001
    pub fn expired_rsa_leaf(&self, hostname: &str) -> String {
        let mut params = Self::rsa_params(hostname);
        params.not_before = rcgen::date_time_ymd(2000, 1, 1);
        params.not_after = rcgen::date_time_ymd(2001, 1, 1);
        self.issue(params)
    }

    /// Leaf for `hostname` with a P-256 key
    pub fn ec_leaf(&self, hostname: &str) -> String {
        self.issue(CertificateParams::new(vec![hostname.to_string()]))
    }

    /// Responder presenting this root and an RSA leaf for `hostname`
    pub fn identity(&self, hostname: &str) -> ResponderIdentity {
        ResponderIdentity::new(
            self.root_pem.as_bytes().to_vec(),
            self.rsa_leaf(hostname).into_bytes(),
            rsa_key().clone(),
        )
    }
}

/// Serve one connection: handshake, read a message, answer with `reply`.
///
/// Returns the listening address and a handle resolving to the message the
/// responder decrypted.
pub(crate) async fn spawn_responder(
    identity: ResponderIdentity,
    reply: &'static [u8],
) -> (SocketAddr, tokio::task::JoinHandle<crate::ProtocolResult<Vec<u8>>>) {
    let listener = TransportListener::bind("127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    let addr = listener.local_addr();

    let handle = tokio::spawn(async move {
        let (transport, _) = listener.accept().await?;
        let mut session = SecureSession::accept(transport, &identity).await?;
        let message = session.recv_message().await?;
        session.send_message(reply).await?;
        Ok(message)
    });

    (addr, handle)
}
