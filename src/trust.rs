//! # Trust Anchor Exchange
//!
//! Step 1 and 2 of the handshake: the responder sends its root
//! certificate(s) as PEM and the initiator answers `ok` once it has built a
//! trust store out of them.
//!
//! There is no length prefix. The initiator does a single read of up to
//! [`PEM_BUFFER_SIZE`] bytes; a bigger payload is cut at the buffer boundary
//! and will almost certainly fail to parse.

use rustls::RootCertStore;
use rustls_pemfile::Item;
use tracing::{debug, info, warn};

use crate::error::{ProtocolError, ProtocolResult};
use crate::transport::Transport;
use crate::{ACK, ACK_BUFFER_SIZE, PEM_BUFFER_SIZE};

/// DER bodies of every `CERTIFICATE` block in `pem`, in order
///
/// A block whose base64 does not decode is skipped and scanning goes on with
/// the next one. Other PEM sections (keys, CRLs) are ignored.
pub(crate) fn pem_certificates(pem: &[u8]) -> Vec<Vec<u8>> {
    let mut reader = pem;
    let mut ders = Vec::new();

    loop {
        let remaining = reader.len();
        match rustls_pemfile::read_one(&mut reader) {
            Ok(Some(Item::X509Certificate(der))) => ders.push(der),
            Ok(Some(_)) => {}
            Ok(None) => break,
            Err(e) => {
                debug!("Skipping undecodable PEM block: {}", e);
                if reader.len() == remaining {
                    break;
                }
            }
        }
    }

    ders
}

/// Roots the peer certificate must chain to
///
/// Built once per connection and dropped with it.
#[derive(Clone)]
pub struct TrustStore {
    roots: RootCertStore,
}

impl TrustStore {
    /// Parse every PEM `CERTIFICATE` block in `pem`
    ///
    /// Blocks that do not hold a usable certificate are skipped; the store
    /// must end up with at least one root.
    pub fn from_pem(pem: &[u8]) -> ProtocolResult<Self> {
        let ders = pem_certificates(pem);

        let mut roots = RootCertStore::empty();
        let (added, ignored) = roots.add_parsable_certificates(&ders[..]);

        if ignored > 0 {
            debug!("Ignored {} unparsable root certificate(s)", ignored);
        }

        if added == 0 {
            return Err(ProtocolError::CertificateParse(
                "no root certificate found in trust anchor".to_string(),
            ));
        }

        Ok(Self { roots })
    }

    /// Number of trusted roots
    pub fn len(&self) -> usize {
        self.roots.len()
    }

    /// True when the store holds no roots
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub(crate) fn roots(&self) -> &RootCertStore {
        &self.roots
    }
}

impl std::fmt::Debug for TrustStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustStore").field("roots", &self.len()).finish()
    }
}

/// Initiator side: read the root(s), build the store, acknowledge
pub async fn receive_trust_anchor(transport: &mut Transport) -> ProtocolResult<TrustStore> {
    let pem = transport.recv(PEM_BUFFER_SIZE).await?;

    if pem.len() == PEM_BUFFER_SIZE {
        warn!(
            "Trust anchor filled the {} byte buffer; it may have been truncated",
            PEM_BUFFER_SIZE
        );
    }

    let store = TrustStore::from_pem(&pem)?;
    info!("Received {} trusted root(s)", store.len());

    transport.send(ACK).await?;

    Ok(store)
}

/// Responder side: send the root(s) and wait for the exact acknowledgment
pub async fn send_trust_anchor(transport: &mut Transport, pem: &[u8]) -> ProtocolResult<()> {
    transport.send(pem).await?;

    let reply = transport.recv(ACK_BUFFER_SIZE).await?;
    if reply != ACK {
        return Err(ProtocolError::ack_mismatch("trust anchor", &reply));
    }

    Ok(())
}
