//! TLS configuration and certificate loading.
//!
//! Builds the immutable server-side TLS context used by TCP listeners.
//! With client auth enabled, peers must present a certificate chaining to
//! the configured CA bundle or the handshake fails.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};
use tokio_rustls::TlsAcceptor;

use crate::config::TlsMaterials;

/// Error type for TLS context construction.
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    /// A PEM file could not be opened or parsed.
    #[error("failed to read {kind} from {path:?}: {source}")]
    Read {
        kind: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A PEM file held no usable item of the expected kind.
    #[error("no {kind} found in {path:?}")]
    Empty { kind: &'static str, path: PathBuf },

    /// Client auth was requested without a CA bundle.
    #[error("client certificate auth requires a CA certificate")]
    MissingCaCert,

    /// rustls rejected the key pair or a CA certificate.
    #[error("invalid TLS material: {0}")]
    Rustls(#[from] rustls::Error),

    /// The client certificate verifier could not be built.
    #[error("invalid client verifier: {0}")]
    Verifier(#[from] rustls::server::VerifierBuilderError),
}

/// Immutable server TLS context.
///
/// Cloning is cheap; every accepted connection shares the same config.
#[derive(Clone)]
pub struct TlsContext {
    config: Arc<ServerConfig>,
    client_auth: bool,
}

impl TlsContext {
    /// Build a context from key material.
    pub fn build(materials: &TlsMaterials) -> Result<Self, TlsError> {
        let certs = load_certs(&materials.cert_path, "certificate")?;
        let key = load_private_key(&materials.key_path)?;

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let builder = ServerConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()?;

        let builder = if materials.require_client_auth {
            let ca_path = materials
                .ca_cert_path
                .as_deref()
                .ok_or(TlsError::MissingCaCert)?;
            let roots = load_roots(ca_path)?;
            let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider)
                .build()?;
            builder.with_client_cert_verifier(verifier)
        } else {
            builder.with_no_client_auth()
        };

        let config = builder.with_single_cert(certs, key)?;

        tracing::debug!(
            cert_path = ?materials.cert_path,
            client_auth = materials.require_client_auth,
            "TLS context built"
        );

        Ok(Self {
            config: Arc::new(config),
            client_auth: materials.require_client_auth,
        })
    }

    /// Acceptor for wrapping accepted TCP streams.
    pub fn acceptor(&self) -> TlsAcceptor {
        TlsAcceptor::from(Arc::clone(&self.config))
    }

    /// Whether peers must present a verified client certificate.
    pub fn requires_client_auth(&self) -> bool {
        self.client_auth
    }
}

impl std::fmt::Debug for TlsContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsContext")
            .field("client_auth", &self.client_auth)
            .finish_non_exhaustive()
    }
}

fn open(path: &Path, kind: &'static str) -> Result<BufReader<File>, TlsError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| TlsError::Read {
            kind,
            path: path.to_path_buf(),
            source,
        })
}

fn load_certs(path: &Path, kind: &'static str) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let mut reader = open(path, kind)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Read {
            kind,
            path: path.to_path_buf(),
            source,
        })?;
    if certs.is_empty() {
        return Err(TlsError::Empty {
            kind,
            path: path.to_path_buf(),
        });
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let mut reader = open(path, "private key")?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|source| TlsError::Read {
            kind: "private key",
            path: path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| TlsError::Empty {
            kind: "private key",
            path: path.to_path_buf(),
        })
}

fn load_roots(path: &Path) -> Result<RootCertStore, TlsError> {
    let mut roots = RootCertStore::empty();
    for cert in load_certs(path, "CA certificate")? {
        roots.add(cert)?;
    }
    Ok(roots)
}
