//! Shared utilities for integration tests: a throwaway PKI, TLS clients
//! and lumberjack wire helpers.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rcgen::{BasicConstraints, Certificate, CertificateParams, DnType, IsCa, KeyPair};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, ServerName};
use rustls::{ClientConfig, RootCertStore};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

use ingest_adapter::config::{AckMode, ListenerConfig, LumberjackConfig, TlsMaterials, Transport};

/// Which certificate, if any, a test client presents.
#[derive(Debug, Clone, Copy)]
pub enum Identity {
    Anonymous,
    Trusted,
    /// Signed by a CA the server does not trust.
    Untrusted,
}

struct Leaf {
    cert: CertificateDer<'static>,
    key: PrivatePkcs8KeyDer<'static>,
}

/// CA, server and client certificates written to a temp dir.
pub struct Pki {
    _dir: tempfile::TempDir,
    pub ca_path: PathBuf,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    ca_der: CertificateDer<'static>,
    client: Leaf,
    rogue_client: Leaf,
}

fn ca(name: &str) -> (Certificate, KeyPair) {
    let mut params = CertificateParams::default();
    params.distinguished_name.push(DnType::CommonName, name);
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    let key = KeyPair::generate().unwrap();
    let cert = params.self_signed(&key).unwrap();
    (cert, key)
}

fn leaf(name: &str, ca: &Certificate, ca_key: &KeyPair) -> (Certificate, KeyPair) {
    let mut params = CertificateParams::new(vec![name.to_string()]).unwrap();
    params.distinguished_name.push(DnType::CommonName, name);
    let key = KeyPair::generate().unwrap();
    let cert = params.signed_by(&key, ca, ca_key).unwrap();
    (cert, key)
}

impl Pki {
    pub fn generate() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let (ca_cert, ca_key) = ca("Test CA");
        let (server_cert, server_key) = leaf("localhost", &ca_cert, &ca_key);
        let (client_cert, client_key) = leaf("shipper", &ca_cert, &ca_key);
        let (rogue_ca, rogue_ca_key) = ca("Rogue CA");
        let (rogue_cert, rogue_key) = leaf("intruder", &rogue_ca, &rogue_ca_key);

        let ca_path = dir.path().join("ca.pem");
        let cert_path = dir.path().join("server.pem");
        let key_path = dir.path().join("server.key");
        std::fs::write(&ca_path, ca_cert.pem()).unwrap();
        std::fs::write(&cert_path, server_cert.pem()).unwrap();
        std::fs::write(&key_path, server_key.serialize_pem()).unwrap();

        Self {
            _dir: dir,
            ca_path,
            cert_path,
            key_path,
            ca_der: ca_cert.der().clone(),
            client: Leaf {
                cert: client_cert.der().clone(),
                key: PrivatePkcs8KeyDer::from(client_key.serialize_der()),
            },
            rogue_client: Leaf {
                cert: rogue_cert.der().clone(),
                key: PrivatePkcs8KeyDer::from(rogue_key.serialize_der()),
            },
        }
    }

    pub fn materials(&self, client_auth: bool) -> TlsMaterials {
        TlsMaterials {
            cert_path: self.cert_path.clone(),
            key_path: self.key_path.clone(),
            ca_cert_path: client_auth.then(|| self.ca_path.clone()),
            require_client_auth: client_auth,
        }
    }

    pub fn client_config(&self, identity: Identity) -> Arc<ClientConfig> {
        let mut roots = RootCertStore::empty();
        roots.add(self.ca_der.clone()).unwrap();
        let builder = ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_root_certificates(roots);

        let leaf = match identity {
            Identity::Anonymous => return Arc::new(builder.with_no_client_auth()),
            Identity::Trusted => &self.client,
            Identity::Untrusted => &self.rogue_client,
        };
        let config = builder
            .with_client_auth_cert(vec![leaf.cert.clone()], PrivateKeyDer::Pkcs8(leaf.key.clone_key()))
            .unwrap();
        Arc::new(config)
    }

    /// Open a TLS connection to `addr` as `identity`.
    pub async fn connect(&self, addr: SocketAddr, identity: Identity) -> std::io::Result<TlsStream<TcpStream>> {
        let tcp = TcpStream::connect(addr).await?;
        let name = ServerName::try_from("localhost").unwrap();
        TlsConnector::from(self.client_config(identity)).connect(name, tcp).await
    }
}

/// A lumberjack config listening on an ephemeral localhost port.
pub fn lumberjack_config(pki: &Pki, client_auth: bool, ack_mode: AckMode) -> LumberjackConfig {
    LumberjackConfig {
        listener: ListenerConfig {
            bind: "127.0.0.1:0".to_string(),
            transport: Transport::Tcp,
            tls: Some(pki.materials(client_auth)),
            channel_capacity: 8,
        },
        ack_mode,
        keepalive: Duration::from_millis(50),
        read_timeout: Duration::from_secs(30),
    }
}

/// Read one lumberjack ACK frame and return its sequence number.
pub async fn read_ack<S: AsyncRead + Unpin>(stream: &mut S) -> std::io::Result<u32> {
    let mut frame = [0u8; 6];
    stream.read_exact(&mut frame).await?;
    assert_eq!(&frame[..2], b"2A", "not an ACK frame");
    Ok(u32::from_be_bytes([frame[2], frame[3], frame[4], frame[5]]))
}

/// Read ACK frames until one is not a keepalive. Returns that sequence and
/// how many keepalives came first.
pub async fn read_final_ack<S: AsyncRead + Unpin>(stream: &mut S) -> std::io::Result<(u32, usize)> {
    let mut keepalives = 0;
    loop {
        match read_ack(stream).await? {
            0 => keepalives += 1,
            sequence => return Ok((sequence, keepalives)),
        }
    }
}

pub fn deadline(millis: u64) -> ingest_adapter::CancelToken {
    ingest_adapter::CancelToken::with_timeout(Duration::from_millis(millis))
}
