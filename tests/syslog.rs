//! Syslog input over UDP, plain TCP and TLS.

mod common;

use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UdpSocket};

use common::{deadline, Identity, Pki};
use ingest_adapter::config::schema::SyslogSection;
use ingest_adapter::config::{ListenerConfig, SyslogConfig, SyslogFormat, Transport};
use ingest_adapter::SyslogInput;

fn plain(transport: Transport, format: SyslogFormat) -> SyslogConfig {
    SyslogConfig {
        listener: ListenerConfig {
            bind: "127.0.0.1:0".to_string(),
            transport,
            tls: None,
            channel_capacity: 8,
        },
        format,
        max_message_size: 64 * 1024,
    }
}

#[tokio::test]
async fn udp_rfc3164_line_becomes_one_record() {
    let section = SyslogSection {
        bind: "127.0.0.1:0".to_string(),
        protocol: Transport::Udp,
        format: SyslogFormat::Rfc3164,
        ..Default::default()
    };
    let mut input = SyslogInput::new(SyslogConfig::from_section(&section).unwrap());
    let addr = input.connect().await.unwrap();

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client
        .send_to(b"<34>Oct 11 22:14:15 mymachine su: 'su root' failed for lonvick", addr)
        .await
        .unwrap();

    let (record, ack) = input.read(&deadline(5000)).await.unwrap();
    assert!(ack.is_noop());
    assert_eq!(record.get("facility"), Some(&json!(4)));
    assert_eq!(record.get("severity"), Some(&json!(2)));
    assert_eq!(record.get("hostname"), Some(&json!("mymachine")));
    assert_eq!(record.get("tag"), Some(&json!("su")));
    assert_eq!(record.get("content"), Some(&json!("'su root' failed for lonvick")));
    assert_eq!(
        record.get("client"),
        Some(&Value::from(client.local_addr().unwrap().to_string()))
    );

    // Exactly one record for one datagram.
    assert!(input.read(&deadline(200)).await.is_err());
    input.close().await.unwrap();
}

#[tokio::test]
async fn tcp_octet_counting_frames() {
    let mut input = SyslogInput::new(plain(Transport::Tcp, SyslogFormat::Rfc6587));
    let addr = input.connect().await.unwrap();

    let mut client = TcpStream::connect(addr).await.unwrap();
    let message = "<165>1 2003-10-11T22:14:15.003Z host app 42 ID7 - line one\nline two";
    client
        .write_all(format!("{} {}", message.len(), message).as_bytes())
        .await
        .unwrap();

    let (record, _) = input.read(&deadline(5000)).await.unwrap();
    assert_eq!(record.get("message"), Some(&json!("line one\nline two")));
    assert_eq!(record.get("proc_id"), Some(&json!("42")));
    assert_eq!(record.get("msg_id"), Some(&json!("ID7")));
    input.close().await.unwrap();
}

#[tokio::test]
async fn automatic_format_over_tcp() {
    let mut input = SyslogInput::new(plain(Transport::Tcp, SyslogFormat::Automatic));
    let addr = input.connect().await.unwrap();

    let mut client = TcpStream::connect(addr).await.unwrap();
    client
        .write_all(b"<13>Feb  5 01:02:03 web-1 nginx[77]: GET /\n<14>1 - web-2 api - - - ready\n")
        .await
        .unwrap();

    let (first, _) = input.read(&deadline(5000)).await.unwrap();
    assert_eq!(first.get("tag"), Some(&json!("nginx")));
    assert_eq!(first.get("content"), Some(&json!("GET /")));

    let (second, _) = input.read(&deadline(5000)).await.unwrap();
    assert_eq!(second.get("app_name"), Some(&json!("api")));
    assert_eq!(second.get("message"), Some(&json!("ready")));
    input.close().await.unwrap();
}

#[tokio::test]
async fn tls_with_client_auth() {
    let pki = Pki::generate();
    let section = SyslogSection {
        bind: "127.0.0.1:0".to_string(),
        protocol: Transport::Tcp,
        use_tls: true,
        svr_cert: pki.cert_path.display().to_string(),
        priv_key: pki.key_path.display().to_string(),
        ca_cert: Some(pki.ca_path.display().to_string()),
        cli_auth: true,
        format: SyslogFormat::Rfc5424,
        ..Default::default()
    };
    let mut input = SyslogInput::new(SyslogConfig::from_section(&section).unwrap());
    let addr = input.connect().await.unwrap();

    let mut client = pki.connect(addr, Identity::Trusted).await.unwrap();
    client.write_all(b"<11>1 - host app - - - secure\n").await.unwrap();

    let (record, _) = input.read(&deadline(5000)).await.unwrap();
    assert_eq!(record.get("message"), Some(&json!("secure")));
    assert_eq!(record.get("severity"), Some(&json!(3)));
    input.close().await.unwrap();
}
