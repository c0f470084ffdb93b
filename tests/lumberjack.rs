//! Lumberjack input over TLS: batches, client authentication and
//! acknowledgment modes.

mod common;

use std::time::Duration;

use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use common::{deadline, lumberjack_config, read_ack, read_final_ack, Identity, Pki};
use ingest_adapter::codec::lumberjack::frames;
use ingest_adapter::config::schema::LumberjackSection;
use ingest_adapter::config::{AckMode, LumberjackConfig};
use ingest_adapter::{CancelCause, InputError, LumberjackInput};

#[tokio::test]
async fn batch_records_arrive_in_order() {
    let pki = Pki::generate();
    let mut input = LumberjackInput::new(lumberjack_config(&pki, false, AckMode::Immediate));
    let addr = input.connect().await.unwrap();

    let mut client = pki.connect(addr, Identity::Anonymous).await.unwrap();
    let events = [json!({"a": 1}), json!({"b": 2}), json!({"c": 3})];
    client.write_all(&frames::json_window(&events)).await.unwrap();

    let (records, ack) = input.read_batch(&deadline(5000)).await.unwrap();
    let payloads: Vec<_> = records.into_iter().map(|r| r.into_payload()).collect();
    assert_eq!(payloads, events);
    assert!(ack.is_noop());

    // Immediate mode acknowledged the window on dequeue.
    let (sequence, _) = read_final_ack(&mut client).await.unwrap();
    assert_eq!(sequence, 3);

    input.close().await.unwrap();
}

#[tokio::test]
async fn config_section_builds_a_working_input() {
    let pki = Pki::generate();
    let section = LumberjackSection {
        bind: "127.0.0.1:0".to_string(),
        svr_cert: pki.cert_path.display().to_string(),
        priv_key: pki.key_path.display().to_string(),
        ..Default::default()
    };
    let mut input = LumberjackInput::new(LumberjackConfig::from_section(&section).unwrap());
    let addr = input.connect().await.unwrap();

    let mut client = pki.connect(addr, Identity::Anonymous).await.unwrap();
    let mut window = frames::window(2);
    window.extend(frames::data(1, &[("line", "first")]));
    window.extend(frames::compressed(&frames::json(2, &json!({"line": "second"}))).unwrap());
    client.write_all(&window).await.unwrap();

    let (records, _) = input.read_batch(&deadline(5000)).await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].get("line"), Some(&json!("first")));
    assert_eq!(records[1].get("line"), Some(&json!("second")));

    input.close().await.unwrap();
}

#[tokio::test]
async fn consecutive_windows_on_one_connection() {
    let pki = Pki::generate();
    let mut input = LumberjackInput::new(lumberjack_config(&pki, false, AckMode::Immediate));
    let addr = input.connect().await.unwrap();

    let mut client = pki.connect(addr, Identity::Anonymous).await.unwrap();
    client.write_all(&frames::json_window(&[json!(1)])).await.unwrap();
    let (first, _) = input.read_batch(&deadline(5000)).await.unwrap();
    assert_eq!(read_final_ack(&mut client).await.unwrap().0, 1);

    client.write_all(&frames::json_window(&[json!(2), json!(3)])).await.unwrap();
    let (second, _) = input.read_batch(&deadline(5000)).await.unwrap();
    assert_eq!(read_final_ack(&mut client).await.unwrap().0, 2);

    assert_eq!(first[0].payload(), &json!(1));
    assert_eq!(second[1].payload(), &json!(3));
    input.close().await.unwrap();
}

/// A rejected TLS client either fails the handshake outright or, with
/// TLS 1.3, sees the connection torn down on its first read.
async fn assert_rejected(pki: &Pki, addr: std::net::SocketAddr, identity: Identity) {
    let Ok(mut stream) = pki.connect(addr, identity).await else {
        return;
    };
    let _ = stream.write_all(&frames::json_window(&[json!({"x": 1})])).await;
    let mut buf = [0u8; 6];
    let read = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf))
        .await
        .expect("server should close the connection");
    assert!(matches!(read, Err(_) | Ok(0)), "rejected client received data: {read:?}");
}

#[tokio::test]
async fn client_auth_rejects_missing_and_untrusted_certificates() {
    let pki = Pki::generate();
    let mut input = LumberjackInput::new(lumberjack_config(&pki, true, AckMode::Immediate));
    let addr = input.connect().await.unwrap();

    assert_rejected(&pki, addr, Identity::Anonymous).await;
    assert_rejected(&pki, addr, Identity::Untrusted).await;

    let err = input.read_batch(&deadline(300)).await.unwrap_err();
    assert!(matches!(err, InputError::Cancelled(CancelCause::DeadlineExceeded)));

    // The listener survives rejected peers.
    let mut client = pki.connect(addr, Identity::Trusted).await.unwrap();
    client.write_all(&frames::json_window(&[json!({"ok": true})])).await.unwrap();
    let (records, _) = input.read_batch(&deadline(5000)).await.unwrap();
    assert_eq!(records[0].payload(), &json!({"ok": true}));

    input.close().await.unwrap();
}

#[tokio::test]
async fn on_commit_acks_after_caller_commits() {
    let pki = Pki::generate();
    let mut input = LumberjackInput::new(lumberjack_config(&pki, false, AckMode::OnCommit));
    let addr = input.connect().await.unwrap();

    let mut client = pki.connect(addr, Identity::Anonymous).await.unwrap();
    client.write_all(&frames::json_window(&[json!(1), json!(2)])).await.unwrap();

    let (records, ack) = input.read_batch(&deadline(5000)).await.unwrap();
    assert_eq!(records.len(), 2);
    assert!(!ack.is_noop());

    // Keepalives flow while the caller is still processing.
    tokio::time::sleep(Duration::from_millis(200)).await;
    ack.commit().unwrap();

    let (sequence, keepalives) = read_final_ack(&mut client).await.unwrap();
    assert_eq!(sequence, 2);
    assert!(keepalives >= 1);

    input.close().await.unwrap();
}

#[tokio::test]
async fn on_commit_reject_withholds_ack() {
    let pki = Pki::generate();
    let mut input = LumberjackInput::new(lumberjack_config(&pki, false, AckMode::OnCommit));
    let addr = input.connect().await.unwrap();

    let mut client = pki.connect(addr, Identity::Anonymous).await.unwrap();
    client.write_all(&frames::json_window(&[json!(1)])).await.unwrap();

    let (_, ack) = input.read_batch(&deadline(5000)).await.unwrap();
    ack.ack(Err("downstream unavailable")).unwrap();

    // Only keepalives, then the server hangs up so the shipper resends.
    loop {
        match tokio::time::timeout(Duration::from_secs(5), read_ack(&mut client))
            .await
            .expect("connection should close")
        {
            Ok(sequence) => assert_eq!(sequence, 0),
            Err(_) => break,
        }
    }

    input.close().await.unwrap();
}

#[tokio::test]
async fn ack_after_connection_loss_is_reported() {
    let pki = Pki::generate();
    let mut input = LumberjackInput::new(lumberjack_config(&pki, false, AckMode::OnCommit));
    let addr = input.connect().await.unwrap();

    let mut client = pki.connect(addr, Identity::Anonymous).await.unwrap();
    client.write_all(&frames::json_window(&[json!(1)])).await.unwrap();
    let (_, ack) = input.read_batch(&deadline(5000)).await.unwrap();

    // Closing the input tears down every connection task.
    input.close().await.unwrap();
    assert!(matches!(ack.commit(), Err(InputError::Ack)));
}

#[tokio::test]
async fn malformed_frames_drop_only_that_connection() {
    let pki = Pki::generate();
    let mut input = LumberjackInput::new(lumberjack_config(&pki, false, AckMode::Immediate));
    let addr = input.connect().await.unwrap();

    // Version 1 framing is not accepted.
    let mut bad = pki.connect(addr, Identity::Anonymous).await.unwrap();
    bad.write_all(b"1W\x00\x00\x00\x01").await.unwrap();
    let mut buf = [0u8; 6];
    let read = tokio::time::timeout(Duration::from_secs(5), bad.read(&mut buf))
        .await
        .expect("server should close the connection");
    assert!(matches!(read, Err(_) | Ok(0)));

    // Compressed blocks may not nest.
    let nested = frames::compressed(&frames::compressed(&frames::json_window(&[json!(1)])).unwrap()).unwrap();
    let mut bad = pki.connect(addr, Identity::Anonymous).await.unwrap();
    bad.write_all(&nested).await.unwrap();
    let read = tokio::time::timeout(Duration::from_secs(5), bad.read(&mut buf))
        .await
        .expect("server should close the connection");
    assert!(matches!(read, Err(_) | Ok(0)));

    let mut good = pki.connect(addr, Identity::Anonymous).await.unwrap();
    good.write_all(&frames::json_window(&[json!("fine")])).await.unwrap();
    let (records, _) = input.read_batch(&deadline(5000)).await.unwrap();
    assert_eq!(records[0].payload(), &json!("fine"));

    input.close().await.unwrap();
}
