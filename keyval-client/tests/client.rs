mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::io::duplex;

use common::{serve, Behavior, Recorder};
use keyval_client::{ClientConfig, ConnectionState, Entry, ErrorCode, KeyvalClient, KeyvalError};

fn spawn_client(behavior: Behavior) -> (KeyvalClient, Recorder) {
    spawn_client_with(behavior, ClientConfig::default(), 64 * 1024)
}

fn spawn_client_with(
    behavior: Behavior,
    config: ClientConfig,
    pipe_capacity: usize,
) -> (KeyvalClient, Recorder) {
    let (client_end, server_end) = duplex(pipe_capacity);
    let recorder = Recorder::default();
    tokio::spawn(serve(server_end, behavior, recorder.clone()));
    (KeyvalClient::with_transport(client_end, config), recorder)
}

#[tokio::test]
async fn set_then_get_round_trip() {
    let (client, _) = spawn_client(Behavior::Normal);

    client.set(b"user:1", b"alice").await.unwrap();
    assert_eq!(client.get(b"user:1").await.unwrap(), b"alice");

    let key = vec![b'k'; 256];
    let value = vec![b'v'; 512];
    client.set(&key, &value).await.unwrap();
    assert_eq!(client.get(&key).await.unwrap(), value);
}

#[tokio::test]
async fn oversized_key_never_reaches_transport() {
    let (client, recorder) = spawn_client(Behavior::Normal);

    let key = vec![b'k'; 257];
    let err = client.set(&key, b"v").await.unwrap_err();
    assert!(matches!(err, KeyvalError::KeySize { len: 257 }));
    assert_eq!(err.code(), ErrorCode::KeyTooLarge);

    let err = client.set(b"k", &[b'v'; 513]).await.unwrap_err();
    assert!(matches!(err, KeyvalError::ValueSize { len: 513 }));

    let err = client.get(b"bad\x04key").await.unwrap_err();
    assert!(matches!(err, KeyvalError::ReservedByte { .. }));

    // A valid request afterwards is the first frame the server sees.
    client.set(b"k", b"v").await.unwrap();
    assert_eq!(recorder.count(), 1);
    assert_eq!(&recorder.frames()[0][..3], b"set");
}

#[tokio::test]
async fn full_scenario_set_get_del_get() {
    let (client, recorder) = spawn_client(Behavior::Normal);

    client.set(b"session", b"token-123").await.unwrap();
    assert_eq!(client.get(b"session").await.unwrap(), b"token-123");
    client.del(b"session").await.unwrap();

    let err = client.get(b"session").await.unwrap_err();
    match err {
        KeyvalError::ServerResponse(message) => assert_eq!(message, "key not found"),
        other => panic!("unexpected error: {other:?}"),
    }

    let codes: Vec<Vec<u8>> = recorder.frames().iter().map(|f| f[..3].to_vec()).collect();
    assert_eq!(codes, vec![b"set".to_vec(), b"get".to_vec(), b"del".to_vec(), b"get".to_vec()]);
    assert_eq!(client.state().await, ConnectionState::Connected);
}

#[tokio::test]
async fn concurrent_requests_do_not_interleave() {
    // A small pipe forces partial writes, so interleaving would show up as
    // broken frames on the server side.
    let (client, recorder) = spawn_client_with(Behavior::Normal, ClientConfig::default(), 97);
    let client = Arc::new(client);

    let mut handles = Vec::new();
    for id in 0..16 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            let key = format!("key:{id}");
            let value = format!("value:{id}").repeat(20);
            client.set(key.as_bytes(), value.as_bytes()).await.unwrap();
            let read = client.get(key.as_bytes()).await.unwrap();
            assert_eq!(read, value.as_bytes());
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(recorder.count(), 32);
    assert_eq!(client.state().await, ConnectionState::Connected);
}

#[tokio::test]
async fn peer_hang_up_settles_connection_closed() {
    let (client, recorder) = spawn_client(Behavior::HangUp);

    let err = client.get(b"k").await.unwrap_err();
    assert!(matches!(err, KeyvalError::ConnectionClosed));
    assert_eq!(client.state().await, ConnectionState::Closed);

    let err = client.set(b"k", b"v").await.unwrap_err();
    assert!(matches!(err, KeyvalError::ConnectionClosed));
    assert_eq!(recorder.count(), 1);
}

#[tokio::test]
async fn close_while_pending_settles_connection_closed() {
    let (client, recorder) = spawn_client(Behavior::Silent);
    let client = Arc::new(client);

    let pending = {
        let client = client.clone();
        tokio::spawn(async move { client.get(b"k").await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    client.close().await;

    let err = pending.await.unwrap().unwrap_err();
    assert!(matches!(err, KeyvalError::ConnectionClosed));
    assert_eq!(client.state().await, ConnectionState::Closed);

    let err = client.del(b"k").await.unwrap_err();
    assert!(matches!(err, KeyvalError::ConnectionClosed));
    assert_eq!(recorder.count(), 1);
}

#[tokio::test]
async fn truncated_response_is_malformed() {
    let (client, _) = spawn_client(Behavior::Truncate);

    let err = client.get(b"k").await.unwrap_err();
    assert!(matches!(err, KeyvalError::MalformedResponse(_)));
    assert_eq!(client.state().await, ConnectionState::Closed);
}

#[tokio::test]
async fn request_timeout_closes_connection() {
    let config = ClientConfig::builder()
        .request_timeout(Duration::from_millis(50))
        .build();
    let (client, _) = spawn_client_with(Behavior::Silent, config, 64 * 1024);

    let err = client.get(b"k").await.unwrap_err();
    assert!(matches!(err, KeyvalError::Timeout(_)));

    let err = client.get(b"k").await.unwrap_err();
    assert!(matches!(err, KeyvalError::ConnectionClosed));
}

#[tokio::test]
async fn request_timeout_bounds_stalled_write() {
    let config = ClientConfig::builder()
        .request_timeout(Duration::from_millis(50))
        .build();
    // The server end stays open but is never read, so the 772-byte frame
    // cannot fit in the pipe.
    let (client_end, _server_end) = duplex(64);
    let client = KeyvalClient::with_transport(client_end, config);

    let outcome = tokio::time::timeout(Duration::from_secs(2), client.set(b"k", b"v")).await;
    let err = outcome.expect("set outlived its request timeout").unwrap_err();
    assert!(matches!(err, KeyvalError::Timeout(_)));
    assert_eq!(client.state().await, ConnectionState::Closed);
}

#[tokio::test]
async fn connect_on_live_client_skips_credentials() {
    let config = ClientConfig::builder()
        .cert_path("/nonexistent/client.crt")
        .key_path("/nonexistent/client.key")
        .ca_path("/nonexistent/ca.crt")
        .build();
    let (client, recorder) = spawn_client_with(Behavior::Normal, config, 64 * 1024);

    client.connect().await.unwrap();
    client.set(b"k", b"v").await.unwrap();
    assert_eq!(recorder.count(), 1);

    client.close().await;
    let err = client.connect().await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::Setup);
}

#[tokio::test]
async fn unconnected_client_rejects_operations() {
    let client = KeyvalClient::new(ClientConfig::default());
    assert_eq!(client.state().await, ConnectionState::Unconnected);

    let err = client.get(b"k").await.unwrap_err();
    assert!(matches!(err, KeyvalError::ConnectionClosed));
    let err = client.export().await.unwrap_err();
    assert!(matches!(err, KeyvalError::ConnectionClosed));
}

#[tokio::test]
async fn import_rejects_unknown_payload_types() {
    let (client, recorder) = spawn_client(Behavior::Normal);

    let err = client.import(json!(42)).await.unwrap_err();
    assert!(matches!(err, KeyvalError::UnknownType(_)));

    let err = client.import(vec![0xffu8, 0xfe, 0x00]).await.unwrap_err();
    assert!(matches!(err, KeyvalError::UnknownType(_)));

    let err = client.import("{not json").await.unwrap_err();
    assert!(matches!(err, KeyvalError::JsonParse(_)));

    assert_eq!(recorder.count(), 0);
}

#[tokio::test]
async fn import_then_export_entries() {
    let (client, recorder) = spawn_client(Behavior::Normal);

    client
        .import(r#"[{"key":"a","value":"1"},{"key":"b","value":{"nested":true}}]"#)
        .await
        .unwrap();
    client.import(json!({ "c": 3 })).await.unwrap();
    client
        .import_entries(&vec![Entry::new("d", "four")])
        .await
        .unwrap();

    assert_eq!(client.get(b"a").await.unwrap(), b"1");
    assert_eq!(client.get(b"d").await.unwrap(), b"four");

    let entries = client.export_entries().await.unwrap();
    assert_eq!(
        entries,
        vec![
            Entry::new("a", "1"),
            Entry::new("b", json!({ "nested": true })),
            Entry::new("c", 3),
            Entry::new("d", "four"),
        ]
    );

    let raw = client.export().await.unwrap();
    let parsed: Vec<Entry> = serde_json::from_slice(&raw).unwrap();
    assert_eq!(parsed.len(), 4);

    let imports = recorder
        .frames()
        .iter()
        .filter(|frame| frame.starts_with(b"imp"))
        .count();
    assert_eq!(imports, 3);
}

#[tokio::test]
async fn close_is_idempotent() {
    let (client, _) = spawn_client(Behavior::Normal);
    client.set(b"k", b"v").await.unwrap();

    client.close().await;
    client.close().await;
    assert_eq!(client.state().await, ConnectionState::Closed);
}
