//! WebSocket stream tests against a live server.

use std::collections::HashSet;
use std::time::Duration;

use futures_util::StreamExt;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

mod common;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn post_logs(server: &common::TestServer, messages: &[&str]) {
    let logs: Vec<Value> = messages
        .iter()
        .map(|m| json!({"service": "api", "level": "info", "message": m}))
        .collect();
    let res = common::client()
        .post(server.url("/api/v1/logs"))
        .json(&json!({"logs": logs}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 202);
}

/// Next text frame as JSON, or None if the socket closed or timed out.
async fn next_envelope(socket: &mut Socket, wait: Duration) -> Option<Value> {
    let deadline = tokio::time::Instant::now() + wait;
    loop {
        let frame = tokio::time::timeout_at(deadline, socket.next()).await.ok()??.ok()?;
        match frame {
            Message::Text(_) => return serde_json::from_str(frame.to_text().ok()?).ok(),
            Message::Close(_) => return None,
            _ => continue,
        }
    }
}

fn ids(envelope: &Value) -> Vec<String> {
    envelope["payload"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_log_stream_initial_then_incremental() {
    let server = common::start_server().await;
    post_logs(&server, &["one", "two", "three"]).await;

    let (mut socket, _) = connect_async(server.ws_url("/api/v1/stream/logs")).await.unwrap();

    let initial = next_envelope(&mut socket, Duration::from_secs(2)).await.unwrap();
    assert_eq!(initial["type"], "logs");
    assert_eq!(initial["initial"], true);
    let mut seen: HashSet<String> = ids(&initial).into_iter().collect();
    assert_eq!(seen.len(), 3);

    tokio::time::sleep(Duration::from_millis(20)).await;
    post_logs(&server, &["four", "five"]).await;

    let mut delivered = 0;
    while delivered < 2 {
        let batch = next_envelope(&mut socket, Duration::from_secs(2)).await.unwrap();
        assert_eq!(batch["initial"], false);
        for id in ids(&batch) {
            assert!(seen.insert(id), "record delivered twice");
            delivered += 1;
        }
    }
    assert_eq!(delivered, 2);

    // Quiet ticks send nothing.
    assert!(next_envelope(&mut socket, Duration::from_millis(200)).await.is_none());
    socket.close(None).await.unwrap();
}

#[tokio::test]
async fn test_empty_store_sends_no_initial_batch() {
    let server = common::start_server().await;
    let (mut socket, _) = connect_async(server.ws_url("/api/v1/stream/traces")).await.unwrap();

    assert!(next_envelope(&mut socket, Duration::from_millis(200)).await.is_none());

    common::client()
        .post(server.url("/api/v1/spans"))
        .json(&json!({"name": "GET /", "service": "web", "duration_ms": 3}))
        .send()
        .await
        .unwrap();

    let batch = next_envelope(&mut socket, Duration::from_secs(2)).await.unwrap();
    assert_eq!(batch["type"], "traces");
    assert_eq!(batch["initial"], false);
    assert_eq!(batch["payload"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_stream_filters_apply() {
    let server = common::start_server().await;
    let client = common::client();
    client
        .post(server.url("/api/v1/metrics"))
        .json(&json!({"metrics": [
            {"name": "mem", "type": "gauge", "value": 1.0, "service": "api"},
            {"name": "mem", "type": "gauge", "value": 2.0, "service": "worker"}
        ]}))
        .send()
        .await
        .unwrap();

    let (mut socket, _) = connect_async(server.ws_url("/api/v1/stream/metrics?service=worker"))
        .await
        .unwrap();
    let initial = next_envelope(&mut socket, Duration::from_secs(2)).await.unwrap();
    let payload = initial["payload"].as_array().unwrap();
    assert_eq!(payload.len(), 1);
    assert_eq!(payload[0]["service"], "worker");
}

#[tokio::test]
async fn test_unknown_stream_kind_rejected() {
    let server = common::start_server().await;
    let result = connect_async(server.ws_url("/api/v1/stream/events")).await;
    match result {
        Err(tokio_tungstenite::tungstenite::Error::Http(response)) => {
            assert_eq!(response.status(), 404);
        }
        Err(e) => panic!("expected HTTP rejection, got {e}"),
        Ok(_) => panic!("unknown stream kind was upgraded"),
    }
}

#[tokio::test]
async fn test_connection_deregisters_on_close() {
    let server = common::start_server().await;
    let (mut socket, _) = connect_async(server.ws_url("/api/v1/stream/logs")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.state.streams.active_count(), 1);

    socket.close(None).await.unwrap();
    let mut active = 1;
    for _ in 0..40 {
        tokio::time::sleep(Duration::from_millis(25)).await;
        active = server.state.streams.active_count();
        if active == 0 {
            break;
        }
    }
    assert_eq!(active, 0);

    let stats = server.state.streams.stats();
    assert_eq!(stats.opened, 1);
    assert_eq!(stats.closed, 1);
}

#[tokio::test]
async fn test_shutdown_closes_streams() {
    let server = common::start_server().await;
    let (mut socket, _) = connect_async(server.ws_url("/api/v1/stream/logs")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    server.shutdown.trigger();

    let closed = tokio::time::timeout(Duration::from_secs(2), async {
        while let Some(frame) = socket.next().await {
            match frame {
                Ok(Message::Close(_)) | Err(_) => return true,
                Ok(_) => continue,
            }
        }
        true
    })
    .await
    .unwrap();
    assert!(closed);
}
