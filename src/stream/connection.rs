//! WebSocket connection driver.
//!
//! ```text
//! Connecting ──upgrade──▶ Open ──initial query──▶ Tick* ──▶ Closed
//!                                                   ▲  │
//!                                                   └──┘ every `tick`
//! ```
//!
//! The socket is split. A reader task drains inbound frames and reports
//! when the client goes away. The writer runs the tick loop and never
//! waits on the reader. Client close, a failed write and server shutdown
//! all end the loop; the registry guard then deregisters the connection.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use chrono::Utc;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::{broadcast, oneshot};
use tokio::time::MissedTickBehavior;

use crate::stream::envelope::{Envelope, StreamKind};
use crate::stream::registry::{ConnectionId, StreamRegistry};
use crate::stream::session::StreamSession;

/// Why a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    ClientClosed,
    WriteFailed,
    Shutdown,
}

/// Drive one stream connection until it closes.
pub async fn serve(
    socket: WebSocket,
    mut session: StreamSession,
    registry: Arc<StreamRegistry>,
    tick: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> CloseReason {
    let kind = session.kind();
    let guard = registry.register(kind);
    let id = guard.id();
    let (mut sink, mut inbound) = socket.split();

    let (closed_tx, mut closed_rx) = oneshot::channel::<()>();
    let reader = tokio::spawn(async move {
        while let Some(frame) = inbound.next().await {
            match frame {
                Ok(Message::Close(_)) | Err(_) => break,
                // Pongs are queued by the protocol layer on read.
                Ok(_) => {}
            }
        }
        let _ = closed_tx.send(());
    });

    tracing::info!(connection_id = %id, stream = %kind, "Stream opened");

    let reason = 'run: {
        if let Some(envelope) = session.open(Utc::now()) {
            if push(&mut sink, &registry, id, kind, &envelope).await.is_err() {
                break 'run CloseReason::WriteFailed;
            }
        }

        let mut ticker = tokio::time::interval(tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Some(envelope) = session.poll(Utc::now()) {
                        if push(&mut sink, &registry, id, kind, &envelope).await.is_err() {
                            break 'run CloseReason::WriteFailed;
                        }
                    }
                }
                _ = &mut closed_rx => break 'run CloseReason::ClientClosed,
                _ = shutdown.recv() => {
                    let _ = sink.send(Message::Close(None)).await;
                    break 'run CloseReason::Shutdown;
                }
            }
        }
    };

    reader.abort();
    drop(guard);
    tracing::info!(connection_id = %id, reason = ?reason, "Stream closed");
    reason
}

/// Sent in place of a batch that could not be encoded.
const ENCODE_FAILED: &str = r#"{"type":"error","payload":{"message":"failed to encode batch"},"initial":false}"#;

/// Encode a frame. Returns the error envelope and the encoding error when
/// `envelope` cannot be serialized.
fn encode<T: Serialize>(envelope: &T) -> Result<String, (String, serde_json::Error)> {
    serde_json::to_string(envelope).map_err(|e| (ENCODE_FAILED.to_string(), e))
}

async fn push(
    sink: &mut SplitSink<WebSocket, Message>,
    registry: &StreamRegistry,
    id: ConnectionId,
    kind: StreamKind,
    envelope: &Envelope,
) -> Result<(), axum::Error> {
    let (text, failed) = match encode(envelope) {
        Ok(text) => (text, envelope.is_error()),
        Err((fallback, e)) => {
            tracing::error!(connection_id = %id, error = %e, "Failed to encode envelope");
            (fallback, true)
        }
    };

    if let Err(e) = sink.send(Message::Text(text.into())).await {
        tracing::debug!(connection_id = %id, error = %e, "Stream write failed");
        return Err(e);
    }

    if failed {
        registry.record_error();
    } else {
        registry.record_batch(kind, envelope.record_count());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::ser::Error as _;
    use serde::Serializer;

    struct Unencodable;

    impl Serialize for Unencodable {
        fn serialize<S: Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
            Err(S::Error::custom("unencodable"))
        }
    }

    #[test]
    fn failed_encoding_becomes_error_envelope() {
        let (text, _) = encode(&Unencodable).unwrap_err();
        let frame: Envelope = serde_json::from_str(&text).unwrap();
        assert!(frame.is_error());
        assert!(!frame.initial);
        assert_eq!(frame.payload["message"], "failed to encode batch");
    }

    #[test]
    fn batch_encodes_as_is() {
        let batch = Envelope::batch(StreamKind::Logs, serde_json::json!([{"id": "a"}]), false);
        let text = encode(&batch).unwrap();
        assert!(text.contains(r#""type":"logs""#));
    }
}
