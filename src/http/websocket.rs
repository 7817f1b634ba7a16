//! WebSocket upgrade for `/api/v1/stream/{kind}`.
//!
//! Query parameters are parsed before the upgrade, so a bad filter is a
//! plain HTTP 400 rather than a socket that closes immediately.

use std::collections::HashMap;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::response::Response;
use chrono::Utc;

use crate::http::error::ApiError;
use crate::http::server::AppState;
use crate::storage::QueryParams;
use crate::stream::{self, StreamKind, StreamSession};

pub async fn stream_handler(
    ws: WebSocketUpgrade,
    Path(kind): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    let kind: StreamKind = kind.parse().map_err(ApiError::NotFound)?;
    let params = QueryParams::from_query(&query, Utc::now())?;

    let session = StreamSession::new(kind, params, state.store.clone());
    let registry = state.streams.clone();
    let shutdown = state.shutdown.subscribe();
    let tick = state.tick;

    Ok(ws.on_upgrade(move |socket| async move {
        stream::serve(socket, session, registry, tick, shutdown).await;
    }))
}
