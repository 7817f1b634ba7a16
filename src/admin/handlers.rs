use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::http::error::ApiError;
use crate::http::server::AppState;
use crate::storage::StoreStats;
use crate::stream::{ConnectionInfo, StreamStats};

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: i64,
}

#[derive(Serialize)]
pub struct StatsSummary {
    pub store: StoreStats,
    pub streams: StreamStats,
    pub connections: Vec<ConnectionInfo>,
}

#[derive(Serialize)]
pub struct ClearSummary {
    pub cleared: StoreStats,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        started_at: state.started_at,
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
    })
}

pub async fn get_stats(State(state): State<AppState>) -> Result<Json<StatsSummary>, ApiError> {
    Ok(Json(StatsSummary {
        store: state.store.stats()?,
        streams: state.streams.stats(),
        connections: state.streams.connections(),
    }))
}

/// Operator bulk clear of every stored record.
pub async fn clear_data(State(state): State<AppState>) -> Result<Json<ClearSummary>, ApiError> {
    let cleared = state.store.stats()?;
    state.store.clear_all()?;
    tracing::warn!(
        logs = cleared.logs,
        metrics = cleared.metrics,
        spans = cleared.spans,
        "Store cleared by operator"
    );
    Ok(Json(ClearSummary { cleared }))
}
