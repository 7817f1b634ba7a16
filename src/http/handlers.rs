//! Ingestion and query endpoints under `/api/v1`.

use std::collections::HashMap;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::http::error::ApiError;
use crate::http::server::AppState;
use crate::ingest::{IngestError, IngestReceipt};
use crate::model::{MetricEntry, Span, Trace};
use crate::observability::metrics;
use crate::storage::aggregate::{calculate_percentile, AggregationQuery, MetricAggregation};
use crate::storage::{export, LogPage, QueryParams, StorageError, TraceSummary};

type Params = Query<HashMap<String, String>>;

fn accepted(receipt: IngestReceipt) -> Response {
    let mut headers = HeaderMap::new();
    receipt.inject_into(&mut headers);
    (StatusCode::ACCEPTED, headers, Json(receipt)).into_response()
}

fn run_ingest<F>(kind: &'static str, f: F) -> Result<Response, ApiError>
where
    F: FnOnce() -> Result<IngestReceipt, IngestError>,
{
    match f() {
        Ok(receipt) => {
            tracing::debug!(kind, accepted = receipt.accepted, "Ingest accepted");
            Ok(accepted(receipt))
        }
        Err(e) => {
            tracing::warn!(kind, error = %e, "Ingest rejected");
            Err(e.into())
        }
    }
}

pub async fn post_spans(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Result<Response, ApiError> {
    run_ingest("spans", || state.ingest.ingest_spans(&headers, &body))
}

pub async fn post_trace(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Result<Response, ApiError> {
    run_ingest("traces", || state.ingest.ingest_trace(&headers, &body))
}

pub async fn post_logs(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Result<Response, ApiError> {
    run_ingest("logs", || state.ingest.ingest_logs(&headers, &body))
}

pub async fn post_metrics(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Result<Response, ApiError> {
    run_ingest("metrics", || state.ingest.ingest_metrics(&headers, &body))
}

/// Time a store query for `pulse_query_duration_seconds`.
fn timed<T>(kind: &'static str, f: impl FnOnce() -> Result<T, StorageError>) -> Result<T, ApiError> {
    let start = Instant::now();
    let result = f();
    metrics::record_query(kind, start);
    Ok(result?)
}

pub async fn get_logs(State(state): State<AppState>, Query(query): Params) -> Result<Json<LogPage>, ApiError> {
    let params = QueryParams::from_query(&query, Utc::now())?;
    timed("logs", || state.store.query_logs(&params)).map(Json)
}

pub async fn get_metrics(
    State(state): State<AppState>,
    Query(query): Params,
) -> Result<Json<Vec<MetricEntry>>, ApiError> {
    let params = QueryParams::from_query(&query, Utc::now())?;
    timed("metrics", || state.store.query_metrics(&params)).map(Json)
}

pub async fn get_spans(State(state): State<AppState>, Query(query): Params) -> Result<Json<Vec<Span>>, ApiError> {
    let params = QueryParams::from_query(&query, Utc::now())?;
    timed("spans", || state.store.query_spans(&params)).map(Json)
}

pub async fn get_traces(
    State(state): State<AppState>,
    Query(query): Params,
) -> Result<Json<Vec<TraceSummary>>, ApiError> {
    let params = QueryParams::from_query(&query, Utc::now())?;
    timed("traces", || state.store.query_traces(&params)).map(Json)
}

pub async fn get_trace(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Trace>, ApiError> {
    timed("trace", || state.store.get_trace(&id))?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("trace {id} not found")))
}

pub async fn get_services(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    timed("services", || state.store.get_services()).map(Json)
}

pub async fn get_metric_aggregate(
    State(state): State<AppState>,
    Query(query): Params,
) -> Result<Json<MetricAggregation>, ApiError> {
    let agg = AggregationQuery::from_query(&query, Utc::now())?;
    timed("aggregate", || state.store.aggregate_metrics(&agg)).map(Json)
}

/// Prometheus text for one metric (`name=`) or every known metric name.
pub async fn get_metric_export(State(state): State<AppState>, Query(query): Params) -> Result<Response, ApiError> {
    let now = Utc::now();
    let names = match query.get("name") {
        Some(name) => vec![name.clone()],
        None => state.store.get_metric_names()?,
    };

    let mut aggregations = Vec::with_capacity(names.len());
    for name in names {
        let mut per_metric = query.clone();
        per_metric.insert("name".to_string(), name);
        let agg = AggregationQuery::from_query(&per_metric, now)?;
        aggregations.push(timed("export", || state.store.aggregate_metrics(&agg))?);
    }

    let body = export::render_all(&aggregations);
    Ok((
        [(CONTENT_TYPE, HeaderValue::from_static("text/plain; version=0.0.4"))],
        body,
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
pub struct PercentileQuery {
    pub p: f64,
}

#[derive(Debug, Serialize)]
pub struct PercentileResponse {
    pub metric_id: String,
    pub percentile: f64,
    pub value: Option<f64>,
}

pub async fn get_metric_percentile(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<PercentileQuery>,
) -> Result<Json<PercentileResponse>, ApiError> {
    if !(0.0..=100.0).contains(&query.p) {
        return Err(crate::storage::ParamError::InvalidValue {
            name: "p",
            value: query.p.to_string(),
        }
        .into());
    }
    let histogram = state
        .store
        .histogram(&id)?
        .ok_or_else(|| StorageError::NotFound(format!("histogram for metric {id}")))?;

    Ok(Json(PercentileResponse {
        value: calculate_percentile(&histogram, query.p),
        metric_id: id,
        percentile: query.p,
    }))
}
