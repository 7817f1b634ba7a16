//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with ingestion, query, stream and admin routes
//! - Wire up middleware (tracing, request ID, limits, timeout, metrics)
//! - Serve on a listener until shutdown is triggered

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{DefaultBodyLimit, Request};
use axum::routing::{get, post};
use axum::{middleware, Router};
use chrono::{DateTime, Utc};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::admin;
use crate::config::PulseConfig;
use crate::http::handlers;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer, track_metrics, X_REQUEST_ID};
use crate::http::websocket::stream_handler;
use crate::ingest::IngestionProcessor;
use crate::lifecycle::Shutdown;
use crate::storage::Storage;
use crate::stream::StreamRegistry;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Storage>,
    pub ingest: Arc<IngestionProcessor>,
    pub streams: Arc<StreamRegistry>,
    pub shutdown: Shutdown,
    /// Stream tick interval.
    pub tick: Duration,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: &PulseConfig, store: Arc<dyn Storage>, shutdown: Shutdown) -> Self {
        Self {
            ingest: Arc::new(IngestionProcessor::new(store.clone())),
            store,
            streams: Arc::new(StreamRegistry::new()),
            shutdown,
            tick: Duration::from_millis(config.stream.tick_ms),
            started_at: Utc::now(),
        }
    }
}

/// HTTP server for Pulse.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    pub fn new(config: &PulseConfig, store: Arc<dyn Storage>, shutdown: Shutdown) -> Self {
        let state = AppState::new(config, store, shutdown);
        let router = Self::build_router(config, state.clone());
        Self { router, state }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &PulseConfig, state: AppState) -> Router {
        let api = Router::new()
            .route("/api/v1/spans", post(handlers::post_spans).get(handlers::get_spans))
            .route("/api/v1/traces", post(handlers::post_trace).get(handlers::get_traces))
            .route("/api/v1/traces/{id}", get(handlers::get_trace))
            .route("/api/v1/logs", post(handlers::post_logs).get(handlers::get_logs))
            .route("/api/v1/metrics", post(handlers::post_metrics).get(handlers::get_metrics))
            .route("/api/v1/metrics/aggregate", get(handlers::get_metric_aggregate))
            .route("/api/v1/metrics/export", get(handlers::get_metric_export))
            .route("/api/v1/metrics/{id}/percentile", get(handlers::get_metric_percentile))
            .route("/api/v1/services", get(handlers::get_services))
            .merge(admin::setup_admin_router())
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)));

        // Streams outlive any request timeout.
        let streams = Router::new().route("/api/v1/stream/{kind}", get(stream_handler));

        let stack = ServiceBuilder::new()
            .layer(set_request_id_layer())
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request| {
                let request_id = request
                    .headers()
                    .get(X_REQUEST_ID)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }))
            .layer(propagate_request_id_layer())
            .layer(DefaultBodyLimit::max(config.security.max_body_size))
            .layer(middleware::from_fn(track_metrics));

        api.merge(streams).with_state(state).layer(stack)
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Run the server until the shutdown signal fires.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let shutdown = self.state.shutdown.clone();
        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move { shutdown.wait().await })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, QueryLimits};
    use axum::body::Body;
    use axum::http::StatusCode;
    use tower::ServiceExt;

    fn server(max_body_size: usize) -> HttpServer {
        let mut config = PulseConfig::default();
        config.security.max_body_size = max_body_size;
        let store = Arc::new(MemoryStore::new(QueryLimits::default()));
        HttpServer::new(&config, store, Shutdown::new())
    }

    fn post_log(message: &str) -> Request {
        axum::http::Request::post("/api/v1/logs")
            .header("content-type", "application/json")
            .body(Body::from(format!(r#"{{"service":"api","message":"{message}"}}"#)))
            .unwrap()
    }

    #[tokio::test]
    async fn body_limit_applies_behind_metrics_middleware() {
        let router = server(128).router;

        let small = router.clone().oneshot(post_log("ok")).await.unwrap();
        assert_eq!(small.status(), StatusCode::ACCEPTED);
        assert!(small.headers().contains_key(X_REQUEST_ID));

        let large = router.oneshot(post_log(&"x".repeat(512))).await.unwrap();
        assert_eq!(large.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
