//! Operator endpoints: status, stats and bulk clear.

pub mod handlers;

use axum::routing::{delete, get};
use axum::Router;

use self::handlers::*;
use crate::http::server::AppState;

pub fn setup_admin_router() -> Router<AppState> {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/stats", get(get_stats))
        .route("/admin/data", delete(clear_data))
}
