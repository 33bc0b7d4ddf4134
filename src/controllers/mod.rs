pub mod pools;
pub mod purchase;

use axum::{routing::get, Router};
use std::sync::Arc;

use crate::AppState;

pub fn routes(state: &AppState) -> Router<Arc<AppState>> {
    let mut router = Router::new()
        .route("/", get(|| async { "Ticket Allocator API v1.0" }))
        .route("/health", get(health))
        .merge(purchase::routes())
        .merge(pools::routes());

    if state.config.features.enable_test_reset {
        tracing::warn!("Test reset route is enabled");
        router = router.merge(pools::reset_route());
    }

    router
}

async fn health(
    axum::extract::State(state): axum::extract::State<Arc<AppState>>,
) -> (axum::http::StatusCode, &'static str) {
    match state.db.ping().await {
        Ok(()) => (axum::http::StatusCode::OK, "OK"),
        Err(e) => {
            tracing::error!("health check failed: {:?}", e);
            (axum::http::StatusCode::SERVICE_UNAVAILABLE, "DATABASE UNAVAILABLE")
        }
    }
}
