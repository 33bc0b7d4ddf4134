//! pools.rs
//!
//! Чтение состояния пулов и журнала выдач (аудит по событию и по покупателю),
//! а также тестовый сброс.
//! Сброс монтируется только при `ENABLE_TEST_RESET=true`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{AllocationError, ApiError};
use crate::models::{Allocation, Pool};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/pools", get(list_pools))
        .route("/pools/{event_id}", get(get_pool))
        .route("/pools/{event_id}/allocations", get(list_allocations))
        .route("/users/{user_id}/allocations", get(list_user_allocations))
}

pub fn reset_route() -> Router<Arc<AppState>> {
    Router::new()
        .route("/pools/{event_id}/reset", post(reset_pool))
}

#[derive(Debug, Serialize)]
struct PoolResponse {
    success: bool,
    pool: PoolView,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PoolView {
    event_id: String,
    total: i64,
    available: i64,
    next_ticket_number: i64,
    issued: i64,
}

impl From<Pool> for PoolView {
    fn from(pool: Pool) -> Self {
        PoolView {
            issued: pool.issued(),
            event_id: pool.event_id,
            total: pool.total,
            available: pool.available,
            next_ticket_number: pool.next_ticket_number,
        }
    }
}

// GET /pools
async fn list_pools(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let pools = state.store.list().await.map_err(AllocationError::from)?;
    let pools: Vec<PoolView> = pools.into_iter().map(PoolView::from).collect();
    Ok(Json(serde_json::json!({ "success": true, "pools": pools })))
}

// GET /pools/{event_id}
async fn get_pool(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let pool = state
        .store
        .get(&event_id)
        .await
        .map_err(AllocationError::from)?
        .ok_or_else(|| AllocationError::EventNotFound(event_id.clone()))?;

    Ok(Json(PoolResponse { success: true, pool: pool.into() }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AllocationView {
    event_id: String,
    user_id: String,
    start_ticket: i64,
    end_ticket: i64,
    quantity: i64,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<Allocation> for AllocationView {
    fn from(a: Allocation) -> Self {
        AllocationView {
            quantity: a.range().len(),
            event_id: a.event_id,
            user_id: a.user_id,
            start_ticket: a.start_ticket,
            end_ticket: a.end_ticket,
            created_at: a.created_at,
        }
    }
}

// GET /pools/{event_id}/allocations
async fn list_allocations(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    if state.store.get(&event_id).await.map_err(AllocationError::from)?.is_none() {
        return Err(AllocationError::EventNotFound(event_id).into());
    }

    let allocations = state
        .ledger
        .list_by_event(&event_id)
        .await
        .map_err(AllocationError::from)?;

    let allocations: Vec<AllocationView> = allocations.into_iter().map(AllocationView::from).collect();
    Ok(Json(serde_json::json!({
        "success": true,
        "eventId": event_id,
        "count": allocations.len(),
        "allocations": allocations,
    })))
}

// GET /users/{user_id}/allocations
async fn list_user_allocations(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let allocations = state
        .ledger
        .list_by_user(&user_id)
        .await
        .map_err(AllocationError::from)?;

    let tickets: i64 = allocations.iter().map(|a| a.range().len()).sum();
    let allocations: Vec<AllocationView> = allocations.into_iter().map(AllocationView::from).collect();
    Ok(Json(serde_json::json!({
        "success": true,
        "userId": user_id,
        "count": allocations.len(),
        "tickets": tickets,
        "allocations": allocations,
    })))
}

// POST /pools/{event_id}/reset
#[derive(Debug, Deserialize)]
struct ResetRequest {
    total: i64,
}

async fn reset_pool(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<String>,
    Json(req): Json<ResetRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.total < 0 {
        return Err(ApiError::Validation("total must be >= 0".to_string()));
    }

    let pool = state
        .store
        .reset(&event_id, req.total)
        .await
        .map_err(AllocationError::from)?;

    Ok((StatusCode::OK, Json(PoolResponse { success: true, pool: pool.into() })))
}
