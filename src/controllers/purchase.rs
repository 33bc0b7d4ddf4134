use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::sync::Arc;
use validator::Validate;

use crate::error::ApiError;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/purchase", post(purchase))
}

// POST /purchase
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRequest {
    #[validate(
        required(message = "Missing userId, eventId, or quantity"),
        length(min = 1, message = "userId must not be empty")
    )]
    pub user_id: Option<String>,

    #[validate(
        required(message = "Missing userId, eventId, or quantity"),
        length(min = 1, message = "eventId must not be empty")
    )]
    pub event_id: Option<String>,

    #[validate(
        required(message = "Missing userId, eventId, or quantity"),
        range(min = 1, message = "Quantity must be a positive number")
    )]
    pub quantity: Option<i64>,
}

/// Запрос, прошедший проверку: идентификаторы непустые, количество кратно партии.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidPurchase {
    pub user_id: String,
    pub event_id: String,
    pub quantity: NonZeroU32,
}

impl PurchaseRequest {
    pub fn into_valid(self, batch_size: u32) -> Result<ValidPurchase, ApiError> {
        self.validate().map_err(|errors| ApiError::Validation(first_message(&errors)))?;

        let (Some(user_id), Some(event_id), Some(quantity)) = (self.user_id, self.event_id, self.quantity) else {
            return Err(ApiError::Validation("Missing userId, eventId, or quantity".to_string()));
        };

        if quantity % i64::from(batch_size) != 0 {
            return Err(ApiError::Validation(format!(
                "Quantity must be a multiple of {batch_size}"
            )));
        }

        let quantity = u32::try_from(quantity)
            .ok()
            .and_then(NonZeroU32::new)
            .ok_or_else(|| ApiError::Validation("Quantity is out of range".to_string()))?;

        Ok(ValidPurchase { user_id, event_id, quantity })
    }
}

// Первое сообщение по фиксированному порядку полей, чтобы ответ был стабильным.
fn first_message(errors: &validator::ValidationErrors) -> String {
    let fields = errors.field_errors();
    ["user_id", "event_id", "quantity"]
        .iter()
        .filter_map(|field| fields.get(*field))
        .flat_map(|errs| errs.iter())
        .find_map(|e| e.message.as_ref().map(|m| m.to_string()))
        .unwrap_or_else(|| "Invalid purchase request".to_string())
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PurchaseResponse {
    pub success: bool,
    pub tickets: Vec<i64>,
}

async fn purchase(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<PurchaseRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload.map_err(|rejection| {
        ApiError::Validation(format!("Malformed purchase request: {}", rejection.body_text()))
    })?;

    let purchase = req.into_valid(state.config.purchase.batch_size)?;

    let range = state
        .allocator
        .reserve(&purchase.event_id, &purchase.user_id, purchase.quantity)
        .await?;

    Ok((
        StatusCode::OK,
        Json(PurchaseResponse {
            success: true,
            tickets: range.tickets().collect(),
        }),
    ))
}
