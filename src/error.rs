use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

/// Исход неудачного резерва. Любой вариант означает, что транзакция откатилась
/// целиком и состояние пула и журнала не изменилось.
#[derive(Debug, Error)]
pub enum AllocationError {
    #[error("Event not found: {0}")]
    EventNotFound(String),

    #[error("Not enough tickets available: requested {requested}, available {available}")]
    InsufficientQuota { requested: i64, available: i64 },

    #[error("Ticket store unavailable")]
    StoreUnavailable(#[from] sqlx::Error),
}

impl AllocationError {
    pub fn code(&self) -> &'static str {
        match self {
            AllocationError::EventNotFound(_) => "EVENT_NOT_FOUND",
            AllocationError::InsufficientQuota { .. } => "INSUFFICIENT_QUOTA",
            AllocationError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
        }
    }
}

/// Ошибки HTTP-слоя.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Allocation(#[from] AllocationError),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Allocation(AllocationError::StoreUnavailable(_)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::Allocation(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Сообщение для клиента. Внутренние детали хранилища наружу не отдаём.
    pub fn public_message(&self) -> String {
        match self {
            ApiError::Validation(msg) => msg.clone(),
            ApiError::Allocation(AllocationError::EventNotFound(_)) => "Event not found".to_string(),
            ApiError::Allocation(AllocationError::InsufficientQuota { .. }) => {
                "Not enough tickets available".to_string()
            }
            ApiError::Allocation(AllocationError::StoreUnavailable(_)) => {
                "Ticket store is temporarily unavailable".to_string()
            }
        }
    }

    fn log(&self) {
        match self {
            ApiError::Validation(msg) => warn!(reason = %msg, "Purchase request rejected"),
            ApiError::Allocation(AllocationError::StoreUnavailable(e)) => {
                error!(error = ?e, "Store failure while serving request")
            }
            ApiError::Allocation(e) => warn!(code = e.code(), error = %e, "Allocation rejected"),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.log();
        let body = ErrorBody {
            success: false,
            error: self.public_message(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}
