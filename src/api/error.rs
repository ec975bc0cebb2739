use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::engine::EngineError;

/// Error body returned by every endpoint: `{"code": ..., "message": ...}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        let (status, code) = match &e {
            EngineError::NotFound(_) | EngineError::OrderNotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            EngineError::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
            EngineError::LimitExceeded(_) => (StatusCode::BAD_REQUEST, "limit_exceeded"),
            EngineError::Forbidden { .. } => (StatusCode::FORBIDDEN, "forbidden"),
            EngineError::DuplicateHold { .. } => (StatusCode::CONFLICT, "duplicate_hold"),
            EngineError::SlotTaken { .. } => (StatusCode::CONFLICT, "slot_taken"),
            EngineError::InvalidTransition { .. } => (StatusCode::CONFLICT, "invalid_transition"),
            EngineError::Conflict { .. } => (StatusCode::CONFLICT, "conflict"),
            EngineError::PaymentOnRejectedReservation { .. } => {
                (StatusCode::GONE, "payment_on_rejected_reservation")
            }
            EngineError::Gateway(_) => (StatusCode::BAD_GATEWAY, "gateway"),
            EngineError::WalError(msg) => {
                tracing::error!("storage failure: {msg}");
                return Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", "internal error");
            }
        };
        Self::new(status, code, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "code": self.code, "message": self.message }));
        (self.status, body).into_response()
    }
}
