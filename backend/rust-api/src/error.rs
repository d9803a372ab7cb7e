//! HTTP error boundary. Every handler returns `ApiError`, which renders as
//! `{"error": ..., "code": ...}` with the matching status.

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::database::StoreError;
use crate::services::{GatewayError, LedgerError, ReconcileError};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Authentication required or session invalid")]
    Unauthorized,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    SaleClosed(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "AUTH_DECLINED"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::SaleClosed(_) => (StatusCode::CONFLICT, "SALE_CLOSED"),
            ApiError::Gateway(GatewayError::Timeout) => {
                (StatusCode::GATEWAY_TIMEOUT, "GATEWAY_TIMEOUT")
            }
            ApiError::Gateway(_) => (StatusCode::BAD_GATEWAY, "GATEWAY_ERROR"),
            ApiError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = match &self {
            // Store details stay in the logs.
            ApiError::Store(e) => {
                tracing::error!("Store error: {}", e);
                "Database error".to_string()
            }
            ApiError::Gateway(e) => {
                tracing::warn!("Payment gateway error: {}", e);
                self.to_string()
            }
            _ => self.to_string(),
        };

        let body = serde_json::json!({
            "error": message,
            "code": code,
        });
        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        let message = e.to_string();
        match e {
            LedgerError::NotFound(_) => ApiError::NotFound(message),
            LedgerError::Closed(_) => ApiError::SaleClosed(message),
            LedgerError::Store(e) => ApiError::Store(e),
        }
    }
}

impl From<ReconcileError> for ApiError {
    fn from(e: ReconcileError) -> Self {
        let message = e.to_string();
        match e {
            ReconcileError::UserNotFound(_) => ApiError::NotFound(message),
            ReconcileError::MissingCredential(_) | ReconcileError::InvalidNotification(_) => {
                ApiError::BadRequest(message)
            }
            ReconcileError::Gateway(e) => ApiError::Gateway(e),
            ReconcileError::Store(e) => ApiError::Store(e),
        }
    }
}

/// `Json` extractor whose rejection is an `ApiError`.
#[derive(axum::extract::FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

#[derive(axum::extract::FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_timeout_and_failure_map_differently() {
        let timeout = ApiError::Gateway(GatewayError::Timeout).into_response();
        assert_eq!(timeout.status(), StatusCode::GATEWAY_TIMEOUT);

        let down = ApiError::Gateway(GatewayError::Unreachable("refused".into())).into_response();
        assert_eq!(down.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn closed_sale_is_a_conflict() {
        let response = ApiError::from(LedgerError::Closed(uuid::Uuid::nil())).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
