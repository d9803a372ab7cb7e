use axum::{
    body::Bytes,
    extract::State,
    response::Json,
};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiQuery};
use crate::services::reconciliation::PaymentNotification;
use crate::AppState;

#[derive(Deserialize)]
pub struct WebhookQuery {
    pub user_id: Option<String>,
}

#[derive(Serialize)]
pub struct WebhookResponse {
    pub status: &'static str,
    pub reason: &'static str,
}

/// Payment notifications from the provider. Answers 200 for every business
/// outcome so the sender does not retry; only a body we cannot read is a 400.
pub async fn payment_webhook(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<WebhookQuery>,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    let notification: PaymentNotification = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Malformed notification: {}", e)))?;

    let ack = state
        .reconciler
        .handle_notification(&notification, query.user_id.as_deref())
        .await?;

    tracing::info!(status = ack.status(), reason = ack.reason(), "Webhook acknowledged");
    Ok(Json(WebhookResponse {
        status: ack.status(),
        reason: ack.reason(),
    }))
}
