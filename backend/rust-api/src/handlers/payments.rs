use axum::{extract::State, response::Json};
use serde::Serialize;

use crate::database::PaymentStore;
use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::models::PaymentRecord;
use crate::AppState;

#[derive(Serialize)]
pub struct SyncResponse {
    pub message: String,
    pub new: usize,
}

/// Reconciled payments, newest first.
pub async fn list_payments(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<PaymentRecord>>, ApiError> {
    let payments = state.store.list_payments(auth.user_id).await?;
    Ok(Json(payments))
}

/// On-demand pull of the caller's recent approved payments.
pub async fn sync_payments(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<SyncResponse>, ApiError> {
    let report = state.reconciler.sync_merchant(auth.user_id).await?;
    Ok(Json(SyncResponse {
        message: format!("Sync finished, {} new payments reconciled", report.recorded),
        new: report.recorded,
    }))
}
