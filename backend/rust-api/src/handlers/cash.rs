use axum::{extract::State, response::Json};

use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::services::PendingBox;
use crate::AppState;

/// Open sales from previous days, one entry per unclosed day.
pub async fn pending_boxes(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<PendingBox>>, ApiError> {
    let boxes = state.boxes.pending_boxes(auth.user_id).await?;
    Ok(Json(boxes))
}
