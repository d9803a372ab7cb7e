use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiJson, ApiQuery};
use crate::middleware::AuthUser;
use crate::models::ids::parse_uuid;
use crate::models::{Sale, SaleChanges, SaleStatus, SaleType};
use crate::utils::date;
use crate::AppState;

#[derive(Deserialize)]
pub struct CreateSaleRequest {
    pub amount: Decimal,
    #[serde(rename = "type")]
    pub sale_type: SaleType,
    #[serde(default, alias = "comments")]
    pub comment: String,
}

#[derive(Deserialize)]
pub struct ListSalesQuery {
    pub status: Option<SaleStatus>,
    #[serde(default, deserialize_with = "date::deserialize_opt")]
    pub date: Option<NaiveDate>,
}

#[derive(Serialize)]
pub struct CloseBoxResponse {
    pub closed: u64,
}

pub async fn create_sale(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(payload): ApiJson<CreateSaleRequest>,
) -> Result<(StatusCode, Json<Sale>), ApiError> {
    let sale = state
        .ledger
        .create(auth.user_id, payload.amount, payload.sale_type, payload.comment)
        .await?;
    Ok((StatusCode::CREATED, Json(sale)))
}

pub async fn list_sales(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiQuery(query): ApiQuery<ListSalesQuery>,
) -> Result<Json<Vec<Sale>>, ApiError> {
    let sales = state
        .ledger
        .list(auth.user_id, query.status, query.date)
        .await?;
    Ok(Json(sales))
}

pub async fn update_sale(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    ApiJson(changes): ApiJson<SaleChanges>,
) -> Result<Json<Sale>, ApiError> {
    let id = parse_uuid(&id, "sale id").map_err(ApiError::BadRequest)?;
    let sale = state.ledger.amend(auth.user_id, id, &changes).await?;
    Ok(Json(sale))
}

pub async fn close_box(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<CloseBoxResponse>, ApiError> {
    let closed = state.ledger.close_box(auth.user_id).await?;
    Ok(Json(CloseBoxResponse { closed }))
}
