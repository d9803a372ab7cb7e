//! Outbound client for the payment provider's REST API.
//!
//! Two calls are needed: fetch one payment by id (webhook path, short timeout)
//! and search approved payments in a time window (sync path, longer timeout).
//! Both authenticate with the merchant's own bearer credential.

use axum::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

use crate::config::GatewayConfig;
use crate::models::{ExternalPaymentId, GatewayCredential};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Payment gateway timed out")]
    Timeout,

    #[error("Payment gateway unreachable: {0}")]
    Unreachable(String),

    #[error("Payment gateway returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unexpected payment gateway response: {0}")]
    Decode(String),
}

impl GatewayError {
    /// Worth retrying later: the provider may answer next time.
    pub fn is_transient(&self) -> bool {
        match self {
            GatewayError::Timeout | GatewayError::Unreachable(_) => true,
            GatewayError::Status { status, .. } => *status == 429 || *status >= 500,
            GatewayError::Decode(_) => false,
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GatewayError::Timeout
        } else if e.is_decode() {
            GatewayError::Decode(e.to_string())
        } else {
            GatewayError::Unreachable(e.to_string())
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Payer {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

/// The subset of a provider payment the engine reads. `raw` keeps the full document for audit.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayPayment {
    pub id: ExternalPaymentId,
    #[serde(default)]
    pub status: String,
    pub transaction_amount: Decimal,
    #[serde(default)]
    pub date_created: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub payment_type_id: Option<String>,
    #[serde(default)]
    pub payment_method_id: Option<String>,
    #[serde(default)]
    pub payer: Payer,
    #[serde(skip)]
    pub raw: Value,
}

impl GatewayPayment {
    pub fn from_value(value: Value) -> Result<Self, GatewayError> {
        let mut payment: GatewayPayment = serde_json::from_value(value.clone())
            .map_err(|e| GatewayError::Decode(e.to_string()))?;
        payment.raw = value;
        Ok(payment)
    }

    pub fn is_approved(&self) -> bool {
        self.status == "approved"
    }

    /// Provider creation time, if present and well formed.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.date_created
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// Time window for the pull protocol. `limit` is the page size; at most
/// `max_pages` pages are read.
#[derive(Debug, Clone, Copy)]
pub struct SearchWindow {
    pub begin: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub limit: u32,
    pub max_pages: u32,
}

impl SearchWindow {
    /// The `span` ending at `now`.
    pub fn trailing(now: DateTime<Utc>, span: chrono::Duration, limit: u32, max_pages: u32) -> Self {
        Self {
            begin: now - span,
            end: now,
            limit,
            max_pages,
        }
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn fetch_payment(
        &self,
        credential: &GatewayCredential,
        id: ExternalPaymentId,
    ) -> Result<GatewayPayment, GatewayError>;

    /// Approved payments created inside `window`, newest first. Documents that
    /// do not decode are left out rather than failing the whole search.
    async fn search_payments(
        &self,
        credential: &GatewayCredential,
        window: &SearchWindow,
    ) -> Result<Vec<GatewayPayment>, GatewayError>;
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<Value>,
    #[serde(default)]
    paging: Option<Paging>,
}

#[derive(Debug, Deserialize)]
struct Paging {
    total: u64,
}

/// Decode each search result on its own, logging and dropping the ones that fail.
pub fn decode_results(results: Vec<Value>) -> Vec<GatewayPayment> {
    results
        .into_iter()
        .filter_map(|value| {
            let id = value.get("id").cloned();
            match GatewayPayment::from_value(value) {
                Ok(payment) => Some(payment),
                Err(e) => {
                    tracing::warn!(external_id = ?id, "Skipping undecodable search result: {}", e);
                    None
                }
            }
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct MercadoPagoClient {
    client: Client,
    base_url: String,
    fetch_timeout: Duration,
    search_timeout: Duration,
}

impl MercadoPagoClient {
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .connect_timeout(config.fetch_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            fetch_timeout: config.fetch_timeout,
            search_timeout: config.search_timeout,
        })
    }

    async fn search_page(
        &self,
        credential: &GatewayCredential,
        window: &SearchWindow,
        offset: u64,
    ) -> Result<SearchResponse, GatewayError> {
        let url = format!("{}/v1/payments/search", self.base_url);
        let begin = window.begin.to_rfc3339_opts(SecondsFormat::Secs, true);
        let end = window.end.to_rfc3339_opts(SecondsFormat::Secs, true);
        let limit = window.limit.to_string();
        let offset = offset.to_string();
        tracing::debug!(begin = %begin, end = %end, offset = %offset, "Searching approved payments");

        let response = self
            .client
            .get(&url)
            .bearer_auth(&credential.access_token)
            .query(&[
                ("status", "approved"),
                ("sort", "date_created"),
                ("criteria", "desc"),
                ("limit", limit.as_str()),
                ("offset", offset.as_str()),
                ("range", "date_created"),
                ("begin_date", begin.as_str()),
                ("end_date", end.as_str()),
            ])
            .timeout(self.search_timeout)
            .send()
            .await?;

        let body = Self::read_json(response).await?;
        serde_json::from_value(body).map_err(|e| GatewayError::Decode(e.to_string()))
    }

    async fn read_json(response: reqwest::Response) -> Result<Value, GatewayError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json::<Value>().await?)
    }
}

#[async_trait]
impl PaymentGateway for MercadoPagoClient {
    async fn fetch_payment(
        &self,
        credential: &GatewayCredential,
        id: ExternalPaymentId,
    ) -> Result<GatewayPayment, GatewayError> {
        let url = format!("{}/v1/payments/{}", self.base_url, id);
        tracing::debug!(external_id = id, "Fetching payment detail");

        let response = self
            .client
            .get(&url)
            .bearer_auth(&credential.access_token)
            .timeout(self.fetch_timeout)
            .send()
            .await?;

        GatewayPayment::from_value(Self::read_json(response).await?)
    }

    async fn search_payments(
        &self,
        credential: &GatewayCredential,
        window: &SearchWindow,
    ) -> Result<Vec<GatewayPayment>, GatewayError> {
        let mut payments = Vec::new();
        let mut offset: u64 = 0;

        for _ in 0..window.max_pages.max(1) {
            let page = self.search_page(credential, window, offset).await?;
            let received = page.results.len() as u64;
            offset += received;
            payments.extend(decode_results(page.results));

            let exhausted = match page.paging {
                Some(paging) => offset >= paging.total,
                None => received < u64::from(window.limit),
            };
            if received == 0 || exhausted {
                return Ok(payments);
            }
        }

        tracing::warn!(
            pages = window.max_pages,
            fetched = payments.len(),
            "Payment search hit the page cap, older payments in the window were not read"
        );
        Ok(payments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keeps_raw_document_and_tolerates_nulls() {
        let raw = json!({
            "id": 123,
            "status": "approved",
            "transaction_amount": 1500.5,
            "date_created": "2024-05-10T12:00:00.000-04:00",
            "description": null,
            "payer": {"email": "ana@example.com", "first_name": null}
        });
        let payment = GatewayPayment::from_value(raw.clone()).unwrap();
        assert_eq!(payment.id, 123);
        assert!(payment.is_approved());
        assert_eq!(payment.transaction_amount, Decimal::new(15005, 1));
        assert_eq!(payment.raw, raw);
        assert_eq!(
            payment.created_at().unwrap().to_rfc3339(),
            "2024-05-10T16:00:00+00:00"
        );
    }

    #[test]
    fn malformed_search_results_are_dropped_individually() {
        let results = vec![
            json!({"id": 1, "status": "approved", "transaction_amount": 10}),
            json!({"id": 2, "status": "approved", "transaction_amount": null}),
            json!({"status": "approved", "transaction_amount": 5}),
            json!({"id": 4, "status": "approved", "transaction_amount": "7.25"}),
        ];
        let decoded = decode_results(results);
        let ids: Vec<i64> = decoded.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 4]);
    }

    #[test]
    fn server_errors_are_transient_client_errors_are_not() {
        let server = GatewayError::Status { status: 503, body: String::new() };
        let missing = GatewayError::Status { status: 404, body: String::new() };
        assert!(server.is_transient());
        assert!(!missing.is_transient());
        assert!(GatewayError::Timeout.is_transient());
    }
}
