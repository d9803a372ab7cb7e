//! Reconciliation engine: turns provider payments into payment records and sales,
//! at most once per (merchant, external payment id).
//!
//! Two protocols feed the same path. Push: a webhook names a payment id and we
//! fetch its detail. Pull: we search the merchant's approved payments over a
//! trailing window. Either way the candidate goes through `reconcile`, where the
//! payment insert's uniqueness conflict is the dedupe signal.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::config::{GatewayConfig, MethodFilter, ReconcilePolicy, UserResolution};
use crate::database::{MerchantStore, PaymentStore, SaleStore, SharedStore, StoreError};
use crate::models::{
    ExternalPaymentId, GatewayCredential, InsertOutcome, Merchant, PaymentRecord, Provenance,
    Sale, SaleType, UserId,
};
use crate::models::ids::parse_external_id;
use crate::services::mercadopago::{GatewayError, GatewayPayment, PaymentGateway, SearchWindow};

/// Shown when the provider gives us nothing to name the payer by.
pub const UNKNOWN_PAYER: &str = "Unknown";

/// Payment types accepted by `MethodFilter::TransferOnly`.
const TRANSFER_PAYMENT_TYPES: &[&str] = &["bank_transfer", "account_money"];

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Merchant {0} not found")]
    UserNotFound(UserId),

    #[error("Merchant {0} has no linked payment gateway account")]
    MissingCredential(UserId),

    #[error("Invalid notification: {0}")]
    InvalidNotification(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// An id the provider sends either as a JSON number or a string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LooseId {
    Number(i64),
    Text(String),
}

impl LooseId {
    fn as_text(&self) -> String {
        match self {
            LooseId::Number(n) => n.to_string(),
            LooseId::Text(s) => s.trim().to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationData {
    #[serde(default)]
    pub id: Option<LooseId>,
}

/// Webhook body as the provider posts it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentNotification {
    #[serde(default, rename = "type")]
    pub event_type: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub data: NotificationData,
    /// Provider account id or our merchant id, depending on the resolution strategy.
    #[serde(default)]
    pub user_id: Option<LooseId>,
}

impl PaymentNotification {
    pub fn is_payment_event(&self) -> bool {
        self.event_type.as_deref() == Some("payment")
            || matches!(
                self.action.as_deref(),
                Some("payment.created") | Some("payment.updated")
            )
    }

    pub fn payment_id(&self) -> Result<ExternalPaymentId, String> {
        match &self.data.id {
            Some(id) => parse_external_id(&id.as_text()),
            None => Err("missing data.id".to_string()),
        }
    }
}

/// Why a candidate payment did not produce a sale.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    NotApproved,
    MethodFiltered,
    Blocklisted,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::NotApproved => "not_approved",
            SkipReason::MethodFiltered => "method_filtered",
            SkipReason::Blocklisted => "blocklisted",
        }
    }
}

/// Result of pushing one candidate through the shared path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Payment record written. `sale_created` is false when the sale insert failed afterwards.
    Recorded { sale_created: bool },
    Duplicate,
    Skipped(SkipReason),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IgnoreReason {
    NotPaymentEvent,
    UnknownMerchant,
    MissingCredential,
    LookupFailed,
    GatewayFailure,
    Skipped(SkipReason),
}

impl IgnoreReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            IgnoreReason::NotPaymentEvent => "not_payment_event",
            IgnoreReason::UnknownMerchant => "user_not_found",
            IgnoreReason::MissingCredential => "credential_not_found",
            IgnoreReason::LookupFailed => "lookup_failed",
            IgnoreReason::GatewayFailure => "gateway_unavailable",
            IgnoreReason::Skipped(reason) => reason.as_str(),
        }
    }
}

/// Acknowledgement for the notification sender. Every variant is a success to them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WebhookAck {
    Recorded,
    Duplicate,
    Ignored(IgnoreReason),
}

impl WebhookAck {
    pub fn status(&self) -> &'static str {
        match self {
            WebhookAck::Recorded | WebhookAck::Duplicate => "processed",
            WebhookAck::Ignored(_) => "ignored",
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            WebhookAck::Recorded => "recorded",
            WebhookAck::Duplicate => "already_processed",
            WebhookAck::Ignored(reason) => reason.as_str(),
        }
    }
}

/// Tally of one pull pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub fetched: usize,
    pub recorded: usize,
    pub duplicates: usize,
    pub skipped: usize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub merchants: usize,
    pub failed: usize,
    pub recorded: usize,
}

pub struct ReconciliationEngine {
    store: SharedStore,
    gateway: Arc<dyn PaymentGateway>,
    policy: ReconcilePolicy,
    resolution: UserResolution,
    gateway_config: GatewayConfig,
}

impl ReconciliationEngine {
    pub fn new(
        store: SharedStore,
        gateway: Arc<dyn PaymentGateway>,
        policy: ReconcilePolicy,
        resolution: UserResolution,
        gateway_config: GatewayConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            policy,
            resolution,
            gateway_config,
        }
    }

    /// Push protocol. Only an unparseable notification or a store failure while
    /// recording comes back as an error; everything else is acknowledged.
    pub async fn handle_notification(
        &self,
        notification: &PaymentNotification,
        query_user: Option<&str>,
    ) -> Result<WebhookAck, ReconcileError> {
        if !notification.is_payment_event() {
            tracing::debug!(
                event_type = ?notification.event_type,
                action = ?notification.action,
                "Ignoring non-payment notification"
            );
            return Ok(WebhookAck::Ignored(IgnoreReason::NotPaymentEvent));
        }

        let external_id = notification
            .payment_id()
            .map_err(ReconcileError::InvalidNotification)?;

        let merchant = match self.resolve_merchant(notification, query_user).await {
            Ok(Some(merchant)) => merchant,
            Ok(None) => {
                tracing::warn!(external_id, "No merchant matches notification, ignoring");
                return Ok(WebhookAck::Ignored(IgnoreReason::UnknownMerchant));
            }
            Err(e) => {
                tracing::warn!(external_id, "Merchant lookup failed, ignoring notification: {}", e);
                return Ok(WebhookAck::Ignored(IgnoreReason::LookupFailed));
            }
        };

        let Some(credential) = merchant.gateway.as_ref() else {
            tracing::warn!(user_id = %merchant.id, external_id, "Merchant has no gateway credential");
            return Ok(WebhookAck::Ignored(IgnoreReason::MissingCredential));
        };

        let payment = match self.gateway.fetch_payment(credential, external_id).await {
            Ok(payment) => payment,
            Err(e) => {
                tracing::warn!(
                    user_id = %merchant.id,
                    external_id,
                    transient = e.is_transient(),
                    "Could not fetch payment detail: {}",
                    e
                );
                return Ok(WebhookAck::Ignored(IgnoreReason::GatewayFailure));
            }
        };

        let ack = match self.reconcile(merchant.id, payment, Provenance::Webhook).await? {
            ReconcileOutcome::Recorded { .. } => WebhookAck::Recorded,
            ReconcileOutcome::Duplicate => WebhookAck::Duplicate,
            ReconcileOutcome::Skipped(reason) => WebhookAck::Ignored(IgnoreReason::Skipped(reason)),
        };
        Ok(ack)
    }

    async fn resolve_merchant(
        &self,
        notification: &PaymentNotification,
        query_user: Option<&str>,
    ) -> Result<Option<Merchant>, StoreError> {
        match self.resolution {
            UserResolution::AccountLookup => {
                let Some(account_id) = notification
                    .user_id
                    .as_ref()
                    .and_then(|id| id.as_text().parse::<i64>().ok())
                else {
                    return Ok(None);
                };
                self.store.find_by_gateway_account(account_id).await
            }
            UserResolution::EmbeddedId => {
                let text = notification.user_id.as_ref().map(LooseId::as_text);
                self.find_by_text_id(text.as_deref()).await
            }
            UserResolution::QueryParam => self.find_by_text_id(query_user).await,
        }
    }

    async fn find_by_text_id(&self, id: Option<&str>) -> Result<Option<Merchant>, StoreError> {
        match id.and_then(|s| Uuid::parse_str(s.trim()).ok()) {
            Some(id) => self.store.find_merchant(id).await,
            None => Ok(None),
        }
    }

    /// Pull protocol for one merchant, over the configured trailing window ending now.
    pub async fn sync_merchant(&self, merchant_id: UserId) -> Result<SyncReport, ReconcileError> {
        let merchant = self
            .store
            .find_merchant(merchant_id)
            .await?
            .ok_or(ReconcileError::UserNotFound(merchant_id))?;
        let credential = merchant
            .gateway
            .as_ref()
            .ok_or(ReconcileError::MissingCredential(merchant_id))?;

        self.sync_with(merchant.id, credential, Utc::now()).await
    }

    async fn sync_with(
        &self,
        merchant_id: UserId,
        credential: &GatewayCredential,
        now: DateTime<Utc>,
    ) -> Result<SyncReport, ReconcileError> {
        let window = SearchWindow::trailing(
            now,
            self.gateway_config.sync_window,
            self.gateway_config.search_limit,
            self.gateway_config.search_max_pages,
        );
        let payments = self.gateway.search_payments(credential, &window).await?;

        let mut report = SyncReport {
            fetched: payments.len(),
            ..SyncReport::default()
        };
        for payment in payments {
            match self.reconcile(merchant_id, payment, Provenance::Sync).await? {
                ReconcileOutcome::Recorded { .. } => report.recorded += 1,
                ReconcileOutcome::Duplicate => report.duplicates += 1,
                ReconcileOutcome::Skipped(_) => report.skipped += 1,
            }
        }

        tracing::info!(
            user_id = %merchant_id,
            fetched = report.fetched,
            recorded = report.recorded,
            duplicates = report.duplicates,
            skipped = report.skipped,
            "Payment sync finished"
        );
        Ok(report)
    }

    /// Pull protocol for every linked merchant. One merchant failing does not stop the sweep.
    pub async fn sync_all(&self) -> Result<SweepReport, StoreError> {
        let merchants = self.store.linked_merchants().await?;
        let now = Utc::now();
        let mut sweep = SweepReport::default();

        for merchant in &merchants {
            let Some(credential) = merchant.gateway.as_ref() else {
                continue;
            };
            sweep.merchants += 1;
            match self.sync_with(merchant.id, credential, now).await {
                Ok(report) => sweep.recorded += report.recorded,
                Err(e) => {
                    sweep.failed += 1;
                    tracing::error!(user_id = %merchant.id, "Payment sync failed: {}", e);
                }
            }
        }

        Ok(sweep)
    }

    /// The shared path. A failed sale insert after a recorded payment is logged, not returned:
    /// the payment record is the source of truth.
    pub async fn reconcile(
        &self,
        owner: UserId,
        payment: GatewayPayment,
        provenance: Provenance,
    ) -> Result<ReconcileOutcome, StoreError> {
        let external_id = payment.id;

        if !payment.is_approved() {
            tracing::info!(user_id = %owner, external_id, status = %payment.status, "Payment not approved, skipping");
            return Ok(ReconcileOutcome::Skipped(SkipReason::NotApproved));
        }
        if let Some(reason) = policy_rejection(&self.policy, &payment) {
            tracing::info!(user_id = %owner, external_id, reason = reason.as_str(), "Payment filtered by policy");
            return Ok(ReconcileOutcome::Skipped(reason));
        }
        if self.store.payment_exists(owner, external_id).await? {
            tracing::debug!(user_id = %owner, external_id, "Payment already reconciled");
            return Ok(ReconcileOutcome::Duplicate);
        }

        let now = Utc::now();
        let payer_name = payer_display_name(&payment);
        let created_at = payment.created_at().unwrap_or(now);

        let record = PaymentRecord {
            id: Uuid::new_v4(),
            user_id: owner,
            external_id,
            amount: payment.transaction_amount,
            payer_email: payment.payer.email.clone().unwrap_or_default(),
            payer_name: payer_name.clone(),
            status: payment.status.clone(),
            received_at: created_at,
            provenance,
            raw_response: payment.raw,
        };

        if self.store.insert_payment(&record).await? == InsertOutcome::Duplicate {
            // Another reconciliation of the same payment got there between our check and insert.
            tracing::info!(user_id = %owner, external_id, "Concurrent reconciliation won, skipping");
            return Ok(ReconcileOutcome::Duplicate);
        }

        let sale = Sale::new(
            owner,
            record.amount,
            SaleType::Transfer,
            format!("{} (#{})", payer_name, external_id),
            created_at,
        );

        let sale_created = match self.store.insert_sale(&sale).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(
                    user_id = %owner,
                    external_id,
                    payment_record_id = %record.id,
                    "Payment recorded but sale creation failed: {}",
                    e
                );
                false
            }
        };

        tracing::info!(
            user_id = %owner,
            external_id,
            provenance = provenance.as_str(),
            amount = %record.amount,
            "Payment reconciled"
        );
        Ok(ReconcileOutcome::Recorded { sale_created })
    }
}

fn policy_rejection(policy: &ReconcilePolicy, payment: &GatewayPayment) -> Option<SkipReason> {
    if policy.method_filter == MethodFilter::TransferOnly {
        let is_transfer = payment
            .payment_type_id
            .as_deref()
            .map(|t| TRANSFER_PAYMENT_TYPES.contains(&t))
            .unwrap_or(false);
        if !is_transfer {
            return Some(SkipReason::MethodFiltered);
        }
    }

    if !policy.description_blocklist.is_empty() {
        let description = payment.description.as_deref().unwrap_or_default().to_lowercase();
        if policy
            .description_blocklist
            .iter()
            .any(|needle| description.contains(needle.as_str()))
        {
            return Some(SkipReason::Blocklisted);
        }
    }

    None
}

/// Payer name, then description, then email, then `UNKNOWN_PAYER`.
pub fn payer_display_name(payment: &GatewayPayment) -> String {
    let first = payment.payer.first_name.as_deref().unwrap_or_default();
    let last = payment.payer.last_name.as_deref().unwrap_or_default();
    let full_name = format!("{} {}", first.trim(), last.trim());
    let full_name = full_name.trim();
    if !full_name.is_empty() {
        return full_name.to_string();
    }

    if let Some(description) = payment.description.as_deref().map(str::trim) {
        if !description.is_empty() && description != "null" {
            return description.to_string();
        }
    }

    if let Some(email) = payment.payer.email.as_deref().map(str::trim) {
        if !email.is_empty() {
            return email.to_string();
        }
    }

    UNKNOWN_PAYER.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payment(value: serde_json::Value) -> GatewayPayment {
        GatewayPayment::from_value(value).unwrap()
    }

    #[test]
    fn display_name_prefers_full_name() {
        let p = payment(json!({
            "id": 1, "status": "approved", "transaction_amount": 10,
            "description": "Pedido 12",
            "payer": {"first_name": " Ana ", "last_name": "Gómez", "email": "ana@example.com"}
        }));
        assert_eq!(payer_display_name(&p), "Ana Gómez");
    }

    #[test]
    fn display_name_falls_back_in_order() {
        let by_description = payment(json!({
            "id": 1, "status": "approved", "transaction_amount": 10,
            "description": "Pedido 12", "payer": {"email": "ana@example.com"}
        }));
        assert_eq!(payer_display_name(&by_description), "Pedido 12");

        let by_email = payment(json!({
            "id": 1, "status": "approved", "transaction_amount": 10,
            "description": "null", "payer": {"email": "ana@example.com"}
        }));
        assert_eq!(payer_display_name(&by_email), "ana@example.com");

        let unknown = payment(json!({"id": 1, "status": "approved", "transaction_amount": 10}));
        assert_eq!(payer_display_name(&unknown), UNKNOWN_PAYER);
    }

    #[test]
    fn transfer_only_policy_rejects_card_payments() {
        let policy = ReconcilePolicy {
            method_filter: MethodFilter::TransferOnly,
            description_blocklist: Vec::new(),
        };
        let card = payment(json!({
            "id": 1, "status": "approved", "transaction_amount": 10, "payment_type_id": "credit_card"
        }));
        let transfer = payment(json!({
            "id": 2, "status": "approved", "transaction_amount": 10, "payment_type_id": "bank_transfer"
        }));
        assert_eq!(policy_rejection(&policy, &card), Some(SkipReason::MethodFiltered));
        assert_eq!(policy_rejection(&policy, &transfer), None);
    }

    #[test]
    fn blocklist_matches_case_insensitively() {
        let policy = ReconcilePolicy {
            method_filter: MethodFilter::Unrestricted,
            description_blocklist: vec!["netflix".to_string()],
        };
        let p = payment(json!({
            "id": 1, "status": "approved", "transaction_amount": 10, "description": "NETFLIX.COM mensual"
        }));
        assert_eq!(policy_rejection(&policy, &p), Some(SkipReason::Blocklisted));
    }

    #[test]
    fn notification_ids_accept_numbers_and_strings() {
        let n: PaymentNotification = serde_json::from_value(json!({
            "action": "payment.created", "data": {"id": "987"}, "user_id": 55
        }))
        .unwrap();
        assert!(n.is_payment_event());
        assert_eq!(n.payment_id(), Ok(987));

        let other: PaymentNotification =
            serde_json::from_value(json!({"type": "merchant_order", "data": {"id": 1}})).unwrap();
        assert!(!other.is_payment_event());
    }
}
