//! Canonical record of an externally confirmed payment.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use std::str::FromStr;

use super::ids::{ExternalPaymentId, PaymentId, UnknownVariant, UserId};

/// How a payment reached the reconciliation engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Webhook,
    Sync,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Webhook => "webhook",
            Provenance::Sync => "sync",
        }
    }
}

impl FromStr for Provenance {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "webhook" => Ok(Provenance::Webhook),
            "sync" => Ok(Provenance::Sync),
            _ => Err(UnknownVariant::new("provenance", s)),
        }
    }
}

/// One row per (user, external payment id). Never mutated after insert.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub id: PaymentId,
    pub user_id: UserId,
    pub external_id: ExternalPaymentId,
    pub amount: Decimal,
    pub payer_email: String,
    pub payer_name: String,
    pub status: String,
    pub received_at: DateTime<Utc>,
    pub provenance: Provenance,
    pub raw_response: Value,
}

/// Result of an insert guarded by the (user, external id) uniqueness rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Duplicate,
}
