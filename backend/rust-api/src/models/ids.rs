//! Type aliases for entity IDs. Internal ids are UUIDs; validation happens at parse boundaries (e.g. Uuid::parse_str).
//! External payment ids are assigned by the payment provider and are numeric.

use thiserror::Error;
use uuid::Uuid;

pub type UserId = Uuid;
pub type SaleId = Uuid;
pub type PaymentId = Uuid;

/// Payment id as assigned by the provider. Unique per merchant, not globally.
pub type ExternalPaymentId = i64;

/// Parse a string into a UUID or return an error message. Use at API boundaries.
pub fn parse_uuid(id: &str, name: &str) -> Result<Uuid, String> {
    Uuid::parse_str(id).map_err(|e| format!("Invalid {}: {}", name, e))
}

/// Parse a provider payment id, which may arrive as a JSON string or number.
pub fn parse_external_id(id: &str) -> Result<ExternalPaymentId, String> {
    id.trim()
        .parse::<ExternalPaymentId>()
        .map_err(|e| format!("Invalid payment id {:?}: {}", id, e))
}

/// A stored or configured name that matches no variant of `kind`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} {value:?}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    pub fn new(kind: &'static str, value: &str) -> Self {
        Self { kind, value: value.to_string() }
    }
}
