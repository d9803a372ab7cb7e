//! Shared types: sales, payment records, merchants, ID aliases. Use date types (chrono) for timestamps.

pub mod ids;
pub mod merchant;
pub mod payment;
pub mod sale;

pub use ids::{ExternalPaymentId, PaymentId, SaleId, UnknownVariant, UserId};
pub use merchant::{GatewayCredential, Merchant};
pub use payment::{InsertOutcome, PaymentRecord, Provenance};
pub use sale::{
    HistoryEntry, Sale, SaleAmendment, SaleChanges, SaleField, SaleFilter, SaleOrder, SaleStatus,
    SaleType,
};
