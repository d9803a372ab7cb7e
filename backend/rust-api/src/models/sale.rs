//! Sale entity: one monetary movement owned by a merchant, plus its audit trail.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use std::str::FromStr;

use super::ids::{SaleId, UnknownVariant, UserId};

/// Payment method of a sale. Legacy Spanish spellings are still accepted on input.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaleType {
    #[serde(alias = "Efectivo")]
    Cash,
    #[serde(alias = "Crédito")]
    Credit,
    #[serde(alias = "Débito")]
    Debit,
    #[serde(alias = "Transferencia")]
    Transfer,
}

impl SaleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaleType::Cash => "cash",
            SaleType::Credit => "credit",
            SaleType::Debit => "debit",
            SaleType::Transfer => "transfer",
        }
    }
}

impl FromStr for SaleType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cash" | "Efectivo" => Ok(SaleType::Cash),
            "credit" | "Crédito" => Ok(SaleType::Credit),
            "debit" | "Débito" => Ok(SaleType::Debit),
            "transfer" | "Transferencia" => Ok(SaleType::Transfer),
            _ => Err(UnknownVariant::new("sale type", s)),
        }
    }
}

impl std::fmt::Display for SaleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Field of a sale that can be amended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaleField {
    Amount,
    Type,
    Comment,
}

/// One applied change. Values are loosely typed so amount, type and comment changes share a shape.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub date: DateTime<Utc>,
    pub field: SaleField,
    pub old_value: Value,
    pub new_value: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sale {
    pub id: SaleId,
    pub user_id: UserId,
    pub amount: Decimal,
    pub date: DateTime<Utc>,
    #[serde(rename = "type")]
    pub sale_type: SaleType,
    #[serde(default)]
    pub comment: String,
    pub modified: bool,
    pub is_closed: bool,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

impl Sale {
    /// A fresh open sale with an empty history.
    pub fn new(
        user_id: UserId,
        amount: Decimal,
        sale_type: SaleType,
        comment: String,
        date: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            amount,
            date,
            sale_type,
            comment,
            modified: false,
            is_closed: false,
            history: Vec::new(),
        }
    }
}

/// Requested changes to an open sale. `None` leaves the field untouched.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct SaleChanges {
    pub amount: Option<Decimal>,
    #[serde(rename = "type")]
    pub sale_type: Option<SaleType>,
    #[serde(alias = "comments")]
    pub comment: Option<String>,
}

/// Field updates and history entries staged by an amendment, written in one store operation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SaleAmendment {
    pub amount: Option<Decimal>,
    pub sale_type: Option<SaleType>,
    pub comment: Option<String>,
    pub history: Vec<HistoryEntry>,
}

impl SaleAmendment {
    /// Diff `changes` against `current`, producing one history entry per field that actually differs.
    pub fn diff(current: &Sale, changes: &SaleChanges, at: DateTime<Utc>) -> Self {
        let mut amendment = SaleAmendment::default();

        if let Some(amount) = changes.amount.filter(|a| *a != current.amount) {
            amendment.history.push(HistoryEntry {
                date: at,
                field: SaleField::Amount,
                old_value: amount_value(current.amount),
                new_value: amount_value(amount),
            });
            amendment.amount = Some(amount);
        }

        if let Some(sale_type) = changes.sale_type.filter(|t| *t != current.sale_type) {
            amendment.history.push(HistoryEntry {
                date: at,
                field: SaleField::Type,
                old_value: Value::from(current.sale_type.as_str()),
                new_value: Value::from(sale_type.as_str()),
            });
            amendment.sale_type = Some(sale_type);
        }

        if let Some(comment) = changes.comment.as_ref().filter(|c| **c != current.comment) {
            amendment.history.push(HistoryEntry {
                date: at,
                field: SaleField::Comment,
                old_value: Value::from(current.comment.clone()),
                new_value: Value::from(comment.clone()),
            });
            amendment.comment = Some(comment.clone());
        }

        amendment
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Apply to an in-memory copy. Stores that hold documents in memory use this directly.
    pub fn apply_to(&self, sale: &mut Sale) {
        if let Some(amount) = self.amount {
            sale.amount = amount;
        }
        if let Some(sale_type) = self.sale_type {
            sale.sale_type = sale_type;
        }
        if let Some(comment) = &self.comment {
            sale.comment = comment.clone();
        }
        sale.history.extend(self.history.iter().cloned());
        sale.modified = true;
    }
}

/// Open/closed filter for sale listings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaleStatus {
    Open,
    Closed,
}

impl SaleStatus {
    pub fn is_closed(&self) -> bool {
        matches!(self, SaleStatus::Closed)
    }
}

/// Amounts are audited as JSON numbers. Decimal text always parses as one.
fn amount_value(amount: Decimal) -> Value {
    amount
        .normalize()
        .to_string()
        .parse::<serde_json::Number>()
        .map(Value::Number)
        .unwrap_or_else(|_| Value::from(amount.to_string()))
}

/// Result order of a sale listing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SaleOrder {
    /// Sale date ascending, insertion order among equal dates.
    #[default]
    Date,
    /// Insertion order, whatever the sale dates.
    Arrival,
}

/// Store-level query over a merchant's sales.
#[derive(Clone, Debug, Default)]
pub struct SaleFilter {
    pub status: Option<SaleStatus>,
    /// Inclusive lower bound on the sale date.
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on the sale date.
    pub until: Option<DateTime<Utc>>,
    pub order: SaleOrder,
}

impl SaleFilter {
    pub fn matches(&self, sale: &Sale) -> bool {
        if let Some(status) = self.status {
            if sale.is_closed != status.is_closed() {
                return false;
            }
        }
        if let Some(from) = self.from {
            if sale.date < from {
                return false;
            }
        }
        if let Some(until) = self.until {
            if sale.date >= until {
                return false;
            }
        }
        true
    }
}
