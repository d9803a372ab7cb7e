//! Sale lifecycle: create, list, amend with audit history, close the box.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::database::{AmendOutcome, SaleStore, SharedStore, StoreError};
use crate::models::{
    Sale, SaleAmendment, SaleChanges, SaleFilter, SaleId, SaleOrder, SaleStatus, SaleType,
    UserId,
};
use crate::utils::BusinessCalendar;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Sale {0} not found")]
    NotFound(SaleId),

    #[error("Sale {0} is closed")]
    Closed(SaleId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct SaleLedger {
    store: SharedStore,
    calendar: BusinessCalendar,
}

impl SaleLedger {
    pub fn new(store: SharedStore, calendar: BusinessCalendar) -> Self {
        Self { store, calendar }
    }

    pub async fn create(
        &self,
        owner: UserId,
        amount: Decimal,
        sale_type: SaleType,
        comment: String,
    ) -> Result<Sale, LedgerError> {
        let sale = Sale::new(owner, amount, sale_type, comment, Utc::now());
        self.store.insert_sale(&sale).await?;
        tracing::info!(user_id = %owner, sale_id = %sale.id, amount = %amount, "Sale created");
        Ok(sale)
    }

    /// Owner's sales, optionally by status and by local calendar day.
    pub async fn list(
        &self,
        owner: UserId,
        status: Option<SaleStatus>,
        day: Option<NaiveDate>,
    ) -> Result<Vec<Sale>, LedgerError> {
        let (from, until) = match day {
            Some(day) => {
                let (start, end) = self.calendar.day_bounds(day);
                (Some(start), Some(end))
            }
            None => (None, None),
        };
        let filter = SaleFilter {
            status,
            from,
            until,
            order: SaleOrder::Date,
        };
        Ok(self.store.list_sales(owner, &filter).await?)
    }

    /// Apply the fields of `changes` that differ from the stored sale. With nothing
    /// to change the stored sale comes back untouched.
    pub async fn amend(
        &self,
        owner: UserId,
        id: SaleId,
        changes: &SaleChanges,
    ) -> Result<Sale, LedgerError> {
        let current = self
            .store
            .find_sale(owner, id)
            .await?
            .ok_or(LedgerError::NotFound(id))?;
        if current.is_closed {
            return Err(LedgerError::Closed(id));
        }

        let amendment = SaleAmendment::diff(&current, changes, Utc::now());
        if amendment.is_empty() {
            return Ok(current);
        }

        match self.store.amend_sale(owner, id, &amendment).await? {
            AmendOutcome::Applied(sale) => {
                tracing::info!(
                    user_id = %owner,
                    sale_id = %id,
                    changes = amendment.history.len(),
                    "Sale amended"
                );
                Ok(sale)
            }
            AmendOutcome::Closed => {
                tracing::warn!(user_id = %owner, sale_id = %id, "Sale closed before amendment was written");
                Err(LedgerError::Closed(id))
            }
            AmendOutcome::NotFound => Err(LedgerError::NotFound(id)),
        }
    }

    /// Close every open sale of `owner`, whatever its date. Returns how many closed.
    pub async fn close_box(&self, owner: UserId) -> Result<u64, LedgerError> {
        let closed = self.store.close_open_sales(owner).await?;
        tracing::info!(user_id = %owner, closed, "Cash box closed");
        Ok(closed)
    }
}
