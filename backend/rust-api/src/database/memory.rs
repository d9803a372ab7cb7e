//! In-process ledger store. Each collection sits behind one `RwLock`, so a
//! check-then-insert done under a single write guard is atomic.

use axum::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use super::{AmendOutcome, MerchantStore, PaymentStore, SaleStore, StoreError, StoreResult};
use crate::models::{
    ExternalPaymentId, InsertOutcome, Merchant, PaymentRecord, Sale, SaleAmendment, SaleFilter,
    SaleId, SaleOrder, UserId,
};

#[derive(Default)]
pub struct InMemoryLedgerStore {
    sales: RwLock<Vec<Sale>>,
    payments: RwLock<Vec<PaymentRecord>>,
    merchants: RwLock<Vec<Merchant>>,
    fail_sale_inserts: AtomicBool,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_merchant(&self, merchant: Merchant) {
        let mut merchants = self.merchants.write().await;
        merchants.retain(|m| m.id != merchant.id);
        merchants.push(merchant);
    }

    /// Make subsequent `insert_sale` calls fail, to exercise partial-failure paths.
    pub fn fail_sale_inserts(&self, fail: bool) {
        self.fail_sale_inserts.store(fail, Ordering::SeqCst);
    }

    pub async fn sale_count(&self, owner: UserId) -> usize {
        self.sales.read().await.iter().filter(|s| s.user_id == owner).count()
    }

    pub async fn payment_count(&self, owner: UserId) -> usize {
        self.payments
            .read()
            .await
            .iter()
            .filter(|p| p.user_id == owner)
            .count()
    }
}

#[async_trait]
impl SaleStore for InMemoryLedgerStore {
    async fn insert_sale(&self, sale: &Sale) -> StoreResult<()> {
        if self.fail_sale_inserts.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("sale inserts disabled".to_string()));
        }
        self.sales.write().await.push(sale.clone());
        Ok(())
    }

    async fn find_sale(&self, owner: UserId, id: SaleId) -> StoreResult<Option<Sale>> {
        Ok(self
            .sales
            .read()
            .await
            .iter()
            .find(|s| s.id == id && s.user_id == owner)
            .cloned())
    }

    async fn list_sales(&self, owner: UserId, filter: &SaleFilter) -> StoreResult<Vec<Sale>> {
        let mut found: Vec<Sale> = self
            .sales
            .read()
            .await
            .iter()
            .filter(|s| s.user_id == owner && filter.matches(s))
            .cloned()
            .collect();
        // Vec order is insertion order; the stable sort keeps it among equal dates.
        if filter.order == SaleOrder::Date {
            found.sort_by_key(|s| s.date);
        }
        Ok(found)
    }

    async fn amend_sale(
        &self,
        owner: UserId,
        id: SaleId,
        amendment: &SaleAmendment,
    ) -> StoreResult<AmendOutcome> {
        let mut sales = self.sales.write().await;
        let Some(sale) = sales.iter_mut().find(|s| s.id == id && s.user_id == owner) else {
            return Ok(AmendOutcome::NotFound);
        };
        if sale.is_closed {
            return Ok(AmendOutcome::Closed);
        }
        amendment.apply_to(sale);
        Ok(AmendOutcome::Applied(sale.clone()))
    }

    async fn close_open_sales(&self, owner: UserId) -> StoreResult<u64> {
        let mut sales = self.sales.write().await;
        let mut closed = 0;
        for sale in sales.iter_mut().filter(|s| s.user_id == owner && !s.is_closed) {
            sale.is_closed = true;
            closed += 1;
        }
        Ok(closed)
    }
}

#[async_trait]
impl PaymentStore for InMemoryLedgerStore {
    async fn payment_exists(
        &self,
        owner: UserId,
        external_id: ExternalPaymentId,
    ) -> StoreResult<bool> {
        Ok(self
            .payments
            .read()
            .await
            .iter()
            .any(|p| p.user_id == owner && p.external_id == external_id))
    }

    async fn insert_payment(&self, record: &PaymentRecord) -> StoreResult<InsertOutcome> {
        let mut payments = self.payments.write().await;
        if payments
            .iter()
            .any(|p| p.user_id == record.user_id && p.external_id == record.external_id)
        {
            return Ok(InsertOutcome::Duplicate);
        }
        payments.push(record.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn list_payments(&self, owner: UserId) -> StoreResult<Vec<PaymentRecord>> {
        let mut found: Vec<PaymentRecord> = self
            .payments
            .read()
            .await
            .iter()
            .filter(|p| p.user_id == owner)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.received_at.cmp(&a.received_at));
        Ok(found)
    }
}

#[async_trait]
impl MerchantStore for InMemoryLedgerStore {
    async fn find_merchant(&self, id: UserId) -> StoreResult<Option<Merchant>> {
        Ok(self
            .merchants
            .read()
            .await
            .iter()
            .find(|m| m.id == id)
            .cloned())
    }

    async fn find_by_gateway_account(&self, account_id: i64) -> StoreResult<Option<Merchant>> {
        Ok(self
            .merchants
            .read()
            .await
            .iter()
            .find(|m| m.gateway.as_ref().map(|g| g.account_id) == Some(account_id))
            .cloned())
    }

    async fn linked_merchants(&self) -> StoreResult<Vec<Merchant>> {
        Ok(self
            .merchants
            .read()
            .await
            .iter()
            .filter(|m| m.gateway.is_some())
            .cloned()
            .collect())
    }
}
