//! Ledger store: the collection-scoped operations the reconciliation engine, sale ledger
//! and box aggregator need, behind traits so the logic runs against PostgreSQL in
//! production and an in-memory store in tests.

use axum::async_trait;
use sqlx::PgPool;
use std::sync::Arc;
use thiserror::Error;

use crate::config::{Config, StoreBackend};
use crate::models::{
    ExternalPaymentId, InsertOutcome, Merchant, PaymentRecord, Sale, SaleAmendment, SaleFilter,
    SaleId, UserId,
};

pub mod memory;
pub mod postgres;

pub use memory::InMemoryLedgerStore;
pub use postgres::PgLedgerStore;

pub type DatabasePool = Arc<PgPool>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt {entity} document {id}: {message}")]
    Corrupt {
        entity: &'static str,
        id: String,
        message: String,
    },

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Result of a conditional amendment write.
#[derive(Clone, Debug, PartialEq)]
pub enum AmendOutcome {
    Applied(Sale),
    /// The sale was closed between the read and the write.
    Closed,
    NotFound,
}

#[async_trait]
pub trait SaleStore: Send + Sync {
    async fn insert_sale(&self, sale: &Sale) -> StoreResult<()>;

    async fn find_sale(&self, owner: UserId, id: SaleId) -> StoreResult<Option<Sale>>;

    /// Matching sales ordered by date ascending (insertion order breaks ties).
    async fn list_sales(&self, owner: UserId, filter: &SaleFilter) -> StoreResult<Vec<Sale>>;

    /// Field updates, history append and `modified = true` in one write, only while the sale is open.
    async fn amend_sale(
        &self,
        owner: UserId,
        id: SaleId,
        amendment: &SaleAmendment,
    ) -> StoreResult<AmendOutcome>;

    /// Close every open sale of `owner`; returns how many were transitioned.
    async fn close_open_sales(&self, owner: UserId) -> StoreResult<u64>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn payment_exists(
        &self,
        owner: UserId,
        external_id: ExternalPaymentId,
    ) -> StoreResult<bool>;

    /// Insert unless a record for (owner, external id) already exists.
    async fn insert_payment(&self, record: &PaymentRecord) -> StoreResult<InsertOutcome>;

    /// Newest first.
    async fn list_payments(&self, owner: UserId) -> StoreResult<Vec<PaymentRecord>>;
}

#[async_trait]
pub trait MerchantStore: Send + Sync {
    async fn find_merchant(&self, id: UserId) -> StoreResult<Option<Merchant>>;

    async fn find_by_gateway_account(&self, account_id: i64) -> StoreResult<Option<Merchant>>;

    /// Merchants with a linked gateway credential, for the periodic sweep.
    async fn linked_merchants(&self) -> StoreResult<Vec<Merchant>>;
}

/// Everything the service needs from one backing store.
pub trait LedgerStore: SaleStore + PaymentStore + MerchantStore {}

impl<T> LedgerStore for T where T: SaleStore + PaymentStore + MerchantStore {}

/// Store handle shared by the services.
pub type SharedStore = Arc<dyn LedgerStore>;

pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    // sslmode in DATABASE_URL decides TLS (native-tls feature).
    let pool = PgPool::connect(database_url).await?;

    if database_url.contains("sslmode=require") || database_url.contains("sslmode=prefer") {
        tracing::info!("Database connection configured to use TLS");
    } else if !database_url.contains("localhost") && !database_url.contains("127.0.0.1") {
        tracing::warn!("Connecting to remote database without explicit sslmode. Consider adding sslmode=require");
    }

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    Ok(pool)
}

pub async fn new_pool(database_url: &str) -> anyhow::Result<DatabasePool> {
    let pool = create_pool(database_url).await?;
    Ok(Arc::new(pool))
}

/// The store selected by `LEDGER_STORE`.
pub async fn open_store(config: &Config) -> anyhow::Result<SharedStore> {
    match config.store_backend {
        StoreBackend::Postgres => {
            let pool = new_pool(&config.database_url).await?;
            tracing::info!("Database connection pool created");
            Ok(Arc::new(PgLedgerStore::new(pool)))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory ledger store; data is lost on restart");
            Ok(Arc::new(InMemoryLedgerStore::new()))
        }
    }
}
