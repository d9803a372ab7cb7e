//! PostgreSQL ledger store. Sale history lives in a JSONB array column so an
//! amendment is a single UPDATE; payment dedupe relies on the
//! `(user_id, external_id)` unique constraint.

use axum::async_trait;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::Row;

use super::{
    AmendOutcome, DatabasePool, MerchantStore, PaymentStore, SaleStore, StoreError, StoreResult,
};
use crate::models::{
    ExternalPaymentId, GatewayCredential, HistoryEntry, InsertOutcome, Merchant, PaymentRecord,
    Provenance, Sale, SaleAmendment, SaleFilter, SaleId, SaleOrder, SaleType, UserId,
};

const SALE_COLUMNS: &str =
    "id, user_id, amount, date, sale_type, comment, modified, is_closed, history";

const PAYMENT_COLUMNS: &str = "id, user_id, external_id, amount, payer_email, payer_name, \
     status, received_at, provenance, raw_response";

const MERCHANT_COLUMNS: &str = "id, email, username, gateway_account_id, \
     gateway_access_token, gateway_refresh_token";

#[derive(Clone)]
pub struct PgLedgerStore {
    pool: DatabasePool,
}

impl PgLedgerStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

fn sale_from_row(row: &PgRow) -> StoreResult<Sale> {
    let id: SaleId = row.try_get("id")?;
    let raw_type: String = row.try_get("sale_type")?;
    let sale_type = raw_type.parse::<SaleType>().map_err(|e| StoreError::Corrupt {
        entity: "sale",
        id: id.to_string(),
        message: e.to_string(),
    })?;
    let history: Json<Vec<HistoryEntry>> = row.try_get("history")?;

    Ok(Sale {
        id,
        user_id: row.try_get("user_id")?,
        amount: row.try_get("amount")?,
        date: row.try_get("date")?,
        sale_type,
        comment: row.try_get("comment")?,
        modified: row.try_get("modified")?,
        is_closed: row.try_get("is_closed")?,
        history: history.0,
    })
}

fn payment_from_row(row: &PgRow) -> StoreResult<PaymentRecord> {
    let id: uuid::Uuid = row.try_get("id")?;
    let raw_provenance: String = row.try_get("provenance")?;
    let provenance = raw_provenance.parse::<Provenance>().map_err(|e| StoreError::Corrupt {
        entity: "payment",
        id: id.to_string(),
        message: e.to_string(),
    })?;

    Ok(PaymentRecord {
        id,
        user_id: row.try_get("user_id")?,
        external_id: row.try_get("external_id")?,
        amount: row.try_get("amount")?,
        payer_email: row.try_get("payer_email")?,
        payer_name: row.try_get("payer_name")?,
        status: row.try_get("status")?,
        received_at: row.try_get("received_at")?,
        provenance,
        raw_response: row.try_get("raw_response")?,
    })
}

fn merchant_from_row(row: &PgRow) -> StoreResult<Merchant> {
    let account_id: Option<i64> = row.try_get("gateway_account_id")?;
    let access_token: Option<String> = row.try_get("gateway_access_token")?;
    let gateway = match (account_id, access_token) {
        (Some(account_id), Some(access_token)) if !access_token.is_empty() => {
            Some(GatewayCredential {
                access_token,
                refresh_token: row.try_get("gateway_refresh_token")?,
                account_id,
            })
        }
        _ => None,
    };

    Ok(Merchant {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        username: row.try_get("username")?,
        gateway,
    })
}

#[async_trait]
impl SaleStore for PgLedgerStore {
    async fn insert_sale(&self, sale: &Sale) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sales (id, user_id, amount, date, sale_type, comment, modified, is_closed, history)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(sale.id)
        .bind(sale.user_id)
        .bind(sale.amount)
        .bind(sale.date)
        .bind(sale.sale_type.as_str())
        .bind(&sale.comment)
        .bind(sale.modified)
        .bind(sale.is_closed)
        .bind(Json(&sale.history))
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    async fn find_sale(&self, owner: UserId, id: SaleId) -> StoreResult<Option<Sale>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM sales WHERE id = $1 AND user_id = $2",
            SALE_COLUMNS
        ))
        .bind(id)
        .bind(owner)
        .fetch_optional(&*self.pool)
        .await?;

        row.as_ref().map(sale_from_row).transpose()
    }

    async fn list_sales(&self, owner: UserId, filter: &SaleFilter) -> StoreResult<Vec<Sale>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM sales
            WHERE user_id = $1
              AND ($2::boolean IS NULL OR is_closed = $2)
              AND ($3::timestamptz IS NULL OR date >= $3)
              AND ($4::timestamptz IS NULL OR date < $4)
            ORDER BY {}
            "#,
            SALE_COLUMNS,
            match filter.order {
                SaleOrder::Date => "date ASC, seq ASC",
                SaleOrder::Arrival => "seq ASC",
            }
        ))
        .bind(owner)
        .bind(filter.status.map(|s| s.is_closed()))
        .bind(filter.from)
        .bind(filter.until)
        .fetch_all(&*self.pool)
        .await?;

        rows.iter().map(sale_from_row).collect()
    }

    async fn amend_sale(
        &self,
        owner: UserId,
        id: SaleId,
        amendment: &SaleAmendment,
    ) -> StoreResult<AmendOutcome> {
        let updated = sqlx::query(&format!(
            r#"
            UPDATE sales
            SET amount = COALESCE($3, amount),
                sale_type = COALESCE($4, sale_type),
                comment = COALESCE($5, comment),
                modified = true,
                history = history || $6
            WHERE id = $1 AND user_id = $2 AND is_closed = false
            RETURNING {}
            "#,
            SALE_COLUMNS
        ))
        .bind(id)
        .bind(owner)
        .bind(amendment.amount)
        .bind(amendment.sale_type.map(|t| t.as_str()))
        .bind(amendment.comment.as_deref())
        .bind(Json(&amendment.history))
        .fetch_optional(&*self.pool)
        .await?;

        if let Some(row) = updated {
            return Ok(AmendOutcome::Applied(sale_from_row(&row)?));
        }

        // Nothing matched: either the sale does not exist or it is closed.
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM sales WHERE id = $1 AND user_id = $2)",
        )
        .bind(id)
        .bind(owner)
        .fetch_one(&*self.pool)
        .await?;

        Ok(if exists {
            AmendOutcome::Closed
        } else {
            AmendOutcome::NotFound
        })
    }

    async fn close_open_sales(&self, owner: UserId) -> StoreResult<u64> {
        let result = sqlx::query(
            "UPDATE sales SET is_closed = true WHERE user_id = $1 AND is_closed = false",
        )
        .bind(owner)
        .execute(&*self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl PaymentStore for PgLedgerStore {
    async fn payment_exists(
        &self,
        owner: UserId,
        external_id: ExternalPaymentId,
    ) -> StoreResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM gateway_payments WHERE user_id = $1 AND external_id = $2)",
        )
        .bind(owner)
        .bind(external_id)
        .fetch_one(&*self.pool)
        .await?;

        Ok(exists)
    }

    async fn insert_payment(&self, record: &PaymentRecord) -> StoreResult<InsertOutcome> {
        let result = sqlx::query(
            r#"
            INSERT INTO gateway_payments
            (id, user_id, external_id, amount, payer_email, payer_name, status, received_at, provenance, raw_response)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT ON CONSTRAINT gateway_payments_owner_external_key DO NOTHING
            "#,
        )
        .bind(record.id)
        .bind(record.user_id)
        .bind(record.external_id)
        .bind(record.amount)
        .bind(&record.payer_email)
        .bind(&record.payer_name)
        .bind(&record.status)
        .bind(record.received_at)
        .bind(record.provenance.as_str())
        .bind(&record.raw_response)
        .execute(&*self.pool)
        .await?;

        Ok(if result.rows_affected() == 0 {
            InsertOutcome::Duplicate
        } else {
            InsertOutcome::Inserted
        })
    }

    async fn list_payments(&self, owner: UserId) -> StoreResult<Vec<PaymentRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM gateway_payments WHERE user_id = $1 ORDER BY received_at DESC",
            PAYMENT_COLUMNS
        ))
        .bind(owner)
        .fetch_all(&*self.pool)
        .await?;

        rows.iter().map(payment_from_row).collect()
    }
}

#[async_trait]
impl MerchantStore for PgLedgerStore {
    async fn find_merchant(&self, id: UserId) -> StoreResult<Option<Merchant>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM merchants WHERE id = $1",
            MERCHANT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;

        row.as_ref().map(merchant_from_row).transpose()
    }

    async fn find_by_gateway_account(&self, account_id: i64) -> StoreResult<Option<Merchant>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM merchants WHERE gateway_account_id = $1",
            MERCHANT_COLUMNS
        ))
        .bind(account_id)
        .fetch_optional(&*self.pool)
        .await?;

        row.as_ref().map(merchant_from_row).transpose()
    }

    async fn linked_merchants(&self) -> StoreResult<Vec<Merchant>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM merchants
            WHERE gateway_account_id IS NOT NULL AND COALESCE(gateway_access_token, '') <> ''
            ORDER BY created_at ASC
            "#,
            MERCHANT_COLUMNS
        ))
        .fetch_all(&*self.pool)
        .await?;

        rows.iter().map(merchant_from_row).collect()
    }
}
