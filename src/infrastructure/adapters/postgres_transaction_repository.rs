use crate::domain::errors::{RepositoryError, RepositoryResult};
use crate::domain::{
    Customer, LineItem, Money, Product, TaxRate, Transaction, TransactionStatus,
};
use crate::ports::transaction_repository_port::{
    ProductCatalogPort, TransactionFilter, TransactionRepositoryPort,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, QueryBuilder, Transaction as DbTransaction};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

const TRANSACTION_COLUMNS: &str = r#"
    id, owner_id, subtotal, discount, tax_rate_bps, tax_amount,
    total_amount, status, notes, created_at, updated_at, deleted_at
"#;

const ITEM_COLUMNS: &str = r#"
    id, transaction_id, product_id, product_name, unit_price, quantity, line_total, created_at
"#;

/// Postgres storage for transactions, their items, the product catalog and
/// customer lookups
#[derive(Clone)]
pub struct PgTransactionRepository {
    pool: Arc<Pool<Postgres>>,
}

impl PgTransactionRepository {
    pub fn new(pool: Arc<Pool<Postgres>>) -> Self {
        Self { pool }
    }

    async fn insert_items(
        tx: &mut DbTransaction<'_, Postgres>,
        transaction: &Transaction,
    ) -> RepositoryResult<()> {
        for item in &transaction.items {
            sqlx::query(
                r#"
                INSERT INTO transaction_items (
                    id, transaction_id, product_id, product_name,
                    unit_price, quantity, line_total, created_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(item.id)
            .bind(transaction.id)
            .bind(item.product_id)
            .bind(&item.product_name)
            .bind(item.unit_price.minor())
            .bind(item.quantity)
            .bind(item.line_total.minor())
            .bind(item.created_at)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl TransactionRepositoryPort for PgTransactionRepository {
    async fn create(&self, transaction: &Transaction) -> RepositoryResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO transactions (
                id, owner_id, subtotal, discount, tax_rate_bps, tax_amount,
                total_amount, status, notes, created_at, updated_at, deleted_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(transaction.id)
        .bind(transaction.owner_id)
        .bind(transaction.subtotal.minor())
        .bind(transaction.discount.minor())
        .bind(transaction.tax_rate.bps() as i32)
        .bind(transaction.tax_amount.minor())
        .bind(transaction.total_amount.minor())
        .bind(transaction.status.as_str())
        .bind(&transaction.notes)
        .bind(transaction.created_at)
        .bind(transaction.updated_at)
        .bind(transaction.deleted_at)
        .execute(&mut *tx)
        .await?;

        Self::insert_items(&mut tx, transaction).await?;

        tx.commit().await?;
        debug!(transaction_id = %transaction.id, "Transaction inserted");
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<Transaction>> {
        let query = format!(
            "SELECT {} FROM transactions WHERE id = $1 AND deleted_at IS NULL",
            TRANSACTION_COLUMNS
        );
        let header = sqlx::query_as::<_, TransactionRow>(&query)
            .bind(id)
            .fetch_optional(self.pool.as_ref())
            .await?;

        let Some(header) = header else {
            return Ok(None);
        };

        let query = format!(
            "SELECT {} FROM transaction_items WHERE transaction_id = $1 ORDER BY created_at, id",
            ITEM_COLUMNS
        );
        let items = sqlx::query_as::<_, LineItemRow>(&query)
            .bind(id)
            .fetch_all(self.pool.as_ref())
            .await?;

        header.into_transaction(items).map(Some)
    }

    async fn list(&self, filter: &TransactionFilter) -> RepositoryResult<Vec<Transaction>> {
        let mut query = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM transactions WHERE deleted_at IS NULL",
            TRANSACTION_COLUMNS
        ));
        if let Some(owner_id) = filter.owner_id {
            query.push(" AND owner_id = ").push_bind(owner_id);
        }
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(from) = filter.created_from {
            query.push(" AND created_at >= ").push_bind(from);
        }
        if let Some(to) = filter.created_to {
            query.push(" AND created_at <= ").push_bind(to);
        }
        query
            .push(" ORDER BY created_at DESC, id LIMIT ")
            .push_bind(filter.page_size())
            .push(" OFFSET ")
            .push_bind(filter.page_offset());

        let headers = query
            .build_query_as::<TransactionRow>()
            .fetch_all(self.pool.as_ref())
            .await?;
        if headers.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = headers.iter().map(|h| h.id).collect();
        let query = format!(
            "SELECT {} FROM transaction_items WHERE transaction_id = ANY($1) ORDER BY created_at, id",
            ITEM_COLUMNS
        );
        let mut items: HashMap<Uuid, Vec<LineItemRow>> = HashMap::new();
        for row in sqlx::query_as::<_, LineItemRow>(&query)
            .bind(&ids[..])
            .fetch_all(self.pool.as_ref())
            .await?
        {
            items.entry(row.transaction_id).or_default().push(row);
        }

        headers
            .into_iter()
            .map(|header| {
                let rows = items.remove(&header.id).unwrap_or_default();
                header.into_transaction(rows)
            })
            .collect()
    }

    async fn find_customer(&self, owner_id: Uuid) -> RepositoryResult<Option<Customer>> {
        let row = sqlx::query_as::<_, (Uuid, String, String)>(
            "SELECT id, name, email FROM users WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(owner_id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(row.map(|(id, name, email)| Customer { id, name, email }))
    }

    async fn update(
        &self,
        transaction: &Transaction,
        expected: TransactionStatus,
    ) -> RepositoryResult<()> {
        let mut tx = self.pool.begin().await?;

        let rows_affected = sqlx::query(
            r#"
            UPDATE transactions
            SET subtotal = $1, discount = $2, tax_rate_bps = $3, tax_amount = $4,
                total_amount = $5, status = $6, notes = $7, updated_at = $8, deleted_at = $9
            WHERE id = $10 AND status = $11 AND deleted_at IS NULL
            "#,
        )
        .bind(transaction.subtotal.minor())
        .bind(transaction.discount.minor())
        .bind(transaction.tax_rate.bps() as i32)
        .bind(transaction.tax_amount.minor())
        .bind(transaction.total_amount.minor())
        .bind(transaction.status.as_str())
        .bind(&transaction.notes)
        .bind(transaction.updated_at)
        .bind(transaction.deleted_at)
        .bind(transaction.id)
        .bind(expected.as_str())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if rows_affected == 0 {
            let live: Option<(Uuid,)> = sqlx::query_as(
                "SELECT id FROM transactions WHERE id = $1 AND deleted_at IS NULL",
            )
            .bind(transaction.id)
            .fetch_optional(&mut *tx)
            .await?;

            return match live {
                Some(_) => {
                    debug!(transaction_id = %transaction.id, %expected, "Transaction no longer in expected status");
                    Err(RepositoryError::StaleState)
                }
                None => Err(RepositoryError::NotFound),
            };
        }

        sqlx::query("DELETE FROM transaction_items WHERE transaction_id = $1")
            .bind(transaction.id)
            .execute(&mut *tx)
            .await?;
        Self::insert_items(&mut tx, transaction).await?;

        tx.commit().await?;
        debug!(transaction_id = %transaction.id, status = %transaction.status, "Transaction updated");
        Ok(())
    }
}

#[async_trait]
impl ProductCatalogPort for PgTransactionRepository {
    async fn find_product(&self, id: Uuid) -> RepositoryResult<Option<Product>> {
        let row = sqlx::query_as::<_, (Uuid, String, i64, i32, bool)>(
            r#"
            SELECT id, name, price, stock, is_active
            FROM products
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(row.map(|(id, name, price, stock, is_active)| Product {
            id,
            name,
            price: Money::from_minor(price),
            stock,
            is_active,
        }))
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    owner_id: Uuid,
    subtotal: i64,
    discount: i64,
    tax_rate_bps: i32,
    tax_amount: i64,
    total_amount: i64,
    status: String,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, sqlx::FromRow)]
struct LineItemRow {
    id: Uuid,
    transaction_id: Uuid,
    product_id: Uuid,
    product_name: String,
    unit_price: i64,
    quantity: i32,
    line_total: i64,
    created_at: DateTime<Utc>,
}

impl TransactionRow {
    fn into_transaction(self, items: Vec<LineItemRow>) -> RepositoryResult<Transaction> {
        let status: TransactionStatus = self.status.parse().map_err(RepositoryError::CorruptRow)?;
        let tax_rate = u32::try_from(self.tax_rate_bps)
            .map(TaxRate::from_bps)
            .map_err(|_| {
                RepositoryError::CorruptRow(format!("negative tax rate: {}", self.tax_rate_bps))
            })?;

        Ok(Transaction {
            id: self.id,
            owner_id: self.owner_id,
            items: items
                .into_iter()
                .map(|row| LineItem {
                    id: row.id,
                    product_id: row.product_id,
                    product_name: row.product_name,
                    unit_price: Money::from_minor(row.unit_price),
                    quantity: row.quantity,
                    line_total: Money::from_minor(row.line_total),
                    created_at: row.created_at,
                })
                .collect(),
            subtotal: Money::from_minor(self.subtotal),
            discount: Money::from_minor(self.discount),
            tax_rate,
            tax_amount: Money::from_minor(self.tax_amount),
            total_amount: Money::from_minor(self.total_amount),
            status,
            notes: self.notes,
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted_at: self.deleted_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(status: &str, tax_rate_bps: i32) -> TransactionRow {
        let now = Utc::now();
        TransactionRow {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            subtotal: 25_000,
            discount: 0,
            tax_rate_bps,
            tax_amount: 2_500,
            total_amount: 27_500,
            status: status.to_string(),
            notes: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[test]
    fn test_rows_map_to_transaction() {
        let item = LineItemRow {
            id: Uuid::new_v4(),
            transaction_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            product_name: "Kopi Susu".to_string(),
            unit_price: 12_500,
            quantity: 2,
            line_total: 25_000,
            created_at: Utc::now(),
        };

        let transaction = header("pending", 1_000).into_transaction(vec![item]).unwrap();

        assert_eq!(transaction.status, TransactionStatus::Pending);
        assert_eq!(transaction.tax_rate, TaxRate::from_bps(1_000));
        assert_eq!(transaction.items[0].line_total, Money::from_minor(25_000));
        assert_eq!(transaction.total_amount, Money::from_minor(27_500));
    }

    #[test]
    fn test_corrupt_header_is_reported() {
        assert!(matches!(
            header("refunded", 0).into_transaction(Vec::new()),
            Err(RepositoryError::CorruptRow(_))
        ));
        assert!(matches!(
            header("pending", -5).into_transaction(Vec::new()),
            Err(RepositoryError::CorruptRow(_))
        ));
    }
}
