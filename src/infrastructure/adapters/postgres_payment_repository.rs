use crate::domain::errors::{RepositoryError, RepositoryResult};
use crate::domain::{
    Money, Payment, PaymentMethod, PaymentStatus, QrCode, Transaction, TransactionStatus,
};
use crate::ports::payment_repository_port::PaymentRepositoryPort;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Executor, Pool, Postgres};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

const PAYMENT_COLUMNS: &str = r#"
    id, transaction_id, amount, method, status, order_reference,
    charge_reference, external_reference, external_response,
    paid_at, expires_at, created_at, updated_at, deleted_at
"#;

const QR_CODE_COLUMNS: &str = r#"
    id, transaction_id, payment_id, code, verification_url,
    expires_at, created_at, updated_at, deleted_at
"#;

/// Postgres payment and QR code storage
#[derive(Clone)]
pub struct PgPaymentRepository {
    pool: Arc<Pool<Postgres>>,
}

impl PgPaymentRepository {
    pub fn new(pool: Arc<Pool<Postgres>>) -> Self {
        Self { pool }
    }

    async fn fetch_payment(
        &self,
        condition: &str,
        value: &str,
    ) -> RepositoryResult<Option<Payment>> {
        let query = format!(
            "SELECT {} FROM payments WHERE {} = $1 AND deleted_at IS NULL",
            PAYMENT_COLUMNS, condition
        );

        sqlx::query_as::<_, PaymentRow>(&query)
            .bind(value)
            .fetch_optional(self.pool.as_ref())
            .await?
            .map(PaymentRow::into_payment)
            .transpose()
    }
}

/// Compare-and-set write of every mutable payment column
async fn write_payment<'e, E>(
    executor: E,
    payment: &Payment,
    expected: PaymentStatus,
) -> RepositoryResult<()>
where
    E: Executor<'e, Database = Postgres>,
{
    let query = r#"
        UPDATE payments
        SET status = $1, order_reference = $2, charge_reference = $3,
            external_reference = $4, external_response = $5, paid_at = $6,
            expires_at = $7, updated_at = $8
        WHERE id = $9 AND status = $10 AND deleted_at IS NULL
    "#;

    let rows_affected = sqlx::query(query)
        .bind(payment.status.as_str())
        .bind(&payment.order_reference)
        .bind(&payment.charge_reference)
        .bind(&payment.external_reference)
        .bind(&payment.external_response)
        .bind(payment.paid_at)
        .bind(payment.expires_at)
        .bind(payment.updated_at)
        .bind(payment.id)
        .bind(expected.as_str())
        .execute(executor)
        .await?
        .rows_affected();

    if rows_affected == 0 {
        debug!(payment_id = %payment.id, %expected, "Payment no longer in expected status");
        return Err(RepositoryError::StaleState);
    }

    Ok(())
}

#[async_trait]
impl PaymentRepositoryPort for PgPaymentRepository {
    async fn create_payment(&self, payment: &Payment) -> RepositoryResult<()> {
        let query = format!(
            "INSERT INTO payments ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
            PAYMENT_COLUMNS
        );

        sqlx::query(&query)
            .bind(payment.id)
            .bind(payment.transaction_id)
            .bind(payment.amount.minor())
            .bind(payment.method.to_string())
            .bind(payment.status.as_str())
            .bind(&payment.order_reference)
            .bind(&payment.charge_reference)
            .bind(&payment.external_reference)
            .bind(&payment.external_response)
            .bind(payment.paid_at)
            .bind(payment.expires_at)
            .bind(payment.created_at)
            .bind(payment.updated_at)
            .bind(payment.deleted_at)
            .execute(self.pool.as_ref())
            .await?;

        debug!(payment_id = %payment.id, transaction_id = %payment.transaction_id, "Payment inserted");
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<Payment>> {
        let query = format!(
            "SELECT {} FROM payments WHERE id = $1 AND deleted_at IS NULL",
            PAYMENT_COLUMNS
        );

        sqlx::query_as::<_, PaymentRow>(&query)
            .bind(id)
            .fetch_optional(self.pool.as_ref())
            .await?
            .map(PaymentRow::into_payment)
            .transpose()
    }

    async fn find_latest_by_transaction(
        &self,
        transaction_id: Uuid,
    ) -> RepositoryResult<Option<Payment>> {
        let query = format!(
            r#"
            SELECT {} FROM payments
            WHERE transaction_id = $1 AND deleted_at IS NULL
            ORDER BY created_at DESC
            LIMIT 1
            "#,
            PAYMENT_COLUMNS
        );

        sqlx::query_as::<_, PaymentRow>(&query)
            .bind(transaction_id)
            .fetch_optional(self.pool.as_ref())
            .await?
            .map(PaymentRow::into_payment)
            .transpose()
    }

    async fn find_by_charge_reference(
        &self,
        charge_reference: &str,
    ) -> RepositoryResult<Option<Payment>> {
        self.fetch_payment("charge_reference", charge_reference).await
    }

    async fn find_by_order_reference(
        &self,
        order_reference: &str,
    ) -> RepositoryResult<Option<Payment>> {
        self.fetch_payment("order_reference", order_reference).await
    }

    async fn find_overdue_pending(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> RepositoryResult<Vec<Payment>> {
        let query = format!(
            r#"
            SELECT {} FROM payments
            WHERE status = 'pending' AND expires_at < $1 AND deleted_at IS NULL
            ORDER BY expires_at
            LIMIT $2
            "#,
            PAYMENT_COLUMNS
        );

        sqlx::query_as::<_, PaymentRow>(&query)
            .bind(now)
            .bind(limit)
            .fetch_all(self.pool.as_ref())
            .await?
            .into_iter()
            .map(PaymentRow::into_payment)
            .collect()
    }

    async fn update_payment(
        &self,
        payment: &Payment,
        expected: PaymentStatus,
    ) -> RepositoryResult<()> {
        write_payment(self.pool.as_ref(), payment, expected).await?;

        debug!(payment_id = %payment.id, status = %payment.status, "Payment updated");
        Ok(())
    }

    async fn delete_payment(&self, id: Uuid) -> RepositoryResult<()> {
        let rows_affected = sqlx::query("DELETE FROM payments WHERE id = $1")
            .bind(id)
            .execute(self.pool.as_ref())
            .await?
            .rows_affected();

        if rows_affected == 0 {
            return Err(RepositoryError::NotFound);
        }

        debug!(payment_id = %id, "Payment deleted");
        Ok(())
    }

    async fn create_qr_code(&self, qr_code: &QrCode) -> RepositoryResult<()> {
        let query = format!(
            "INSERT INTO qr_codes ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            QR_CODE_COLUMNS
        );

        sqlx::query(&query)
            .bind(qr_code.id)
            .bind(qr_code.transaction_id)
            .bind(qr_code.payment_id)
            .bind(&qr_code.code)
            .bind(&qr_code.verification_url)
            .bind(qr_code.expires_at)
            .bind(qr_code.created_at)
            .bind(qr_code.updated_at)
            .bind(qr_code.deleted_at)
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }

    async fn find_qr_code_by_payment(&self, payment_id: Uuid) -> RepositoryResult<Option<QrCode>> {
        let query = format!(
            "SELECT {} FROM qr_codes WHERE payment_id = $1 AND deleted_at IS NULL",
            QR_CODE_COLUMNS
        );

        let row = sqlx::query_as::<_, QrCodeRow>(&query)
            .bind(payment_id)
            .fetch_optional(self.pool.as_ref())
            .await?;

        Ok(row.map(QrCodeRow::into_qr_code))
    }

    async fn replace_charge(
        &self,
        payment: &Payment,
        expected: PaymentStatus,
        qr_code: &QrCode,
    ) -> RepositoryResult<()> {
        let mut tx = self.pool.begin().await?;

        write_payment(&mut *tx, payment, expected).await?;

        let rows_affected = sqlx::query(
            r#"
            UPDATE qr_codes
            SET code = $1, verification_url = $2, expires_at = $3, updated_at = $4
            WHERE id = $5 AND deleted_at IS NULL
            "#,
        )
        .bind(&qr_code.code)
        .bind(&qr_code.verification_url)
        .bind(qr_code.expires_at)
        .bind(qr_code.updated_at)
        .bind(qr_code.id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if rows_affected == 0 {
            return Err(RepositoryError::NotFound);
        }

        tx.commit().await?;
        debug!(payment_id = %payment.id, qr_code_id = %qr_code.id, "Payment charge replaced");
        Ok(())
    }

    async fn settle_payment(
        &self,
        payment: &Payment,
        expected: PaymentStatus,
        transaction: Option<&Transaction>,
    ) -> RepositoryResult<()> {
        let mut tx = self.pool.begin().await?;

        write_payment(&mut *tx, payment, expected).await?;

        if let Some(transaction) = transaction {
            let rows_affected = sqlx::query(
                r#"
                UPDATE transactions
                SET status = $1, updated_at = $2
                WHERE id = $3 AND status = $4 AND deleted_at IS NULL
                "#,
            )
            .bind(transaction.status.as_str())
            .bind(transaction.updated_at)
            .bind(transaction.id)
            .bind(TransactionStatus::Pending.as_str())
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if rows_affected == 0 {
                warn!(
                    transaction_id = %transaction.id,
                    payment_id = %payment.id,
                    "Payment settled but transaction was no longer pending"
                );
            }
        }

        tx.commit().await?;
        debug!(payment_id = %payment.id, status = %payment.status, "Payment settled");
        Ok(())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    transaction_id: Uuid,
    amount: i64,
    method: String,
    status: String,
    order_reference: String,
    charge_reference: Option<String>,
    external_reference: Option<String>,
    external_response: Option<String>,
    paid_at: Option<DateTime<Utc>>,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl PaymentRow {
    fn into_payment(self) -> RepositoryResult<Payment> {
        let method: PaymentMethod = self.method.parse().map_err(RepositoryError::CorruptRow)?;
        let status: PaymentStatus = self.status.parse().map_err(RepositoryError::CorruptRow)?;

        Ok(Payment {
            id: self.id,
            transaction_id: self.transaction_id,
            amount: Money::from_minor(self.amount),
            method,
            status,
            order_reference: self.order_reference,
            charge_reference: self.charge_reference,
            external_reference: self.external_reference,
            external_response: self.external_response,
            paid_at: self.paid_at,
            expires_at: self.expires_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted_at: self.deleted_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct QrCodeRow {
    id: Uuid,
    transaction_id: Uuid,
    payment_id: Uuid,
    code: String,
    verification_url: Option<String>,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl QrCodeRow {
    fn into_qr_code(self) -> QrCode {
        QrCode {
            id: self.id,
            transaction_id: self.transaction_id,
            payment_id: self.payment_id,
            code: self.code,
            verification_url: self.verification_url,
            expires_at: self.expires_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted_at: self.deleted_at,
        }
    }
}
