use crate::domain::errors::RepositoryResult;
use crate::domain::{Payment, PaymentStatus, QrCode, Transaction};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Payment and QR code storage port.
///
/// Storage enforces at most one live payment per transaction whose status is
/// pending or success; inserting a second one fails with
/// `RepositoryError::ConstraintViolation`. Updates are compare-and-set on the
/// status the caller read and fail with `RepositoryError::StaleState` when
/// the row moved on. Soft-deleted rows are invisible to every method.
#[async_trait]
pub trait PaymentRepositoryPort: Send + Sync {
    /// Inserts a new payment
    async fn create_payment(&self, payment: &Payment) -> RepositoryResult<()>;

    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<Payment>>;

    /// Most recent payment for a transaction
    async fn find_latest_by_transaction(&self, transaction_id: Uuid)
        -> RepositoryResult<Option<Payment>>;

    /// Looks up by the processor's charge id
    async fn find_by_charge_reference(&self, charge_reference: &str)
        -> RepositoryResult<Option<Payment>>;

    /// Looks up by the full order reference
    async fn find_by_order_reference(&self, order_reference: &str)
        -> RepositoryResult<Option<Payment>>;

    /// Pending payments whose expiry passed before `now`
    async fn find_overdue_pending(&self, now: DateTime<Utc>, limit: i64)
        -> RepositoryResult<Vec<Payment>>;

    /// Writes a payment if its stored status is still `expected`
    async fn update_payment(&self, payment: &Payment, expected: PaymentStatus)
        -> RepositoryResult<()>;

    /// Hard delete, used only to compensate a failed QR code insert
    async fn delete_payment(&self, id: Uuid) -> RepositoryResult<()>;

    /// Inserts the QR code of a payment
    async fn create_qr_code(&self, qr_code: &QrCode) -> RepositoryResult<()>;

    async fn find_qr_code_by_payment(&self, payment_id: Uuid) -> RepositoryResult<Option<QrCode>>;

    /// Atomically rewrites a payment and its QR code for a new charge
    async fn replace_charge(
        &self,
        payment: &Payment,
        expected: PaymentStatus,
        qr_code: &QrCode,
    ) -> RepositoryResult<()>;

    /// Atomically writes a settled payment and, when given, its paid transaction
    async fn settle_payment(
        &self,
        payment: &Payment,
        expected: PaymentStatus,
        transaction: Option<&Transaction>,
    ) -> RepositoryResult<()>;
}
