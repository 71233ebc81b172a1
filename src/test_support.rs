//! In-memory store implementing the storage ports with the same uniqueness
//! and compare-and-set rules as the Postgres schema.

use crate::domain::errors::{RepositoryError, RepositoryResult};
use crate::domain::{
    Customer, Money, Payment, PaymentStatus, Product, QrCode, TaxRate, Transaction,
    TransactionStatus,
};
use crate::ports::{
    PaymentRepositoryPort, ProductCatalogPort, TransactionFilter, TransactionRepositoryPort,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

const ACTIVE_PAYMENT_INDEX: &str = "idx_payments_one_active_per_transaction";

#[derive(Default)]
struct State {
    transactions: HashMap<Uuid, Transaction>,
    customers: HashMap<Uuid, Customer>,
    products: HashMap<Uuid, Product>,
    payments: Vec<Payment>,
    qr_codes: Vec<QrCode>,
}

#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
    fail_qr_insert: AtomicBool,
    fail_transaction_reads: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_qr_inserts(&self) {
        self.fail_qr_insert.store(true, Ordering::SeqCst);
    }

    /// Makes transaction lookups fail like an exhausted pool until switched off
    pub fn fail_transaction_reads(&self, failing: bool) {
        self.fail_transaction_reads.store(failing, Ordering::SeqCst);
    }

    pub fn add_product(&self, name: &str, price: i64, stock: i32) -> Product {
        let product = Product {
            id: Uuid::new_v4(),
            name: name.to_string(),
            price: Money::from_minor(price),
            stock,
            is_active: true,
        };
        self.state
            .lock()
            .unwrap()
            .products
            .insert(product.id, product.clone());
        product
    }

    /// Stores a pending cart: items as (unit price, quantity), plus tax rate and discount.
    pub fn seed_transaction(&self, items: &[(i64, i32)], tax_bps: u32, discount: i64) -> Transaction {
        let customer = Customer {
            id: Uuid::new_v4(),
            name: "Cashier".to_string(),
            email: "cashier@example.com".to_string(),
        };
        let mut transaction = Transaction::new(customer.id, None);
        for (idx, (price, quantity)) in items.iter().enumerate() {
            let product = self.add_product(&format!("Item {idx}"), *price, 1_000);
            transaction.add_item(&product, *quantity).unwrap();
        }
        transaction.apply_tax(TaxRate::from_bps(tax_bps)).unwrap();
        transaction.apply_discount(Money::from_minor(discount)).unwrap();

        let mut state = self.state.lock().unwrap();
        state.customers.insert(customer.id, customer);
        state.transactions.insert(transaction.id, transaction.clone());
        transaction
    }

    /// Inserts rows directly, bypassing the constraints
    pub fn insert_raw(&self, payment: Payment, qr_code: Option<QrCode>) {
        let mut state = self.state.lock().unwrap();
        state.payments.push(payment);
        if let Some(qr_code) = qr_code {
            state.qr_codes.push(qr_code);
        }
    }

    pub fn payments_for(&self, transaction_id: Uuid) -> Vec<Payment> {
        self.state
            .lock()
            .unwrap()
            .payments
            .iter()
            .filter(|p| p.transaction_id == transaction_id)
            .cloned()
            .collect()
    }

    pub fn qr_codes_for(&self, transaction_id: Uuid) -> Vec<QrCode> {
        self.state
            .lock()
            .unwrap()
            .qr_codes
            .iter()
            .filter(|q| q.transaction_id == transaction_id)
            .cloned()
            .collect()
    }

    pub fn transaction(&self, id: Uuid) -> Transaction {
        self.state.lock().unwrap().transactions[&id].clone()
    }

    /// Overwrites a stored payment status, simulating a concurrent writer
    pub fn set_payment_status(&self, id: Uuid, status: PaymentStatus) {
        let mut state = self.state.lock().unwrap();
        if let Some(payment) = state.payments.iter_mut().find(|p| p.id == id) {
            payment.status = status;
        }
    }
}

impl State {
    fn live_payment_mut(&mut self, id: Uuid) -> RepositoryResult<&mut Payment> {
        self.payments
            .iter_mut()
            .find(|p| p.id == id && p.deleted_at.is_none())
            .ok_or(RepositoryError::NotFound)
    }

    fn check_active_slot(&self, payment: &Payment) -> RepositoryResult<()> {
        if !payment.status.is_active() {
            return Ok(());
        }
        let taken = self.payments.iter().any(|p| {
            p.id != payment.id
                && p.transaction_id == payment.transaction_id
                && p.deleted_at.is_none()
                && p.status.is_active()
        });
        if taken {
            return Err(RepositoryError::ConstraintViolation {
                constraint: ACTIVE_PAYMENT_INDEX.to_string(),
            });
        }
        Ok(())
    }

    fn write_payment(&mut self, payment: &Payment, expected: PaymentStatus) -> RepositoryResult<()> {
        self.check_active_slot(payment)?;
        let stored = self.live_payment_mut(payment.id)?;
        if stored.status != expected {
            return Err(RepositoryError::StaleState);
        }
        *stored = payment.clone();
        Ok(())
    }
}

#[async_trait]
impl PaymentRepositoryPort for InMemoryStore {
    async fn create_payment(&self, payment: &Payment) -> RepositoryResult<()> {
        let mut state = self.state.lock().unwrap();
        state.check_active_slot(payment)?;
        if state
            .payments
            .iter()
            .any(|p| p.order_reference == payment.order_reference)
        {
            return Err(RepositoryError::ConstraintViolation {
                constraint: "payments_order_reference_key".to_string(),
            });
        }
        state.payments.push(payment.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<Payment>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .payments
            .iter()
            .find(|p| p.id == id && p.deleted_at.is_none())
            .cloned())
    }

    async fn find_latest_by_transaction(
        &self,
        transaction_id: Uuid,
    ) -> RepositoryResult<Option<Payment>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .payments
            .iter()
            .filter(|p| p.transaction_id == transaction_id && p.deleted_at.is_none())
            .max_by_key(|p| p.created_at)
            .cloned())
    }

    async fn find_by_charge_reference(
        &self,
        charge_reference: &str,
    ) -> RepositoryResult<Option<Payment>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .payments
            .iter()
            .find(|p| {
                p.charge_reference.as_deref() == Some(charge_reference) && p.deleted_at.is_none()
            })
            .cloned())
    }

    async fn find_by_order_reference(
        &self,
        order_reference: &str,
    ) -> RepositoryResult<Option<Payment>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .payments
            .iter()
            .find(|p| p.order_reference == order_reference && p.deleted_at.is_none())
            .cloned())
    }

    async fn find_overdue_pending(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> RepositoryResult<Vec<Payment>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .payments
            .iter()
            .filter(|p| {
                p.status == PaymentStatus::Pending && p.expires_at < now && p.deleted_at.is_none()
            })
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn update_payment(
        &self,
        payment: &Payment,
        expected: PaymentStatus,
    ) -> RepositoryResult<()> {
        self.state.lock().unwrap().write_payment(payment, expected)
    }

    async fn delete_payment(&self, id: Uuid) -> RepositoryResult<()> {
        let mut state = self.state.lock().unwrap();
        let before = state.payments.len();
        state.payments.retain(|p| p.id != id);
        if state.payments.len() == before {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn create_qr_code(&self, qr_code: &QrCode) -> RepositoryResult<()> {
        if self.fail_qr_insert.load(Ordering::SeqCst) {
            return Err(RepositoryError::Database(sqlx::Error::PoolTimedOut));
        }
        let mut state = self.state.lock().unwrap();
        if state
            .qr_codes
            .iter()
            .any(|q| q.payment_id == qr_code.payment_id && q.deleted_at.is_none())
        {
            return Err(RepositoryError::ConstraintViolation {
                constraint: "idx_qr_codes_payment".to_string(),
            });
        }
        state.qr_codes.push(qr_code.clone());
        Ok(())
    }

    async fn find_qr_code_by_payment(&self, payment_id: Uuid) -> RepositoryResult<Option<QrCode>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .qr_codes
            .iter()
            .find(|q| q.payment_id == payment_id && q.deleted_at.is_none())
            .cloned())
    }

    async fn replace_charge(
        &self,
        payment: &Payment,
        expected: PaymentStatus,
        qr_code: &QrCode,
    ) -> RepositoryResult<()> {
        let mut state = self.state.lock().unwrap();
        let idx = state
            .qr_codes
            .iter()
            .position(|q| q.id == qr_code.id && q.deleted_at.is_none())
            .ok_or(RepositoryError::NotFound)?;
        state.write_payment(payment, expected)?;
        state.qr_codes[idx] = qr_code.clone();
        Ok(())
    }

    async fn settle_payment(
        &self,
        payment: &Payment,
        expected: PaymentStatus,
        transaction: Option<&Transaction>,
    ) -> RepositoryResult<()> {
        let mut state = self.state.lock().unwrap();
        state.write_payment(payment, expected)?;
        if let Some(transaction) = transaction {
            if let Some(stored) = state.transactions.get_mut(&transaction.id) {
                if stored.status == TransactionStatus::Pending && stored.deleted_at.is_none() {
                    *stored = transaction.clone();
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl TransactionRepositoryPort for InMemoryStore {
    async fn create(&self, transaction: &Transaction) -> RepositoryResult<()> {
        self.state
            .lock()
            .unwrap()
            .transactions
            .insert(transaction.id, transaction.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<Transaction>> {
        if self.fail_transaction_reads.load(Ordering::SeqCst) {
            return Err(RepositoryError::Database(sqlx::Error::PoolTimedOut));
        }
        let state = self.state.lock().unwrap();
        Ok(state
            .transactions
            .get(&id)
            .filter(|t| t.deleted_at.is_none())
            .cloned())
    }

    async fn list(&self, filter: &TransactionFilter) -> RepositoryResult<Vec<Transaction>> {
        let state = self.state.lock().unwrap();
        let mut found: Vec<Transaction> = state
            .transactions
            .values()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(found
            .into_iter()
            .skip(filter.page_offset() as usize)
            .take(filter.page_size() as usize)
            .collect())
    }

    async fn find_customer(&self, owner_id: Uuid) -> RepositoryResult<Option<Customer>> {
        Ok(self.state.lock().unwrap().customers.get(&owner_id).cloned())
    }

    async fn update(
        &self,
        transaction: &Transaction,
        expected: TransactionStatus,
    ) -> RepositoryResult<()> {
        let mut state = self.state.lock().unwrap();
        match state.transactions.get_mut(&transaction.id) {
            Some(stored) if stored.deleted_at.is_none() => {
                if stored.status != expected {
                    return Err(RepositoryError::StaleState);
                }
                *stored = transaction.clone();
                Ok(())
            }
            _ => Err(RepositoryError::NotFound),
        }
    }
}

#[async_trait]
impl ProductCatalogPort for InMemoryStore {
    async fn find_product(&self, id: Uuid) -> RepositoryResult<Option<Product>> {
        Ok(self.state.lock().unwrap().products.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_transaction_update_checks_expected_status() {
        let store = InMemoryStore::new();
        let stale = store.seed_transaction(&[(10_000, 1)], 0, 0);
        let mut paid = stale.clone();
        paid.mark_as_paid().unwrap();
        TransactionRepositoryPort::update(&store, &paid, TransactionStatus::Pending)
            .await
            .unwrap();

        let result = TransactionRepositoryPort::update(&store, &stale, TransactionStatus::Pending).await;

        assert!(matches!(result, Err(RepositoryError::StaleState)));
        assert_eq!(store.transaction(stale.id).status, TransactionStatus::Paid);
    }

    #[tokio::test]
    async fn test_settlement_only_flips_pending_transaction() {
        let store = InMemoryStore::new();
        let transaction = store.seed_transaction(&[(10_000, 1)], 0, 0);
        let mut paid = transaction.clone();
        paid.mark_as_paid().unwrap();
        let mut cancelled = transaction.clone();
        cancelled.cancel().unwrap();
        TransactionRepositoryPort::update(&store, &cancelled, TransactionStatus::Pending)
            .await
            .unwrap();

        let mut payment = Payment::new(
            transaction.id,
            transaction.total_amount,
            "qris-test".to_string(),
            Utc::now() + Duration::minutes(5),
        )
        .unwrap();
        store.insert_raw(payment.clone(), None);
        payment.mark_as_success(None, None).unwrap();

        store
            .settle_payment(&payment, PaymentStatus::Pending, Some(&paid))
            .await
            .unwrap();

        assert_eq!(store.payments_for(transaction.id)[0].status, PaymentStatus::Success);
        assert_eq!(store.transaction(transaction.id).status, TransactionStatus::Cancelled);
    }
}
