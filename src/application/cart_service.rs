use crate::domain::errors::{DomainError, DomainResult, RepositoryError};
use crate::domain::{Money, PaymentStatus, Product, TaxRate, Transaction, TransactionStatus};
use crate::ports::{
    PaymentRepositoryPort, ProductCatalogPort, TransactionFilter, TransactionRepositoryPort,
};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Cart use cases that shape a transaction before it is paid
pub struct CartService<T: TransactionRepositoryPort, C: ProductCatalogPort, P: PaymentRepositoryPort>
{
    transactions: Arc<T>,
    catalog: Arc<C>,
    payments: Arc<P>,
}

impl<T: TransactionRepositoryPort, C: ProductCatalogPort, P: PaymentRepositoryPort>
    CartService<T, C, P>
{
    pub fn new(transactions: Arc<T>, catalog: Arc<C>, payments: Arc<P>) -> Self {
        Self {
            transactions,
            catalog,
            payments,
        }
    }

    pub async fn create_transaction(
        &self,
        owner_id: Uuid,
        notes: Option<String>,
    ) -> DomainResult<Transaction> {
        let transaction = Transaction::new(owner_id, notes);
        self.transactions.create(&transaction).await?;

        info!(transaction_id = %transaction.id, %owner_id, "Transaction created");
        Ok(transaction)
    }

    pub async fn get_transaction(&self, transaction_id: Uuid) -> DomainResult<Transaction> {
        self.transactions
            .find_by_id(transaction_id)
            .await?
            .ok_or_else(|| DomainError::TransactionNotFound(transaction_id.to_string()))
    }

    pub async fn list_transactions(&self, filter: TransactionFilter) -> DomainResult<Vec<Transaction>> {
        Ok(self.transactions.list(&filter).await?)
    }

    pub async fn add_item(
        &self,
        transaction_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> DomainResult<Transaction> {
        let mut transaction = self.get_transaction(transaction_id).await?;
        let expected = transaction.status;
        let product = self.load_product(product_id).await?;

        transaction.add_item(&product, quantity)?;
        self.save(&transaction, expected).await?;

        info!(%transaction_id, %product_id, quantity, total = %transaction.total_amount, "Item added");
        Ok(transaction)
    }

    pub async fn remove_item(&self, transaction_id: Uuid, product_id: Uuid) -> DomainResult<Transaction> {
        let mut transaction = self.get_transaction(transaction_id).await?;
        let expected = transaction.status;

        transaction.remove_item(product_id)?;
        self.save(&transaction, expected).await?;

        info!(%transaction_id, %product_id, "Item removed");
        Ok(transaction)
    }

    /// Zero removes the line
    pub async fn update_item_quantity(
        &self,
        transaction_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> DomainResult<Transaction> {
        let mut transaction = self.get_transaction(transaction_id).await?;
        let expected = transaction.status;
        let product = self.load_product(product_id).await?;

        transaction.update_item_quantity(&product, quantity)?;
        self.save(&transaction, expected).await?;

        Ok(transaction)
    }

    pub async fn apply_discount(&self, transaction_id: Uuid, amount: Money) -> DomainResult<Transaction> {
        let mut transaction = self.get_transaction(transaction_id).await?;
        let expected = transaction.status;

        transaction.apply_discount(amount)?;
        self.save(&transaction, expected).await?;

        info!(%transaction_id, discount = %amount, "Discount applied");
        Ok(transaction)
    }

    pub async fn apply_tax(&self, transaction_id: Uuid, rate: TaxRate) -> DomainResult<Transaction> {
        let mut transaction = self.get_transaction(transaction_id).await?;
        let expected = transaction.status;

        transaction.apply_tax(rate)?;
        self.save(&transaction, expected).await?;

        info!(%transaction_id, rate_bps = rate.bps(), "Tax rate applied");
        Ok(transaction)
    }

    /// Refused while a QR code can still be paid
    pub async fn cancel_transaction(&self, transaction_id: Uuid) -> DomainResult<Transaction> {
        let mut transaction = self.get_transaction(transaction_id).await?;
        let expected = transaction.status;
        self.ensure_no_live_payment(transaction_id).await?;

        transaction.cancel()?;
        self.save(&transaction, expected).await?;

        info!(%transaction_id, "Transaction cancelled");
        Ok(transaction)
    }

    /// Closes an abandoned cart; refused while a QR code can still be paid
    pub async fn expire_transaction(&self, transaction_id: Uuid) -> DomainResult<Transaction> {
        let mut transaction = self.get_transaction(transaction_id).await?;
        let expected = transaction.status;
        self.ensure_no_live_payment(transaction_id).await?;

        transaction.mark_as_expired()?;
        self.save(&transaction, expected).await?;

        info!(%transaction_id, "Transaction expired");
        Ok(transaction)
    }

    /// Soft delete; paid transactions and carts with a payable QR code are kept
    pub async fn delete_transaction(&self, transaction_id: Uuid) -> DomainResult<()> {
        let mut transaction = self.get_transaction(transaction_id).await?;
        let expected = transaction.status;

        if transaction.status == TransactionStatus::Paid {
            return Err(DomainError::invalid_state("unpaid", transaction.status));
        }
        self.ensure_no_live_payment(transaction_id).await?;

        transaction.mark_deleted();
        self.save(&transaction, expected).await?;

        info!(%transaction_id, "Transaction deleted");
        Ok(())
    }

    async fn ensure_no_live_payment(&self, transaction_id: Uuid) -> DomainResult<()> {
        if let Some(payment) = self.payments.find_latest_by_transaction(transaction_id).await? {
            if payment.can_be_processed() {
                return Err(DomainError::invalid_state(
                    "no payable QR code",
                    PaymentStatus::Pending,
                ));
            }
        }
        Ok(())
    }

    /// Compare-and-set write; a status change since the read is reported as
    /// the current status
    async fn save(&self, transaction: &Transaction, expected: TransactionStatus) -> DomainResult<()> {
        match self.transactions.update(transaction, expected).await {
            Ok(()) => Ok(()),
            Err(RepositoryError::StaleState) => {
                let current = self.get_transaction(transaction.id).await?;
                warn!(
                    transaction_id = %transaction.id,
                    %expected,
                    current = %current.status,
                    "Transaction changed concurrently"
                );
                Err(DomainError::invalid_state(expected.as_str(), current.status))
            }
            Err(RepositoryError::NotFound) => {
                Err(DomainError::TransactionNotFound(transaction.id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn load_product(&self, product_id: Uuid) -> DomainResult<Product> {
        self.catalog
            .find_product(product_id)
            .await?
            .ok_or_else(|| DomainError::ProductNotFound(product_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Payment, QrCode};
    use crate::test_support::InMemoryStore;
    use chrono::{Duration, Utc};

    type TestService = CartService<InMemoryStore, InMemoryStore, InMemoryStore>;

    fn service(store: &Arc<InMemoryStore>) -> TestService {
        CartService::new(store.clone(), store.clone(), store.clone())
    }

    /// Stores a pending payment with its QR code, expiring `minutes` from now
    fn store_payment(store: &InMemoryStore, transaction: &Transaction, minutes: i64) {
        let payment = Payment::new(
            transaction.id,
            transaction.total_amount,
            format!("qris-{}", &transaction.id.simple().to_string()[..8]),
            Utc::now() + Duration::minutes(minutes),
        )
        .unwrap();
        let qr_code = QrCode::for_payment(&payment, "payload".to_string(), None).unwrap();
        store.insert_raw(payment, Some(qr_code));
    }

    #[tokio::test]
    async fn test_cart_flow_keeps_totals_consistent() {
        let store = Arc::new(InMemoryStore::new());
        let coffee = store.add_product("Kopi Susu", 18_000, 20);
        let bread = store.add_product("Roti Bakar", 12_500, 20);
        let service = service(&store);

        let tx = service
            .create_transaction(Uuid::new_v4(), Some("table 4".to_string()))
            .await
            .unwrap();
        service.add_item(tx.id, coffee.id, 2).await.unwrap();
        service.add_item(tx.id, bread.id, 1).await.unwrap();
        service.apply_tax(tx.id, TaxRate::from_bps(1_100)).await.unwrap();
        let tx = service
            .apply_discount(tx.id, Money::from_minor(8_500))
            .await
            .unwrap();

        // 48_500 - 8_500 = 40_000, 11% tax = 4_400
        assert_eq!(tx.subtotal, Money::from_minor(48_500));
        assert_eq!(tx.tax_amount, Money::from_minor(4_400));
        assert_eq!(tx.total_amount, Money::from_minor(44_400));
        assert_eq!(store.transaction(tx.id), tx);
    }

    #[tokio::test]
    async fn test_quantity_changes_and_removal() {
        let store = Arc::new(InMemoryStore::new());
        let coffee = store.add_product("Kopi Susu", 18_000, 5);
        let service = service(&store);
        let tx = service.create_transaction(Uuid::new_v4(), None).await.unwrap();

        service.add_item(tx.id, coffee.id, 1).await.unwrap();
        let tx_after = service.update_item_quantity(tx.id, coffee.id, 4).await.unwrap();
        assert_eq!(tx_after.total_amount, Money::from_minor(72_000));

        assert!(service.update_item_quantity(tx.id, coffee.id, 6).await.is_err());

        let emptied = service.remove_item(tx.id, coffee.id).await.unwrap();
        assert!(emptied.items.is_empty());
        assert!(emptied.total_amount.is_zero());
    }

    #[tokio::test]
    async fn test_unknown_product_and_transaction() {
        let store = Arc::new(InMemoryStore::new());
        let service = service(&store);
        let tx = service.create_transaction(Uuid::new_v4(), None).await.unwrap();

        assert!(matches!(
            service.add_item(tx.id, Uuid::new_v4(), 1).await,
            Err(DomainError::ProductNotFound(_))
        ));
        assert!(matches!(
            service.get_transaction(Uuid::new_v4()).await,
            Err(DomainError::TransactionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_cancelled_cart_is_frozen() {
        let store = Arc::new(InMemoryStore::new());
        let coffee = store.add_product("Kopi Susu", 18_000, 5);
        let service = service(&store);
        let tx = service.create_transaction(Uuid::new_v4(), None).await.unwrap();

        let cancelled = service.cancel_transaction(tx.id).await.unwrap();

        assert_eq!(cancelled.status, TransactionStatus::Cancelled);
        assert!(matches!(
            service.add_item(tx.id, coffee.id, 1).await,
            Err(DomainError::InvalidState { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_hides_transaction() {
        let store = Arc::new(InMemoryStore::new());
        let service = service(&store);
        let tx = service.create_transaction(Uuid::new_v4(), None).await.unwrap();

        service.delete_transaction(tx.id).await.unwrap();

        assert!(matches!(
            service.get_transaction(tx.id).await,
            Err(DomainError::TransactionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_paid_transaction_cannot_be_deleted() {
        let store = Arc::new(InMemoryStore::new());
        let mut tx = store.seed_transaction(&[(10_000, 1)], 0, 0);
        tx.mark_as_paid().unwrap();
        TransactionRepositoryPort::update(store.as_ref(), &tx, TransactionStatus::Pending)
            .await
            .unwrap();
        let service = service(&store);

        let result = service.delete_transaction(tx.id).await;

        assert!(matches!(result, Err(DomainError::InvalidState { .. })));
    }

    #[tokio::test]
    async fn test_stale_cart_edit_does_not_reopen_paid_transaction() {
        let store = Arc::new(InMemoryStore::new());
        let coffee = store.add_product("Kopi Susu", 18_000, 20);
        let service = service(&store);
        let tx = store.seed_transaction(&[(10_000, 1)], 0, 0);

        let mut stale = service.get_transaction(tx.id).await.unwrap();
        let mut paid = stale.clone();
        paid.mark_as_paid().unwrap();
        TransactionRepositoryPort::update(store.as_ref(), &paid, TransactionStatus::Pending)
            .await
            .unwrap();

        stale.add_item(&coffee, 1).unwrap();
        let direct =
            TransactionRepositoryPort::update(store.as_ref(), &stale, TransactionStatus::Pending).await;
        let through_service = service.add_item(tx.id, coffee.id, 1).await;

        assert!(matches!(direct, Err(RepositoryError::StaleState)));
        assert!(matches!(through_service, Err(DomainError::InvalidState { .. })));
        let stored = store.transaction(tx.id);
        assert_eq!(stored.status, TransactionStatus::Paid);
        assert_eq!(stored.total_amount, Money::from_minor(10_000));
    }

    #[tokio::test]
    async fn test_list_filters_by_owner_and_status() {
        let store = Arc::new(InMemoryStore::new());
        let service = service(&store);
        let owner = Uuid::new_v4();
        let first = service.create_transaction(owner, None).await.unwrap();
        let second = service.create_transaction(owner, None).await.unwrap();
        let deleted = service.create_transaction(owner, None).await.unwrap();
        service.create_transaction(Uuid::new_v4(), None).await.unwrap();
        service.cancel_transaction(first.id).await.unwrap();
        service.delete_transaction(deleted.id).await.unwrap();

        let all_for_owner = service
            .list_transactions(TransactionFilter {
                owner_id: Some(owner),
                ..Default::default()
            })
            .await
            .unwrap();
        let pending = service
            .list_transactions(TransactionFilter {
                owner_id: Some(owner),
                status: Some(TransactionStatus::Pending),
                ..Default::default()
            })
            .await
            .unwrap();
        let one_page = service
            .list_transactions(TransactionFilter {
                limit: 1,
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(all_for_owner.len(), 2);
        assert!(all_for_owner.iter().all(|t| t.id != deleted.id));
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, second.id);
        assert_eq!(one_page.len(), 1);
    }

    #[tokio::test]
    async fn test_expire_abandoned_cart() {
        let store = Arc::new(InMemoryStore::new());
        let coffee = store.add_product("Kopi Susu", 18_000, 5);
        let service = service(&store);
        let tx = service.create_transaction(Uuid::new_v4(), None).await.unwrap();

        let expired = service.expire_transaction(tx.id).await.unwrap();

        assert_eq!(expired.status, TransactionStatus::Expired);
        assert_eq!(store.transaction(tx.id).status, TransactionStatus::Expired);
        assert!(matches!(
            service.add_item(tx.id, coffee.id, 1).await,
            Err(DomainError::InvalidState { .. })
        ));
        assert!(service.cancel_transaction(tx.id).await.is_err());
    }

    #[tokio::test]
    async fn test_cart_with_payable_qr_code_cannot_be_closed() {
        let store = Arc::new(InMemoryStore::new());
        let service = service(&store);
        let tx = store.seed_transaction(&[(10_000, 1)], 0, 0);
        store_payment(&store, &tx, 5);

        for result in [
            service.cancel_transaction(tx.id).await.map(|_| ()),
            service.expire_transaction(tx.id).await.map(|_| ()),
            service.delete_transaction(tx.id).await,
        ] {
            assert!(matches!(result, Err(DomainError::InvalidState { .. })));
        }
        assert_eq!(store.transaction(tx.id).status, TransactionStatus::Pending);
    }

    #[tokio::test]
    async fn test_cart_with_lapsed_qr_code_can_be_cancelled() {
        let store = Arc::new(InMemoryStore::new());
        let service = service(&store);
        let tx = store.seed_transaction(&[(10_000, 1)], 0, 0);
        store_payment(&store, &tx, -1);

        let cancelled = service.cancel_transaction(tx.id).await.unwrap();

        assert_eq!(cancelled.status, TransactionStatus::Cancelled);
    }
}
