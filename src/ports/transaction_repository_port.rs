use crate::domain::errors::RepositoryResult;
use crate::domain::{Customer, Product, Transaction, TransactionStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub const DEFAULT_LIST_LIMIT: i64 = 20;
pub const MAX_LIST_LIMIT: i64 = 100;

/// Listing filter; every criterion is optional
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionFilter {
    pub owner_id: Option<Uuid>,
    pub status: Option<TransactionStatus>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

impl TransactionFilter {
    /// Limit clamped to `1..=MAX_LIST_LIMIT`, zero meaning the default
    pub fn page_size(&self) -> i64 {
        if self.limit <= 0 {
            DEFAULT_LIST_LIMIT
        } else {
            self.limit.min(MAX_LIST_LIMIT)
        }
    }

    pub fn page_offset(&self) -> i64 {
        self.offset.max(0)
    }

    pub fn matches(&self, transaction: &Transaction) -> bool {
        transaction.deleted_at.is_none()
            && self.owner_id.is_none_or(|owner| transaction.owner_id == owner)
            && self.status.is_none_or(|status| transaction.status == status)
            && self.created_from.is_none_or(|from| transaction.created_at >= from)
            && self.created_to.is_none_or(|to| transaction.created_at <= to)
    }
}

/// Transaction storage port.
///
/// Updates are compare-and-set on the status the caller read and fail with
/// `RepositoryError::StaleState` when the stored row moved on.
#[async_trait]
pub trait TransactionRepositoryPort: Send + Sync {
    async fn create(&self, transaction: &Transaction) -> RepositoryResult<()>;

    /// Loads a live transaction together with its items
    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<Transaction>>;

    /// Live transactions matching `filter`, newest first
    async fn list(&self, filter: &TransactionFilter) -> RepositoryResult<Vec<Transaction>>;

    /// Owner details forwarded to the processor
    async fn find_customer(&self, owner_id: Uuid) -> RepositoryResult<Option<Customer>>;

    /// Writes header fields and replaces the item set if the stored status is
    /// still `expected`
    async fn update(
        &self,
        transaction: &Transaction,
        expected: TransactionStatus,
    ) -> RepositoryResult<()>;
}

/// Read-only product lookup used when adding items
#[async_trait]
pub trait ProductCatalogPort: Send + Sync {
    async fn find_product(&self, id: Uuid) -> RepositoryResult<Option<Product>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_page_size_is_clamped() {
        let mut filter = TransactionFilter::default();
        assert_eq!(filter.page_size(), DEFAULT_LIST_LIMIT);

        filter.limit = 500;
        assert_eq!(filter.page_size(), MAX_LIST_LIMIT);

        filter.offset = -3;
        assert_eq!(filter.page_offset(), 0);
    }

    #[test]
    fn test_filter_matches_owner_status_and_dates() {
        let owner = Uuid::new_v4();
        let tx = Transaction::new(owner, None);

        let by_owner = TransactionFilter {
            owner_id: Some(owner),
            status: Some(TransactionStatus::Pending),
            created_from: Some(tx.created_at - Duration::minutes(1)),
            ..Default::default()
        };
        assert!(by_owner.matches(&tx));

        let other_owner = TransactionFilter {
            owner_id: Some(Uuid::new_v4()),
            ..Default::default()
        };
        assert!(!other_owner.matches(&tx));

        let too_late = TransactionFilter {
            created_to: Some(tx.created_at - Duration::minutes(1)),
            ..Default::default()
        };
        assert!(!too_late.matches(&tx));

        let mut deleted = tx.clone();
        deleted.mark_deleted();
        assert!(!TransactionFilter::default().matches(&deleted));
    }
}
