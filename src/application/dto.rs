use crate::domain::{Money, Payment, PaymentMethod, PaymentStatus, QrCode, TransactionStatus};
use crate::ports::TransactionFilter;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generate QR payment request
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateCodeRequest {
    pub transaction_id: Uuid,

    /// Amount the caller expects to charge; must match the transaction total
    #[serde(default)]
    pub amount: Option<Money>,

    /// Falls back to the configured default when absent or not positive
    #[serde(default)]
    pub expiry_minutes: Option<i64>,
}

impl GenerateCodeRequest {
    pub fn for_transaction(transaction_id: Uuid) -> Self {
        Self {
            transaction_id,
            amount: None,
            expiry_minutes: None,
        }
    }
}

/// Payment with its QR code
#[derive(Debug, Clone, Serialize)]
pub struct PaymentResponse {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub amount: Money,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub order_reference: String,
    pub external_reference: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub qr_code: Option<QrCodeResponse>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QrCodeResponse {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub payment_id: Uuid,
    /// QRIS string for client-side rendering
    pub qr_code: String,
    pub url: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl PaymentResponse {
    pub fn from_parts(payment: &Payment, qr_code: Option<&QrCode>) -> Self {
        Self {
            id: payment.id,
            transaction_id: payment.transaction_id,
            amount: payment.amount,
            method: payment.method,
            status: payment.status,
            order_reference: payment.order_reference.clone(),
            external_reference: payment.external_reference.clone(),
            paid_at: payment.paid_at,
            expires_at: payment.expires_at,
            created_at: payment.created_at,
            updated_at: payment.updated_at,
            qr_code: qr_code.map(|qr| QrCodeResponse {
                id: qr.id,
                transaction_id: qr.transaction_id,
                payment_id: qr.payment_id,
                qr_code: qr.code.clone(),
                url: qr.verification_url.clone(),
                expires_at: qr.expires_at,
                created_at: qr.created_at,
            }),
        }
    }
}

/// Payment status poll result
#[derive(Debug, Clone, Serialize)]
pub struct PaymentStatusResponse {
    pub transaction_id: Uuid,
    pub status: PaymentStatus,
    pub external_reference: Option<String>,
    pub message: String,
}

impl PaymentStatusResponse {
    pub fn from_payment(payment: &Payment) -> Self {
        let message = match payment.status {
            PaymentStatus::Pending => {
                "Payment is pending. Waiting for customer to complete payment."
            }
            PaymentStatus::Success => "Payment completed",
            PaymentStatus::Failed => "Payment failed",
            PaymentStatus::Expired => "Payment has expired",
            PaymentStatus::Cancelled => "Payment was cancelled",
        };

        Self {
            transaction_id: payment.transaction_id,
            status: payment.status,
            external_reference: payment.external_reference.clone(),
            message: message.to_string(),
        }
    }
}

/// Start a cart
#[derive(Debug, Deserialize)]
pub struct CreateTransactionRequest {
    pub owner_id: Uuid,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Query string of the transaction listing
#[derive(Debug, Default, Deserialize)]
pub struct ListTransactionsQuery {
    pub owner_id: Option<Uuid>,
    pub status: Option<TransactionStatus>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ListTransactionsQuery {
    pub fn into_filter(self) -> TransactionFilter {
        TransactionFilter {
            owner_id: self.owner_id,
            status: self.status,
            created_from: self.date_from,
            created_to: self.date_to,
            limit: self.limit.unwrap_or_default(),
            offset: self.offset.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Deserialize)]
pub struct UpdateItemRequest {
    pub quantity: i32,
}

#[derive(Debug, Deserialize)]
pub struct ApplyDiscountRequest {
    pub amount: Money,
}

#[derive(Debug, Deserialize)]
pub struct ApplyTaxRequest {
    /// Basis points, 1100 = 11%
    pub rate_bps: u32,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_query_becomes_filter() {
        let owner_id = Uuid::new_v4();
        let query: ListTransactionsQuery = serde_json::from_value(serde_json::json!({
            "owner_id": owner_id,
            "status": "paid",
            "limit": 5,
        }))
        .unwrap();

        let filter = query.into_filter();

        assert_eq!(filter.owner_id, Some(owner_id));
        assert_eq!(filter.status, Some(TransactionStatus::Paid));
        assert_eq!(filter.page_size(), 5);
        assert_eq!(filter.page_offset(), 0);
        assert!(filter.created_from.is_none());
    }
}
