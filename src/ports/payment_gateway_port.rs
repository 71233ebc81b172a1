use crate::domain::errors::GatewayError;
use crate::domain::{Customer, Money, PaymentStatus};
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Line sent to the processor. Tax and discount travel as pseudo-lines
/// with positive and negative prices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeItem {
    pub id: String,
    pub name: String,
    pub price: Money,
    pub quantity: i32,
}

impl ChargeItem {
    pub fn total(&self) -> Money {
        self.price * i64::from(self.quantity)
    }
}

/// Charge request; `gross_amount` must equal the sum of the item totals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeRequest {
    pub order_reference: String,
    pub gross_amount: Money,
    pub items: Vec<ChargeItem>,
    pub customer: Option<Customer>,
    pub expiry_minutes: i64,
}

/// Issued QR charge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeResponse {
    /// Processor id of the charge
    pub charge_reference: Option<String>,
    /// Opaque QRIS payload
    pub qr_payload: String,
    pub verification_url: Option<String>,
}

/// Charge status already translated to the internal vocabulary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeStatus {
    pub status: PaymentStatus,
    /// Status string as reported by the processor, for logs
    pub raw_status: String,
    pub external_reference: Option<String>,
    pub message: Option<String>,
}

/// Verified asynchronous status notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayNotification {
    pub order_reference: String,
    pub status: PaymentStatus,
    pub raw_status: String,
    pub external_reference: Option<String>,
    /// Original body, kept as the diagnostic response
    pub payload: String,
}

/// Boundary to the external payment processor. Processor status strings
/// never leave implementations of this trait.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PaymentGatewayPort: Send + Sync {
    /// Creates a fixed-amount QR charge
    async fn request_charge(&self, request: ChargeRequest) -> GatewayResult<ChargeResponse>;

    /// Queries the processor for the current status of a charge
    async fn check_status(&self, order_reference: &str) -> GatewayResult<ChargeStatus>;

    /// Cancels a charge that has not settled
    async fn cancel_charge(&self, order_reference: &str) -> GatewayResult<()>;

    /// Parses and authenticates a webhook body
    fn parse_notification(&self, body: &str) -> GatewayResult<GatewayNotification>;
}
