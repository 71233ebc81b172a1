use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::value_objects::{Money, PaymentMethod, PaymentStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Processor limit on the order id length
pub const MAX_ORDER_REFERENCE_LEN: usize = 50;

/// One logical payment attempt for a transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,

    /// Owning transaction
    pub transaction_id: Uuid,

    pub amount: Money,

    pub method: PaymentMethod,

    pub status: PaymentStatus,

    /// Short locally generated id sent to the processor as its order id
    pub order_reference: String,

    /// Processor-assigned id returned when the charge was created
    pub charge_reference: Option<String>,

    /// Processor reference recorded at settlement
    pub external_reference: Option<String>,

    /// Raw processor message kept for diagnostics
    pub external_response: Option<String>,

    pub paid_at: Option<DateTime<Utc>>,

    pub expires_at: DateTime<Utc>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    pub deleted_at: Option<DateTime<Utc>>,
}

impl Payment {
    /// Creates a pending QRIS payment
    pub fn new(
        transaction_id: Uuid,
        amount: Money,
        order_reference: String,
        expires_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if !amount.is_positive() {
            return Err(DomainError::InvalidAmount(
                "Amount must be greater than 0".to_string(),
            ));
        }

        validate_order_reference(&order_reference)?;

        let now = Utc::now();

        Ok(Self {
            id: Uuid::new_v4(),
            transaction_id,
            amount,
            method: PaymentMethod::Qris,
            status: PaymentStatus::Pending,
            order_reference,
            charge_reference: None,
            external_reference: None,
            external_response: None,
            paid_at: None,
            expires_at,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Pending and still within its expiry window
    pub fn can_be_processed(&self) -> bool {
        self.status == PaymentStatus::Pending && !self.is_expired()
    }

    pub fn set_charge_reference(&mut self, charge_reference: Option<String>) {
        self.charge_reference = charge_reference.filter(|r| !r.is_empty());
        self.updated_at = Utc::now();
    }

    pub fn mark_as_success(
        &mut self,
        external_reference: Option<String>,
        external_response: Option<String>,
    ) -> DomainResult<()> {
        self.ensure_pending()?;

        let now = Utc::now();
        self.status = PaymentStatus::Success;
        self.external_reference = external_reference.filter(|r| !r.is_empty());
        self.external_response = external_response;
        self.paid_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn mark_as_failed(&mut self, external_response: Option<String>) -> DomainResult<()> {
        self.ensure_pending()?;

        self.status = PaymentStatus::Failed;
        self.external_response = external_response;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn mark_as_expired(&mut self) -> DomainResult<()> {
        self.ensure_pending()?;

        self.status = PaymentStatus::Expired;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn mark_as_cancelled(&mut self) -> DomainResult<()> {
        self.ensure_pending()?;

        self.status = PaymentStatus::Cancelled;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Points this payment at a freshly issued charge. Only pending or expired
    /// payments can be restarted.
    pub fn restart_charge(
        &mut self,
        order_reference: String,
        charge_reference: Option<String>,
        expires_at: DateTime<Utc>,
    ) -> DomainResult<()> {
        if !matches!(self.status, PaymentStatus::Pending | PaymentStatus::Expired) {
            return Err(DomainError::invalid_state("pending or expired", self.status));
        }

        validate_order_reference(&order_reference)?;

        self.status = PaymentStatus::Pending;
        self.order_reference = order_reference;
        self.charge_reference = charge_reference.filter(|r| !r.is_empty());
        self.external_reference = None;
        self.external_response = None;
        self.paid_at = None;
        self.expires_at = expires_at;
        self.updated_at = Utc::now();
        Ok(())
    }

    fn ensure_pending(&self) -> DomainResult<()> {
        if self.status != PaymentStatus::Pending {
            return Err(DomainError::invalid_state("pending", self.status));
        }
        Ok(())
    }
}

fn validate_order_reference(order_reference: &str) -> DomainResult<()> {
    if order_reference.is_empty() || order_reference.len() > MAX_ORDER_REFERENCE_LEN {
        return Err(DomainError::ValidationError(format!(
            "Order reference must be 1-{} characters",
            MAX_ORDER_REFERENCE_LEN
        )));
    }
    Ok(())
}

/// Scannable QRIS payload issued by the processor, 1:1 with a payment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QrCode {
    pub id: Uuid,

    pub transaction_id: Uuid,

    pub payment_id: Uuid,

    /// Opaque QRIS string; rendered client side
    pub code: String,

    /// Processor simulator / deeplink URL
    pub verification_url: Option<String>,

    pub expires_at: DateTime<Utc>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    pub deleted_at: Option<DateTime<Utc>>,
}

impl QrCode {
    /// Creates the code for a payment, mirroring its expiry
    pub fn for_payment(
        payment: &Payment,
        code: String,
        verification_url: Option<String>,
    ) -> DomainResult<Self> {
        if code.is_empty() {
            return Err(DomainError::ValidationError(
                "QR payload must not be empty".to_string(),
            ));
        }

        let now = Utc::now();

        Ok(Self {
            id: Uuid::new_v4(),
            transaction_id: payment.transaction_id,
            payment_id: payment.id,
            code,
            verification_url: verification_url.filter(|u| !u.is_empty()),
            expires_at: payment.expires_at,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
    }

    /// Swaps in a new payload in place
    pub fn replace(
        &mut self,
        code: String,
        verification_url: Option<String>,
        expires_at: DateTime<Utc>,
    ) -> DomainResult<()> {
        if code.is_empty() {
            return Err(DomainError::ValidationError(
                "QR payload must not be empty".to_string(),
            ));
        }

        self.code = code;
        self.verification_url = verification_url.filter(|u| !u.is_empty());
        self.expires_at = expires_at;
        self.updated_at = Utc::now();
        Ok(())
    }
}
