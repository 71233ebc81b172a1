use crate::application::dto::{GenerateCodeRequest, PaymentResponse, PaymentStatusResponse};
use crate::domain::errors::{DomainError, DomainResult, GatewayError, RepositoryError};
use crate::domain::{Money, Payment, PaymentStatus, QrCode, Transaction};
use crate::ports::payment_gateway_port::{
    ChargeItem, ChargeRequest, ChargeStatus, GatewayNotification, GatewayResult,
};
use crate::ports::{PaymentGatewayPort, PaymentRepositoryPort, TransactionRepositoryPort};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Reads attempted after losing an insert race before giving up on the winner's QR code
const CONFLICT_READ_ATTEMPTS: u32 = 5;
const CONFLICT_READ_BACKOFF: Duration = Duration::from_millis(50);

/// Orchestrator tuning
#[derive(Debug, Clone)]
pub struct PaymentSettings {
    pub default_expiry_minutes: i64,
    /// Upper bound on every processor call
    pub gateway_timeout: Duration,
}

impl Default for PaymentSettings {
    fn default() -> Self {
        Self {
            default_expiry_minutes: 10,
            gateway_timeout: Duration::from_secs(15),
        }
    }
}

/// QR payment orchestrator.
///
/// Processor calls never run inside a storage transaction: the charge is
/// requested first and its result persisted afterwards, with compensation
/// when the persist fails. At most one pending/success payment per
/// transaction is guaranteed by storage, not by locking here.
pub struct PaymentService<G: PaymentGatewayPort, P: PaymentRepositoryPort, T: TransactionRepositoryPort>
{
    gateway: Arc<G>,
    payments: Arc<P>,
    transactions: Arc<T>,
    settings: PaymentSettings,
}

impl<G: PaymentGatewayPort, P: PaymentRepositoryPort, T: TransactionRepositoryPort>
    PaymentService<G, P, T>
{
    pub fn new(
        gateway: Arc<G>,
        payments: Arc<P>,
        transactions: Arc<T>,
        settings: PaymentSettings,
    ) -> Self {
        Self {
            gateway,
            payments,
            transactions,
            settings,
        }
    }

    /// Issues a QR code for a pending transaction, or returns the one still valid
    pub async fn generate_code(&self, request: GenerateCodeRequest) -> DomainResult<PaymentResponse> {
        let transaction_id = request.transaction_id;
        info!(%transaction_id, "Generating QR payment");

        let transaction = self.load_transaction(transaction_id).await?;
        if !transaction.is_pending() {
            return Err(DomainError::invalid_state("pending", transaction.status));
        }

        if let Some(amount) = request.amount {
            if amount != transaction.total_amount {
                return Err(DomainError::InvalidAmount(format!(
                    "Requested {} but transaction total is {}",
                    amount, transaction.total_amount
                )));
            }
        }

        if let Some(mut existing) = self.payments.find_latest_by_transaction(transaction_id).await? {
            if existing.can_be_processed() {
                return match self.payments.find_qr_code_by_payment(existing.id).await? {
                    Some(qr_code) => {
                        info!(%transaction_id, payment_id = %existing.id, "Returning still valid payment");
                        Ok(PaymentResponse::from_parts(&existing, Some(&qr_code)))
                    }
                    // another request is still storing its QR code
                    None => self.reconcile_conflict(transaction_id).await,
                };
            }

            if existing.status == PaymentStatus::Success {
                return Err(DomainError::invalid_state("no settled payment", existing.status));
            }

            if existing.status == PaymentStatus::Pending {
                if let Err(e) = self.expire_payment(&mut existing).await {
                    error!(%transaction_id, payment_id = %existing.id, error = %e, "Failed to expire stale payment");
                }
            }
        }

        let expiry_minutes = request
            .expiry_minutes
            .filter(|m| *m > 0)
            .unwrap_or(self.settings.default_expiry_minutes);
        let now = Utc::now();
        let expires_at = now + chrono::Duration::minutes(expiry_minutes);
        let order_reference = build_order_reference(transaction_id, now);

        let mut payment = Payment::new(
            transaction_id,
            transaction.total_amount,
            order_reference.clone(),
            expires_at,
        )?;
        let charge = self
            .build_charge_request(&transaction, order_reference, expiry_minutes)
            .await?;

        let response = self
            .call_gateway(self.gateway.request_charge(charge))
            .await
            .map_err(|e| {
                error!(%transaction_id, error = %e, "Processor refused QR charge");
                DomainError::PaymentGenerationFailed(e)
            })?;

        payment.set_charge_reference(response.charge_reference);
        let qr_code = QrCode::for_payment(&payment, response.qr_payload, response.verification_url)?;

        match self.payments.create_payment(&payment).await {
            Ok(()) => {}
            Err(RepositoryError::ConstraintViolation { constraint }) => {
                warn!(%transaction_id, %constraint, "Concurrent request created the payment first");
                self.cancel_orphan_charge(&payment.order_reference).await;
                return self.reconcile_conflict(transaction_id).await;
            }
            Err(e) => {
                error!(
                    %transaction_id,
                    order_reference = %payment.order_reference,
                    error = %e,
                    "Charge created at processor but payment was not persisted"
                );
                self.cancel_orphan_charge(&payment.order_reference).await;
                return Err(e.into());
            }
        }

        if let Err(e) = self.payments.create_qr_code(&qr_code).await {
            error!(%transaction_id, payment_id = %payment.id, error = %e, "Failed to persist QR code, rolling back payment");
            if let Err(delete_error) = self.payments.delete_payment(payment.id).await {
                error!(payment_id = %payment.id, error = %delete_error, "Failed to roll back payment");
            }
            self.cancel_orphan_charge(&payment.order_reference).await;
            return Err(e.into());
        }

        info!(%transaction_id, payment_id = %payment.id, order_reference = %payment.order_reference, "QR payment generated");

        Ok(PaymentResponse::from_parts(&payment, Some(&qr_code)))
    }

    /// Current status, reconciled against the processor while pending
    pub async fn get_status(&self, transaction_id: Uuid) -> DomainResult<PaymentStatusResponse> {
        let mut payment = self.load_payment(transaction_id).await?;

        if payment.status != PaymentStatus::Pending {
            return Ok(PaymentStatusResponse::from_payment(&payment));
        }

        if payment.is_expired() {
            let payment = match self.expire_payment(&mut payment).await {
                Ok(()) => payment,
                Err(DomainError::Repository(RepositoryError::StaleState)) => {
                    self.reload(&payment).await?
                }
                Err(e) => {
                    error!(%transaction_id, error = %e, "Failed to persist payment expiry");
                    payment
                }
            };
            return Ok(PaymentStatusResponse::from_payment(&payment));
        }

        let status = match self
            .call_gateway(self.gateway.check_status(&payment.order_reference))
            .await
        {
            Ok(status) => status,
            Err(e) => {
                warn!(
                    %transaction_id,
                    order_reference = %payment.order_reference,
                    error = %e,
                    "Processor status check failed, reporting pending"
                );
                return Ok(PaymentStatusResponse::from_payment(&payment));
            }
        };

        debug!(%transaction_id, raw_status = %status.raw_status, "Processor status received");

        let payment = self.apply_charge_status(payment, status).await?;
        Ok(PaymentStatusResponse::from_payment(&payment))
    }

    /// Replaces the charge of a pending or expired payment, updating the
    /// payment and QR code rows in place
    pub async fn refresh_code(&self, transaction_id: Uuid) -> DomainResult<PaymentResponse> {
        info!(%transaction_id, "Refreshing QR payment");

        let mut payment = self.load_payment(transaction_id).await?;
        if !matches!(payment.status, PaymentStatus::Pending | PaymentStatus::Expired) {
            return Err(DomainError::invalid_state("pending or expired", payment.status));
        }

        let transaction = self.load_transaction(transaction_id).await?;
        if !transaction.is_pending() {
            return Err(DomainError::invalid_state("pending", transaction.status));
        }

        if payment.status == PaymentStatus::Pending && !payment.is_expired() {
            // the live charge may already be paid; it must not be replaced then
            if let Ok(status) = self
                .call_gateway(self.gateway.check_status(&payment.order_reference))
                .await
            {
                if status.status == PaymentStatus::Success {
                    let settled = self.apply_charge_status(payment, status).await?;
                    return Err(DomainError::invalid_state("pending or expired", settled.status));
                }
            }
            self.cancel_orphan_charge(&payment.order_reference).await;
        }

        let existing_qr = self.payments.find_qr_code_by_payment(payment.id).await?;
        let expected = payment.status;
        let expiry_minutes = self.settings.default_expiry_minutes;
        let now = Utc::now();
        let expires_at = now + chrono::Duration::minutes(expiry_minutes);
        let order_reference = build_order_reference(transaction_id, now);

        let charge = self
            .build_charge_request(&transaction, order_reference.clone(), expiry_minutes)
            .await?;
        let response = self
            .call_gateway(self.gateway.request_charge(charge))
            .await
            .map_err(|e| {
                error!(%transaction_id, error = %e, "Processor refused refreshed QR charge");
                DomainError::PaymentGenerationFailed(e)
            })?;

        payment.restart_charge(order_reference, response.charge_reference, expires_at)?;

        let persisted = match existing_qr {
            Some(mut qr_code) => {
                qr_code.replace(response.qr_payload, response.verification_url, expires_at)?;
                self.payments
                    .replace_charge(&payment, expected, &qr_code)
                    .await
                    .map(|()| qr_code)
            }
            None => {
                let qr_code =
                    QrCode::for_payment(&payment, response.qr_payload, response.verification_url)?;
                match self.payments.update_payment(&payment, expected).await {
                    Ok(()) => self.payments.create_qr_code(&qr_code).await.map(|()| qr_code),
                    Err(e) => Err(e),
                }
            }
        };

        match persisted {
            Ok(qr_code) => {
                info!(%transaction_id, payment_id = %payment.id, order_reference = %payment.order_reference, "QR payment refreshed");
                Ok(PaymentResponse::from_parts(&payment, Some(&qr_code)))
            }
            Err(RepositoryError::StaleState) => {
                warn!(%transaction_id, payment_id = %payment.id, "Payment changed during refresh, returning current state");
                self.cancel_orphan_charge(&payment.order_reference).await;
                let current = self.reload(&payment).await?;
                let qr_code = self.payments.find_qr_code_by_payment(current.id).await?;
                Ok(PaymentResponse::from_parts(&current, qr_code.as_ref()))
            }
            Err(e) => {
                error!(
                    %transaction_id,
                    order_reference = %payment.order_reference,
                    error = %e,
                    "Refreshed charge created at processor but not persisted"
                );
                self.cancel_orphan_charge(&payment.order_reference).await;
                Err(e.into())
            }
        }
    }

    /// Cancels a live pending payment at the processor, then locally
    pub async fn cancel_payment(&self, transaction_id: Uuid) -> DomainResult<PaymentStatusResponse> {
        let mut payment = self.load_payment(transaction_id).await?;
        if payment.status != PaymentStatus::Pending {
            return Err(DomainError::invalid_state("pending", payment.status));
        }

        if payment.is_expired() {
            if let Err(e) = self.expire_payment(&mut payment).await {
                warn!(%transaction_id, error = %e, "Failed to persist payment expiry");
            }
            return Err(DomainError::invalid_state("pending", PaymentStatus::Expired));
        }

        self.call_gateway(self.gateway.cancel_charge(&payment.order_reference))
            .await?;

        payment.mark_as_cancelled()?;
        let payment = match self
            .payments
            .update_payment(&payment, PaymentStatus::Pending)
            .await
        {
            Ok(()) => payment,
            Err(RepositoryError::StaleState) => self.reload(&payment).await?,
            Err(e) => {
                error!(%transaction_id, error = %e, "Charge cancelled at processor but not persisted");
                return Err(e.into());
            }
        };

        info!(%transaction_id, payment_id = %payment.id, status = %payment.status, "Payment cancel handled");
        Ok(PaymentStatusResponse::from_payment(&payment))
    }

    /// Authenticates and decodes a processor webhook body
    pub fn parse_notification(&self, body: &str) -> GatewayResult<GatewayNotification> {
        self.gateway.parse_notification(body)
    }

    /// Applies an asynchronous processor notification. Replays and
    /// notifications for settled payments are no-ops.
    pub async fn handle_notification(
        &self,
        notification: GatewayNotification,
    ) -> DomainResult<PaymentStatus> {
        let order_reference = notification.order_reference.clone();
        info!(
            %order_reference,
            raw_status = %notification.raw_status,
            "Processor notification received"
        );

        let mut found = None;
        if let Some(external_reference) = notification.external_reference.as_deref() {
            found = self.payments.find_by_charge_reference(external_reference).await?;
        }
        if found.is_none() {
            found = self.payments.find_by_order_reference(&order_reference).await?;
        }
        let payment = found.ok_or_else(|| DomainError::PaymentNotFound(order_reference.clone()))?;

        if payment.status != PaymentStatus::Pending {
            if payment.status == PaymentStatus::Expired && notification.status == PaymentStatus::Success {
                error!(
                    %order_reference,
                    payment_id = %payment.id,
                    "Processor settled a payment that already expired locally, manual reconciliation required"
                );
            } else {
                debug!(%order_reference, status = %payment.status, "Notification ignored for settled payment");
            }
            return Ok(payment.status);
        }

        let status = ChargeStatus {
            status: notification.status,
            raw_status: notification.raw_status,
            external_reference: notification.external_reference,
            message: Some(notification.payload),
        };

        let payment = self.apply_charge_status(payment, status).await?;
        Ok(payment.status)
    }

    /// Marks pending payments past their expiry as expired; returns how many changed
    pub async fn expire_overdue_payments(&self, batch_size: i64) -> DomainResult<usize> {
        let overdue = self
            .payments
            .find_overdue_pending(Utc::now(), batch_size)
            .await?;

        let mut expired = 0;
        for mut payment in overdue {
            match self.expire_payment(&mut payment).await {
                Ok(()) => expired += 1,
                Err(e) => debug!(payment_id = %payment.id, error = %e, "Skipped payment expiry"),
            }
        }

        if expired > 0 {
            info!(expired, "Expired overdue payments");
        }
        Ok(expired)
    }

    async fn apply_charge_status(
        &self,
        mut payment: Payment,
        status: ChargeStatus,
    ) -> DomainResult<Payment> {
        let transaction_id = payment.transaction_id;
        let expected = payment.status;

        let written = match status.status {
            PaymentStatus::Pending => return Ok(payment),
            PaymentStatus::Success => {
                let transaction = self.paid_transaction(transaction_id).await?;
                payment.mark_as_success(status.external_reference, status.message)?;
                self.payments
                    .settle_payment(&payment, expected, transaction.as_ref())
                    .await
            }
            _ => {
                payment.mark_as_failed(status.message)?;
                self.payments.update_payment(&payment, expected).await
            }
        };

        match written {
            Ok(()) => {
                info!(%transaction_id, payment_id = %payment.id, status = %payment.status, "Payment status updated");
                Ok(payment)
            }
            Err(RepositoryError::StaleState) => {
                debug!(%transaction_id, payment_id = %payment.id, "Payment changed concurrently, using stored state");
                self.reload(&payment).await
            }
            Err(e) => {
                error!(
                    %transaction_id,
                    payment_id = %payment.id,
                    status = %payment.status,
                    error = %e,
                    "Failed to persist processor status"
                );
                Err(e.into())
            }
        }
    }

    /// Transaction flipped to paid, or None when it cannot be. A failed read
    /// is returned so the payment stays pending and the next check retries.
    async fn paid_transaction(&self, transaction_id: Uuid) -> DomainResult<Option<Transaction>> {
        let transaction = self
            .transactions
            .find_by_id(transaction_id)
            .await
            .inspect_err(|e| {
                error!(%transaction_id, error = %e, "Failed to load transaction for settlement");
            })?;

        let Some(mut transaction) = transaction else {
            error!(%transaction_id, "Payment settled for a missing transaction");
            return Ok(None);
        };

        match transaction.mark_as_paid() {
            Ok(()) => Ok(Some(transaction)),
            Err(e) => {
                error!(%transaction_id, error = %e, "Payment settled but transaction cannot be marked paid");
                Ok(None)
            }
        }
    }

    async fn expire_payment(&self, payment: &mut Payment) -> DomainResult<()> {
        payment.mark_as_expired()?;
        self.payments
            .update_payment(payment, PaymentStatus::Pending)
            .await?;
        info!(transaction_id = %payment.transaction_id, payment_id = %payment.id, "Payment expired");
        Ok(())
    }

    /// Returns the payment that won a concurrent insert, waiting briefly for its QR code
    async fn reconcile_conflict(&self, transaction_id: Uuid) -> DomainResult<PaymentResponse> {
        for attempt in 1..=CONFLICT_READ_ATTEMPTS {
            if let Some(winner) = self.payments.find_latest_by_transaction(transaction_id).await? {
                if winner.status.is_active() {
                    if let Some(qr_code) = self.payments.find_qr_code_by_payment(winner.id).await? {
                        debug!(%transaction_id, payment_id = %winner.id, attempt, "Reconciled with concurrent payment");
                        return Ok(PaymentResponse::from_parts(&winner, Some(&qr_code)));
                    }
                }
            }
            tokio::time::sleep(CONFLICT_READ_BACKOFF).await;
        }

        error!(%transaction_id, "Concurrent payment vanished before its QR code was stored");
        Err(DomainError::PaymentNotFound(transaction_id.to_string()))
    }

    async fn cancel_orphan_charge(&self, order_reference: &str) {
        if let Err(e) = self
            .call_gateway(self.gateway.cancel_charge(order_reference))
            .await
        {
            warn!(%order_reference, error = %e, "Failed to cancel unused charge");
        }
    }

    async fn build_charge_request(
        &self,
        transaction: &Transaction,
        order_reference: String,
        expiry_minutes: i64,
    ) -> DomainResult<ChargeRequest> {
        let items = charge_items(transaction);
        let items_total: Money = items.iter().map(ChargeItem::total).sum();

        if items_total != transaction.total_amount {
            error!(
                transaction_id = %transaction.id,
                %items_total,
                total = %transaction.total_amount,
                "Charge items do not add up to the transaction total"
            );
            return Err(DomainError::InvalidAmount(format!(
                "Items sum to {} but transaction total is {}",
                items_total, transaction.total_amount
            )));
        }

        let customer = self.transactions.find_customer(transaction.owner_id).await?;

        Ok(ChargeRequest {
            order_reference,
            gross_amount: transaction.total_amount,
            items,
            customer,
            expiry_minutes,
        })
    }

    async fn load_transaction(&self, transaction_id: Uuid) -> DomainResult<Transaction> {
        self.transactions
            .find_by_id(transaction_id)
            .await?
            .ok_or_else(|| DomainError::TransactionNotFound(transaction_id.to_string()))
    }

    async fn load_payment(&self, transaction_id: Uuid) -> DomainResult<Payment> {
        self.payments
            .find_latest_by_transaction(transaction_id)
            .await?
            .ok_or_else(|| DomainError::PaymentNotFound(transaction_id.to_string()))
    }

    async fn reload(&self, payment: &Payment) -> DomainResult<Payment> {
        self.payments
            .find_by_id(payment.id)
            .await?
            .ok_or_else(|| DomainError::PaymentNotFound(payment.transaction_id.to_string()))
    }

    async fn call_gateway<R>(&self, call: impl Future<Output = GatewayResult<R>>) -> GatewayResult<R> {
        tokio::time::timeout(self.settings.gateway_timeout, call)
            .await
            .unwrap_or(Err(GatewayError::Timeout))
    }
}

/// Processor line items: one per cart line, plus tax and discount pseudo-lines
pub(crate) fn charge_items(transaction: &Transaction) -> Vec<ChargeItem> {
    let mut items: Vec<ChargeItem> = transaction
        .items
        .iter()
        .map(|item| ChargeItem {
            id: item.product_id.to_string(),
            name: item.product_name.clone(),
            price: item.unit_price,
            quantity: item.quantity,
        })
        .collect();

    if transaction.tax_amount.is_positive() {
        items.push(ChargeItem {
            id: "TAX".to_string(),
            name: "Tax".to_string(),
            price: transaction.tax_amount,
            quantity: 1,
        });
    }

    if transaction.discount.is_positive() {
        items.push(ChargeItem {
            id: "DISCOUNT".to_string(),
            name: "Discount".to_string(),
            price: -transaction.discount,
            quantity: 1,
        });
    }

    items
}

/// `qris-{8 chars of the transaction id}-{unix seconds}-{4 hex}`, at most 34 characters
pub(crate) fn build_order_reference(transaction_id: Uuid, now: DateTime<Utc>) -> String {
    let short_id: String = transaction_id.simple().to_string().chars().take(8).collect();
    format!("qris-{}-{}-{:04x}", short_id, now.timestamp(), rand::random::<u16>())
}
