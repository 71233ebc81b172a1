//! Periodic expiry sweep
//!
//! Marks pending payments whose QR code has lapsed as expired, so the
//! active slot is released even when nobody polls for the status.

use crate::application::payment_service::PaymentService;
use crate::ports::{PaymentGatewayPort, PaymentRepositoryPort, TransactionRepositoryPort};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

const SWEEP_BATCH_SIZE: i64 = 100;

pub struct ExpirySweeper<G: PaymentGatewayPort, P: PaymentRepositoryPort, T: TransactionRepositoryPort>
{
    payment_service: Arc<PaymentService<G, P, T>>,
    interval: Duration,
}

impl<G, P, T> ExpirySweeper<G, P, T>
where
    G: PaymentGatewayPort + 'static,
    P: PaymentRepositoryPort + 'static,
    T: TransactionRepositoryPort + 'static,
{
    pub fn new(payment_service: Arc<PaymentService<G, P, T>>, interval: Duration) -> Self {
        Self {
            payment_service,
            interval,
        }
    }

    pub fn start(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(interval_secs = self.interval.as_secs(), "Expiry sweeper started");
            let mut ticker = interval(self.interval);

            loop {
                tokio::select! {
                    _ = ticker.tick() => self.sweep().await,
                    _ = shutdown.cancelled() => {
                        info!("Expiry sweeper received shutdown signal");
                        break;
                    }
                }
            }
            info!("Expiry sweeper stopped");
        })
    }

    /// Drains overdue payments batch by batch
    async fn sweep(&self) {
        loop {
            match self
                .payment_service
                .expire_overdue_payments(SWEEP_BATCH_SIZE)
                .await
            {
                Ok(expired) if expired as i64 == SWEEP_BATCH_SIZE => continue,
                Ok(_) => break,
                Err(e) => {
                    error!(error = %e, "Failed to run expiry sweep");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::payment_service::PaymentSettings;
    use crate::domain::{Payment, PaymentStatus};
    use crate::ports::payment_gateway_port::MockPaymentGatewayPort;
    use crate::test_support::InMemoryStore;
    use chrono::Utc;

    #[tokio::test]
    async fn test_sweeper_expires_and_stops_on_shutdown() {
        let store = Arc::new(InMemoryStore::new());
        let transaction = store.seed_transaction(&[(10_000, 1)], 0, 0);
        let payment = Payment::new(
            transaction.id,
            transaction.total_amount,
            "qris-sweep-1".to_string(),
            Utc::now() - chrono::Duration::minutes(1),
        )
        .unwrap();
        store.insert_raw(payment, None);

        let service = Arc::new(PaymentService::new(
            Arc::new(MockPaymentGatewayPort::new()),
            store.clone(),
            store.clone(),
            PaymentSettings::default(),
        ));
        let sweeper = Arc::new(ExpirySweeper::new(service, Duration::from_millis(10)));
        let shutdown = CancellationToken::new();

        let handle = sweeper.start(shutdown.clone());
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();
        handle.await.unwrap();

        assert_eq!(store.payments_for(transaction.id)[0].status, PaymentStatus::Expired);
    }
}
