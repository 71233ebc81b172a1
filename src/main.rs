mod api;
mod application;
mod domain;
mod infrastructure;
mod ports;
#[cfg(test)]
mod test_support;

use anyhow::Context;
use api::AppState;
use application::{CartService, ExpirySweeper, PaymentService};
use infrastructure::{AppConfig, MidtransAdapter, PgPaymentRepository, PgTransactionRepository};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // RUST_LOG wins over LOG_LEVEL
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("Starting QRIS payment service...");

    let config = AppConfig::from_env()?;
    info!(
        environment = %config.midtrans.environment,
        base_url = %config.midtrans.base_url,
        client_key_configured = config.midtrans.client_key.is_some(),
        "Configuration loaded"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to database")?;
    info!("Database connected successfully");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to run migrations")?;

    let pool = Arc::new(pool);
    let gateway = Arc::new(MidtransAdapter::new(Arc::new(config.midtrans.clone()))?);
    let payments = Arc::new(PgPaymentRepository::new(pool.clone()));
    let transactions = Arc::new(PgTransactionRepository::new(pool));

    let payment_service = Arc::new(PaymentService::new(
        gateway,
        payments.clone(),
        transactions.clone(),
        config.payment.clone(),
    ));
    let cart_service = Arc::new(CartService::new(
        transactions.clone(),
        transactions,
        payments,
    ));

    let shutdown = CancellationToken::new();
    let sweeper = if config.expiry_sweep_interval.is_zero() {
        info!("Expiry sweeper disabled");
        None
    } else {
        let sweeper = Arc::new(ExpirySweeper::new(
            payment_service.clone(),
            config.expiry_sweep_interval,
        ));
        Some(sweeper.start(shutdown.clone()))
    };

    let app = api::create_router(AppState {
        payment_service,
        cart_service,
    });

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(%addr, "Server listening");

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
            signal.cancel();
        })
        .await?;

    shutdown.cancel();
    if let Some(handle) = sweeper {
        handle.await?;
    }

    info!("Server stopped");
    Ok(())
}
