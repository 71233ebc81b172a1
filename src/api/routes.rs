use super::handlers::*;
use axum::{
    routing::{get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub fn create_router(state: AppState) -> Router {
    let transactions = Router::new()
        .route("/", get(list_transactions).post(create_transaction))
        .route("/:id", get(get_transaction).delete(delete_transaction))
        .route("/:id/items", post(add_item))
        .route("/:id/items/:product_id", put(update_item).delete(remove_item))
        .route("/:id/discount", post(apply_discount))
        .route("/:id/tax", post(apply_tax))
        .route("/:id/cancel", post(cancel_transaction))
        .route("/:id/expire", post(expire_transaction));

    let payments = Router::new()
        .route("/qris", post(generate_qris))
        .route("/:transaction_id/status", get(payment_status))
        .route("/:transaction_id/refresh", post(refresh_qris))
        .route("/:transaction_id/cancel", post(cancel_payment));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/transactions", transactions)
        .nest("/api/payments", payments)
        .route("/api/webhooks/midtrans", post(midtrans_webhook))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
