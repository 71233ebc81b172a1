use crate::application::{
    AddItemRequest, ApplyDiscountRequest, ApplyTaxRequest, CartService, CreateTransactionRequest,
    ErrorResponse, GenerateCodeRequest, ListTransactionsQuery, PaymentService, UpdateItemRequest,
};
use crate::domain::errors::DomainError;
use crate::domain::TaxRate;
use crate::infrastructure::{MidtransAdapter, PgPaymentRepository, PgTransactionRepository};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

pub type AppPaymentService =
    PaymentService<MidtransAdapter, PgPaymentRepository, PgTransactionRepository>;
pub type AppCartService =
    CartService<PgTransactionRepository, PgTransactionRepository, PgPaymentRepository>;

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub payment_service: Arc<AppPaymentService>,
    pub cart_service: Arc<AppCartService>,
}

type ApiResult<T> = Result<T, (StatusCode, Json<ErrorResponse>)>;

/// Maps a domain error to its HTTP status and body
pub fn error_response(e: DomainError) -> (StatusCode, Json<ErrorResponse>) {
    let (status, code) = match &e {
        DomainError::TransactionNotFound(_)
        | DomainError::PaymentNotFound(_)
        | DomainError::ProductNotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        DomainError::ValidationError(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
        DomainError::InvalidState { .. } => (StatusCode::BAD_REQUEST, "INVALID_STATE"),
        DomainError::InvalidAmount(_) => (StatusCode::BAD_REQUEST, "INVALID_AMOUNT"),
        DomainError::PaymentGenerationFailed(_) | DomainError::Gateway(_) => {
            (StatusCode::BAD_GATEWAY, "GATEWAY_ERROR")
        }
        DomainError::Repository(_) | DomainError::ConfigurationError(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
        }
    };

    let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!(error = %e, "Request failed");
        "Internal server error".to_string()
    } else {
        warn!(error = %e, status = status.as_u16(), "Request rejected");
        e.to_string()
    };

    (status, Json(ErrorResponse::new(code, message)))
}

/// Generate or return the QR code of a transaction
pub async fn generate_qris(
    State(state): State<AppState>,
    Json(request): Json<GenerateCodeRequest>,
) -> ApiResult<impl IntoResponse> {
    info!(transaction_id = %request.transaction_id, "Received QR generation request");

    state
        .payment_service
        .generate_code(request)
        .await
        .map(|response| (StatusCode::CREATED, Json(response)))
        .map_err(error_response)
}

pub async fn payment_status(
    State(state): State<AppState>,
    Path(transaction_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    state
        .payment_service
        .get_status(transaction_id)
        .await
        .map(Json)
        .map_err(error_response)
}

pub async fn refresh_qris(
    State(state): State<AppState>,
    Path(transaction_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    info!(%transaction_id, "Received QR refresh request");

    state
        .payment_service
        .refresh_code(transaction_id)
        .await
        .map(Json)
        .map_err(error_response)
}

pub async fn cancel_payment(
    State(state): State<AppState>,
    Path(transaction_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    info!(%transaction_id, "Received payment cancel request");

    state
        .payment_service
        .cancel_payment(transaction_id)
        .await
        .map(Json)
        .map_err(error_response)
}

/// Midtrans HTTP notification. Anything that authenticates is acknowledged
/// with 200 so the processor stops retrying; processing failures are logged.
pub async fn midtrans_webhook(State(state): State<AppState>, body: String) -> ApiResult<impl IntoResponse> {
    let notification = state
        .payment_service
        .parse_notification(&body)
        .map_err(|e| {
            warn!(error = %e, "Rejected Midtrans notification");
            (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("INVALID_NOTIFICATION", e.to_string())),
            )
        })?;

    let order_reference = notification.order_reference.clone();
    match state.payment_service.handle_notification(notification).await {
        Ok(status) => info!(%order_reference, %status, "Midtrans notification processed"),
        Err(e) => error!(%order_reference, error = %e, "Failed to process Midtrans notification"),
    }

    Ok((StatusCode::OK, Json(serde_json::json!({ "status": "ok" }))))
}

pub async fn create_transaction(
    State(state): State<AppState>,
    Json(request): Json<CreateTransactionRequest>,
) -> ApiResult<impl IntoResponse> {
    state
        .cart_service
        .create_transaction(request.owner_id, request.notes)
        .await
        .map(|transaction| (StatusCode::CREATED, Json(transaction)))
        .map_err(error_response)
}

pub async fn get_transaction(
    State(state): State<AppState>,
    Path(transaction_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    state
        .cart_service
        .get_transaction(transaction_id)
        .await
        .map(Json)
        .map_err(error_response)
}

pub async fn list_transactions(
    State(state): State<AppState>,
    Query(query): Query<ListTransactionsQuery>,
) -> ApiResult<impl IntoResponse> {
    state
        .cart_service
        .list_transactions(query.into_filter())
        .await
        .map(Json)
        .map_err(error_response)
}

pub async fn add_item(
    State(state): State<AppState>,
    Path(transaction_id): Path<Uuid>,
    Json(request): Json<AddItemRequest>,
) -> ApiResult<impl IntoResponse> {
    state
        .cart_service
        .add_item(transaction_id, request.product_id, request.quantity)
        .await
        .map(Json)
        .map_err(error_response)
}

pub async fn update_item(
    State(state): State<AppState>,
    Path((transaction_id, product_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<UpdateItemRequest>,
) -> ApiResult<impl IntoResponse> {
    state
        .cart_service
        .update_item_quantity(transaction_id, product_id, request.quantity)
        .await
        .map(Json)
        .map_err(error_response)
}

pub async fn remove_item(
    State(state): State<AppState>,
    Path((transaction_id, product_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<impl IntoResponse> {
    state
        .cart_service
        .remove_item(transaction_id, product_id)
        .await
        .map(Json)
        .map_err(error_response)
}

pub async fn apply_discount(
    State(state): State<AppState>,
    Path(transaction_id): Path<Uuid>,
    Json(request): Json<ApplyDiscountRequest>,
) -> ApiResult<impl IntoResponse> {
    state
        .cart_service
        .apply_discount(transaction_id, request.amount)
        .await
        .map(Json)
        .map_err(error_response)
}

pub async fn apply_tax(
    State(state): State<AppState>,
    Path(transaction_id): Path<Uuid>,
    Json(request): Json<ApplyTaxRequest>,
) -> ApiResult<impl IntoResponse> {
    state
        .cart_service
        .apply_tax(transaction_id, TaxRate::from_bps(request.rate_bps))
        .await
        .map(Json)
        .map_err(error_response)
}

pub async fn cancel_transaction(
    State(state): State<AppState>,
    Path(transaction_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    state
        .cart_service
        .cancel_transaction(transaction_id)
        .await
        .map(Json)
        .map_err(error_response)
}

pub async fn expire_transaction(
    State(state): State<AppState>,
    Path(transaction_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    state
        .cart_service
        .expire_transaction(transaction_id)
        .await
        .map(Json)
        .map_err(error_response)
}

pub async fn delete_transaction(
    State(state): State<AppState>,
    Path(transaction_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    state
        .cart_service
        .delete_transaction(transaction_id)
        .await
        .map(|()| StatusCode::NO_CONTENT)
        .map_err(error_response)
}

/// Health check
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}
