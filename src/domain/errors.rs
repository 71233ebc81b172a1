use sqlx::error::ErrorKind;
use thiserror::Error;

/// Domain layer errors
#[derive(Error, Debug)]
pub enum DomainError {
    /// Input validation failed
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("Payment not found for transaction: {0}")]
    PaymentNotFound(String),

    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Operation not valid for the current status
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// The processor refused or could not be reached while creating a charge
    #[error("Failed to generate payment code: {0}")]
    PaymentGenerationFailed(#[source] GatewayError),

    #[error("Payment gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Storage error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl DomainError {
    pub fn invalid_state(expected: impl Into<String>, actual: impl ToString) -> Self {
        DomainError::InvalidState {
            expected: expected.into(),
            actual: actual.to_string(),
        }
    }
}

/// Domain result type
pub type DomainResult<T> = Result<T, DomainError>;

/// Storage layer errors. Constraint violations are reported as a distinct
/// kind so callers never inspect driver messages.
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Constraint violation: {constraint}")]
    ConstraintViolation { constraint: String },

    /// A compare-and-set update matched no row in the expected status
    #[error("Row changed concurrently")]
    StaleState,

    #[error("Row not found")]
    NotFound,

    #[error("Corrupt row: {0}")]
    CorruptRow(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(error: sqlx::Error) -> Self {
        if matches!(error, sqlx::Error::RowNotFound) {
            return Self::NotFound;
        }

        match error.as_database_error() {
            Some(db_error) if matches!(db_error.kind(), ErrorKind::UniqueViolation) => {
                Self::ConstraintViolation {
                    constraint: db_error.constraint().unwrap_or_default().to_string(),
                }
            }
            _ => Self::Database(error),
        }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Errors raised at the payment processor boundary
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// The processor answered but refused the request
    #[error("Processor rejected request ({status_code}): {message}")]
    Rejected { status_code: String, message: String },

    #[error("Invalid processor response: {0}")]
    InvalidResponse(String),

    #[error("Notification signature mismatch")]
    InvalidSignature,

    #[error("Processor call timed out")]
    Timeout,
}
