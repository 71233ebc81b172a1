pub mod adapters;
pub mod config;

pub use adapters::{MidtransAdapter, PgPaymentRepository, PgTransactionRepository};
pub use config::{AppConfig, MidtransConfig};
