pub mod midtrans_adapter;
pub mod postgres_payment_repository;
pub mod postgres_transaction_repository;

pub use midtrans_adapter::MidtransAdapter;
pub use postgres_payment_repository::PgPaymentRepository;
pub use postgres_transaction_repository::PgTransactionRepository;
