pub mod payment_gateway_port;
pub mod payment_repository_port;
pub mod transaction_repository_port;

pub use payment_gateway_port::PaymentGatewayPort;
pub use payment_repository_port::PaymentRepositoryPort;
pub use transaction_repository_port::{
    ProductCatalogPort, TransactionFilter, TransactionRepositoryPort,
};
