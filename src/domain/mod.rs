pub mod entities;
pub mod errors;
pub mod transaction;
pub mod value_objects;

pub use entities::{Payment, QrCode};
pub use errors::{DomainError, DomainResult, GatewayError, RepositoryError, RepositoryResult};
pub use transaction::{Customer, LineItem, Product, Transaction};
pub use value_objects::{Money, PaymentMethod, PaymentStatus, TaxRate, TransactionStatus};
