pub mod cart_service;
pub mod dto;
pub mod expiry_sweeper;
pub mod payment_service;

pub use cart_service::CartService;
pub use dto::*;
pub use expiry_sweeper::ExpirySweeper;
pub use payment_service::{PaymentService, PaymentSettings};
