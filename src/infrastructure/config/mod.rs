pub mod app_config;
pub mod midtrans_config;

pub use app_config::AppConfig;
pub use midtrans_config::{MidtransConfig, MidtransEnvironment};
