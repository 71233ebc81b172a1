use crate::application::PaymentSettings;
use crate::domain::errors::{DomainError, DomainResult};
use crate::infrastructure::config::midtrans_config::MidtransConfig;
use std::str::FromStr;
use std::time::Duration;

/// Service configuration loaded from the environment
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub server_host: String,
    pub server_port: u16,
    pub payment: PaymentSettings,
    /// Zero disables the sweeper
    pub expiry_sweep_interval: Duration,
    pub midtrans: MidtransConfig,
}

impl AppConfig {
    pub fn from_env() -> DomainResult<Self> {
        let database_url = required("DATABASE_URL")?;
        let gateway_timeout = Duration::from_secs(parse_or("PAYMENT_GATEWAY_TIMEOUT_SECS", 15)?);

        let default_expiry_minutes: i64 = parse_or("PAYMENT_DEFAULT_EXPIRY_MINUTES", 10)?;
        if default_expiry_minutes <= 0 {
            return Err(DomainError::ConfigurationError(
                "PAYMENT_DEFAULT_EXPIRY_MINUTES must be positive".to_string(),
            ));
        }

        Ok(Self {
            database_url,
            db_max_connections: parse_or("DB_MAX_CONNECTIONS", 10)?,
            server_host: std::env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: parse_or("SERVER_PORT", 8080)?,
            payment: PaymentSettings {
                default_expiry_minutes,
                gateway_timeout,
            },
            expiry_sweep_interval: Duration::from_secs(parse_or(
                "PAYMENT_EXPIRY_SWEEP_INTERVAL_SECS",
                60,
            )?),
            midtrans: MidtransConfig::from_env()?.with_timeout(gateway_timeout),
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

fn required(key: &str) -> DomainResult<String> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| DomainError::ConfigurationError(format!("{} must be set", key)))
}

fn parse_or<V: FromStr>(key: &str, default: V) -> DomainResult<V> {
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw.trim().parse().map_err(|_| {
            DomainError::ConfigurationError(format!("{} has an invalid value: {}", key, raw))
        }),
        _ => Ok(default),
    }
}
