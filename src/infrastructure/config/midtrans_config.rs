use crate::domain::errors::{DomainError, DomainResult};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

const SANDBOX_BASE_URL: &str = "https://api.sandbox.midtrans.com";
const PRODUCTION_BASE_URL: &str = "https://api.midtrans.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidtransEnvironment {
    Sandbox,
    Production,
}

impl MidtransEnvironment {
    pub fn base_url(&self) -> &'static str {
        match self {
            MidtransEnvironment::Sandbox => SANDBOX_BASE_URL,
            MidtransEnvironment::Production => PRODUCTION_BASE_URL,
        }
    }
}

impl fmt::Display for MidtransEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MidtransEnvironment::Sandbox => write!(f, "sandbox"),
            MidtransEnvironment::Production => write!(f, "production"),
        }
    }
}

impl FromStr for MidtransEnvironment {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sandbox" | "" => Ok(MidtransEnvironment::Sandbox),
            "production" => Ok(MidtransEnvironment::Production),
            other => Err(DomainError::ConfigurationError(format!(
                "Unknown MIDTRANS_ENVIRONMENT: {}",
                other
            ))),
        }
    }
}

/// Midtrans Core API configuration
#[derive(Clone)]
pub struct MidtransConfig {
    /// Used for Basic auth and notification signatures
    pub server_key: String,

    /// Not needed server side; kept for clients that render Snap
    pub client_key: Option<String>,

    pub environment: MidtransEnvironment,

    pub base_url: String,

    /// QRIS acquirer, e.g. `gopay`; processor default when unset
    pub acquirer: Option<String>,

    pub timeout: Duration,
}

impl fmt::Debug for MidtransConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MidtransConfig")
            .field("server_key", &"***")
            .field("environment", &self.environment)
            .field("base_url", &self.base_url)
            .field("acquirer", &self.acquirer)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl MidtransConfig {
    pub fn new(server_key: impl Into<String>, environment: MidtransEnvironment) -> Self {
        Self {
            server_key: server_key.into(),
            client_key: None,
            environment,
            base_url: environment.base_url().to_string(),
            acquirer: None,
            timeout: Duration::from_secs(15),
        }
    }

    pub fn from_env() -> DomainResult<Self> {
        let server_key = std::env::var("MIDTRANS_SERVER_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                DomainError::ConfigurationError("MIDTRANS_SERVER_KEY must be set".to_string())
            })?;

        let environment = std::env::var("MIDTRANS_ENVIRONMENT")
            .unwrap_or_default()
            .parse::<MidtransEnvironment>()?;

        let mut config = Self::new(server_key, environment);
        config.client_key = std::env::var("MIDTRANS_CLIENT_KEY").ok().filter(|k| !k.is_empty());
        config.acquirer = std::env::var("MIDTRANS_QRIS_ACQUIRER")
            .ok()
            .filter(|a| !a.is_empty());
        if let Some(base_url) = std::env::var("MIDTRANS_BASE_URL").ok().filter(|u| !u.is_empty()) {
            config.base_url = base_url.trim_end_matches('/').to_string();
        }

        Ok(config)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
