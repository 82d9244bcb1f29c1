//! Environment-driven configuration.

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use secrecy::SecretString;

use crate::error::ConfigError;

/// SMTP transport settings for outbound notifications.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
}

impl SmtpConfig {
    /// Load from `SMTP_*` environment variables. Returns `None` when
    /// `SMTP_HOST` is unset, in which case notifications are logged but
    /// not sent.
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        let host = match env::var("SMTP_HOST") {
            Ok(h) if !h.trim().is_empty() => h,
            _ => return Ok(None),
        };
        let port = match env::var("SMTP_PORT") {
            Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: "SMTP_PORT".to_string(),
                message: format!("not a valid port number: {raw}"),
            })?,
            Err(_) => 587,
        };
        let username = env::var("SMTP_USERNAME")
            .map_err(|_| ConfigError::MissingEnvVar("SMTP_USERNAME".to_string()))?;
        let password = env::var("SMTP_PASSWORD")
            .map_err(|_| ConfigError::MissingEnvVar("SMTP_PASSWORD".to_string()))?;
        let from_address = env::var("SMTP_FROM").unwrap_or_else(|_| username.clone());

        Ok(Some(Self {
            host,
            port,
            username,
            password: SecretString::from(password),
            from_address,
        }))
    }
}

/// Top-level service configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub bind_addr: SocketAddr,
    /// Delay between polls while waiting for a review decision.
    pub poll_interval: Duration,
    /// Upper bound on the whole wait before reporting the current state.
    pub poll_ceiling: Duration,
    /// Used when no policy document is stored yet.
    pub default_auto_approve_limit: Decimal,
    pub smtp: Option<SmtpConfig>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".parse().unwrap_or_else(|_| {
                SocketAddr::from(([127, 0, 0, 1], 8080))
            }),
            poll_interval: Duration::from_secs(1),
            poll_ceiling: Duration::from_secs(30),
            default_auto_approve_limit: dec!(500.00),
            smtp: None,
        }
    }
}

impl OrchestratorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(raw) = env::var("BIND_ADDR") {
            config.bind_addr = raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: "BIND_ADDR".to_string(),
                message: format!("not a valid socket address: {raw}"),
            })?;
        }
        if let Ok(raw) = env::var("REVIEW_POLL_INTERVAL_SECS") {
            let secs: u64 = raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: "REVIEW_POLL_INTERVAL_SECS".to_string(),
                message: format!("not a valid number of seconds: {raw}"),
            })?;
            config.poll_interval = Duration::from_secs(secs.max(1));
        }
        if let Ok(raw) = env::var("REVIEW_POLL_CEILING_SECS") {
            let secs: u64 = raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: "REVIEW_POLL_CEILING_SECS".to_string(),
                message: format!("not a valid number of seconds: {raw}"),
            })?;
            config.poll_ceiling = Duration::from_secs(secs);
        }
        if let Ok(raw) = env::var("AUTO_APPROVE_LIMIT") {
            config.default_auto_approve_limit =
                raw.parse().map_err(|_| ConfigError::InvalidValue {
                    key: "AUTO_APPROVE_LIMIT".to_string(),
                    message: format!("not a valid amount: {raw}"),
                })?;
        }
        config.smtp = SmtpConfig::from_env()?;

        Ok(config)
    }
}
