//! Runtime configuration for the ledger service and its binaries.

use std::env;
use std::time::Duration;

use rust_decimal::Decimal;
use thiserror::Error;

use stockledger_inventory::StockPolicy;
use stockledger_observability::LogFormat;

pub const DATABASE_URL: &str = "DATABASE_URL";
pub const MAX_CONNECTIONS: &str = "STOCKLEDGER_MAX_CONNECTIONS";
pub const CRITICAL_RATIO: &str = "STOCKLEDGER_CRITICAL_RATIO";
pub const EXPIRY_WINDOW_DAYS: &str = "STOCKLEDGER_EXPIRY_WINDOW_DAYS";
pub const LOG_FORMAT: &str = "STOCKLEDGER_LOG_FORMAT";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(key: &'static str, value: &str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Ledger configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerConfig {
    /// Postgres URL; `None` selects the in-memory store.
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub stock_policy: StockPolicy,
    /// Default horizon for `expiring` queries.
    pub expiry_window_days: u32,
    pub log_format: LogFormat,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: 5,
            acquire_timeout: Duration::from_secs(3),
            stock_policy: StockPolicy::default(),
            expiry_window_days: 30,
            log_format: LogFormat::Json,
        }
    }
}

impl LedgerConfig {
    /// Load from the process environment, reading `.env` first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup(DATABASE_URL).filter(|u| !u.trim().is_empty()) {
            config.database_url = Some(url);
        }

        if let Some(raw) = lookup(MAX_CONNECTIONS) {
            let n: u32 = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::invalid(MAX_CONNECTIONS, &raw, "expected a positive integer"))?;
            if n == 0 {
                return Err(ConfigError::invalid(MAX_CONNECTIONS, &raw, "must be at least 1"));
            }
            config.max_connections = n;
        }

        if let Some(raw) = lookup(CRITICAL_RATIO) {
            let ratio: Decimal = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::invalid(CRITICAL_RATIO, &raw, "expected a decimal"))?;
            if ratio < Decimal::ZERO || ratio > Decimal::ONE {
                return Err(ConfigError::invalid(CRITICAL_RATIO, &raw, "must be within 0..=1"));
            }
            config.stock_policy = StockPolicy {
                critical_ratio: ratio,
            };
        }

        if let Some(raw) = lookup(EXPIRY_WINDOW_DAYS) {
            config.expiry_window_days = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::invalid(EXPIRY_WINDOW_DAYS, &raw, "expected a day count"))?;
        }

        if let Some(raw) = lookup(LOG_FORMAT) {
            config.log_format = raw
                .parse()
                .map_err(|reason: String| ConfigError::invalid(LOG_FORMAT, &raw, reason))?;
        }

        Ok(config)
    }

    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn with_stock_policy(mut self, policy: StockPolicy) -> Self {
        self.stock_policy = policy;
        self
    }

    pub fn with_expiry_window_days(mut self, days: u32) -> Self {
        self.expiry_window_days = days;
        self
    }

    pub fn with_log_format(mut self, format: LogFormat) -> Self {
        self.log_format = format;
        self
    }
}
