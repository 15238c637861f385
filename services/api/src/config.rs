//! Server configuration

use std::net::SocketAddr;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Upper bound for `APP_ORDER_RETENTION_DAYS`
pub const MAX_ORDER_RETENTION_DAYS: i64 = 36_500;

/// Runtime settings read from `APP_*` environment variables
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ServerConfig {
    /// `APP_HOST`
    pub host: String,
    /// `APP_PORT`
    pub port: u16,
    /// `APP_RETENTION_SCHEDULE`, six-field cron expression
    pub retention_schedule: String,
    /// `APP_ORDER_RETENTION_DAYS`, age after which soft-deleted orders are purged
    pub order_retention_days: i64,
}

impl ServerConfig {
    /// Load configuration, falling back to defaults for unset variables
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .set_default("host", "0.0.0.0")?
            .set_default("port", 8080)?
            .set_default("retention_schedule", "0 0 * * * *")?
            .set_default("order_retention_days", 5)?
            .add_source(config::Environment::with_prefix("APP").try_parsing(true))
            .build()?;

        let server_config: ServerConfig = config
            .try_deserialize()
            .context("Invalid APP_* configuration")?;

        if !(0..=MAX_ORDER_RETENTION_DAYS).contains(&server_config.order_retention_days) {
            anyhow::bail!(
                "APP_ORDER_RETENTION_DAYS must be between 0 and {}",
                MAX_ORDER_RETENTION_DAYS
            );
        }

        Ok(server_config)
    }

    /// Address to bind the listener to
    pub fn bind_address(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid listen address {}:{}", self.host, self.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    const VARS: [&str; 4] = [
        "APP_HOST",
        "APP_PORT",
        "APP_RETENTION_SCHEDULE",
        "APP_ORDER_RETENTION_DAYS",
    ];

    fn clear() {
        for var in VARS {
            unsafe {
                env::remove_var(var);
            }
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear();

        let config = ServerConfig::load().unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.retention_schedule, "0 0 * * * *");
        assert_eq!(config.order_retention_days, 5);
        assert_eq!(config.bind_address().unwrap().port(), 8080);
    }

    #[test]
    #[serial]
    fn test_environment_overrides() {
        clear();
        unsafe {
            env::set_var("APP_HOST", "127.0.0.1");
            env::set_var("APP_PORT", "9090");
            env::set_var("APP_ORDER_RETENTION_DAYS", "30");
        }

        let config = ServerConfig::load().unwrap();
        assert_eq!(config.bind_address().unwrap().to_string(), "127.0.0.1:9090");
        assert_eq!(config.order_retention_days, 30);

        clear();
    }

    #[test]
    #[serial]
    fn test_negative_retention_is_rejected() {
        clear();
        unsafe {
            env::set_var("APP_ORDER_RETENTION_DAYS", "-1");
        }

        assert!(ServerConfig::load().is_err());

        clear();
    }

    #[test]
    #[serial]
    fn test_oversized_retention_is_rejected() {
        clear();
        unsafe {
            env::set_var("APP_ORDER_RETENTION_DAYS", i64::MAX.to_string());
        }
        assert!(ServerConfig::load().is_err());

        unsafe {
            env::set_var(
                "APP_ORDER_RETENTION_DAYS",
                MAX_ORDER_RETENTION_DAYS.to_string(),
            );
        }
        assert_eq!(
            ServerConfig::load().unwrap().order_retention_days,
            MAX_ORDER_RETENTION_DAYS
        );

        clear();
    }
}
