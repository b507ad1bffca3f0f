// Relay server configuration.
//
// Centralizes environment variable parsing with defaults for local
// development.

use std::{net::SocketAddr, path::PathBuf, time::Duration};

use thiserror::Error;

const DEV_JWT_SECRET: &str = "beacon_local_development_jwt_secret_must_be_32_chars";

/// Core relay server configuration.
///
/// Constructed via [`RelayConfig::from_env`] which reads environment
/// variables and falls back to development defaults.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Listen address (host:port).
    pub listen_addr: SocketAddr,
    /// JWT signing secret for access tokens.
    pub jwt_secret: String,
    /// Idle time after which a user is considered offline.
    pub offline_timeout: Duration,
    /// Period of the presence sweep, independent of `offline_timeout`.
    pub sweep_interval: Duration,
    /// Capacity of the idle-user queue between the sweep and the eviction worker.
    pub idle_queue_capacity: usize,
    /// Capacity of each websocket connection's outbox.
    pub outbox_capacity: usize,
    /// Root directory holding one working directory per signed-in user.
    pub data_dir: PathBuf,
    /// Comma-separated CORS origins (or `"*"` for any).
    pub cors_origins: Option<String>,
    /// Log filter directive (e.g. `info`, `beacon_relay=debug`).
    pub log_filter: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("jwt secret must be at least 32 characters long")]
    ShortJwtSecret,
}

impl RelayConfig {
    /// Parse configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `BEACON_HOST` | `0.0.0.0` |
    /// | `BEACON_PORT` | `1323` |
    /// | `BEACON_JWT_SECRET` | dev-only placeholder |
    /// | `BEACON_OFFLINE_TIMEOUT_SECS` | `1800` |
    /// | `BEACON_SWEEP_INTERVAL_SECS` | `5` |
    /// | `BEACON_IDLE_QUEUE_CAPACITY` | `4096` |
    /// | `BEACON_OUTBOX_CAPACITY` | `1024` |
    /// | `BEACON_DATA_DIR` | `./data/user-space` |
    /// | `BEACON_CORS_ORIGINS` | *(none, cors.rs uses dev defaults)* |
    /// | `BEACON_LOG_FILTER` | `info` |
    pub fn from_env() -> Self {
        Self::from_env_fn(|key| std::env::var(key))
    }

    /// Testable constructor that accepts an environment lookup function.
    fn from_env_fn<F>(env: F) -> Self
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let parsed = |key: &str| env(key).ok().and_then(|v| v.trim().parse::<u64>().ok());

        let host = env("BEACON_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 =
            env("BEACON_PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(1323);
        let listen_addr = format!("{host}:{port}")
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], port)));

        let jwt_secret = env("BEACON_JWT_SECRET").unwrap_or_else(|_| DEV_JWT_SECRET.into());

        let offline_timeout =
            Duration::from_secs(parsed("BEACON_OFFLINE_TIMEOUT_SECS").unwrap_or(1800));
        let sweep_interval =
            Duration::from_secs(parsed("BEACON_SWEEP_INTERVAL_SECS").unwrap_or(5));
        let idle_queue_capacity =
            parsed("BEACON_IDLE_QUEUE_CAPACITY").map(|v| v as usize).unwrap_or(4096);
        let outbox_capacity =
            parsed("BEACON_OUTBOX_CAPACITY").map(|v| v as usize).unwrap_or(1024);

        let data_dir = env("BEACON_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data/user-space"));
        let cors_origins = env("BEACON_CORS_ORIGINS").ok();
        let log_filter = env("BEACON_LOG_FILTER").unwrap_or_else(|_| "info".into());

        Self {
            listen_addr,
            jwt_secret,
            offline_timeout,
            sweep_interval,
            idle_queue_capacity,
            outbox_capacity,
            data_dir,
            cors_origins,
            log_filter,
        }
    }

    /// Reject values the relay cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt_secret.len() < 32 {
            return Err(ConfigError::ShortJwtSecret);
        }
        if self.offline_timeout.is_zero() {
            return Err(ConfigError::Zero("offline timeout"));
        }
        if self.sweep_interval.is_zero() {
            return Err(ConfigError::Zero("sweep interval"));
        }
        if self.idle_queue_capacity == 0 {
            return Err(ConfigError::Zero("idle queue capacity"));
        }
        if self.outbox_capacity == 0 {
            return Err(ConfigError::Zero("outbox capacity"));
        }
        Ok(())
    }

    /// Returns true when using the development-only JWT secret.
    pub fn is_dev_jwt_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }
}
