//! Application configuration loaded from environment variables.

use std::time::Duration;

use saga::SagaConfig;

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT` — `text` or `json` (default: `text`)
/// - `DATABASE_URL` — PostgreSQL URL; unset keeps orders in memory
/// - `INVENTORY_SERVICE_URL` — base URL of the inventory service
/// - `INVENTORY_TIMEOUT_MS` — per remote call timeout (default: `3000`)
/// - `STOCK_CONFLICT_RETRIES` — retries after a stock conflict (default: `3`)
/// - `RECONCILE_INTERVAL_SECS` — time between saga sweeps (default: `30`)
/// - `RECONCILE_GRACE_SECS` — age before an open saga is swept (default: `300`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub inventory_url: Option<String>,
    pub call_timeout: Duration,
    pub conflict_retries: usize,
    pub reconcile_interval: Duration,
    pub reconcile_grace: Duration,
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: env_or("PORT", defaults.port),
            log_level: std::env::var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: std::env::var("LOG_FORMAT")
                .map(|v| LogFormat::parse(&v))
                .unwrap_or_default(),
            database_url: non_empty("DATABASE_URL"),
            inventory_url: non_empty("INVENTORY_SERVICE_URL"),
            call_timeout: Duration::from_millis(env_or("INVENTORY_TIMEOUT_MS", 3000)),
            conflict_retries: env_or("STOCK_CONFLICT_RETRIES", defaults.conflict_retries),
            reconcile_interval: Duration::from_secs(env_or("RECONCILE_INTERVAL_SECS", 30)),
            reconcile_grace: Duration::from_secs(env_or("RECONCILE_GRACE_SECS", 300)),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn saga_config(&self) -> SagaConfig {
        SagaConfig::default()
            .with_call_timeout(self.call_timeout)
            .with_conflict_retries(self.conflict_retries)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            inventory_url: None,
            call_timeout: Duration::from_secs(3),
            conflict_retries: 3,
            reconcile_interval: Duration::from_secs(30),
            reconcile_grace: Duration::from_secs(300),
        }
    }
}
