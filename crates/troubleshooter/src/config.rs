use std::time::Duration;

use crate::error::AppError;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Application configuration loaded explicitly from environment variables.
///
/// The issue store is optional: without a database URL the server still answers
/// troubleshooting requests and reports 503 for issue endpoints.
#[derive(Debug, Clone)]
pub struct Config {
    /// `redis://...` for the Redis document store, `memory://` for a process-local store.
    pub database_url: Option<String>,
    /// Namespace for stored collections. Required by the Redis backend.
    pub database_name: Option<String>,
    pub host: String,
    pub port: u16,
    /// Upper bound on handling a single HTTP request.
    pub request_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Optional:
    /// - `DATABASE_URL`: store connection string (omit to run without issue storage)
    /// - `DATABASE_NAME`: store namespace
    /// - `HOST` (default: "0.0.0.0")
    /// - `PORT` (default: 8000)
    /// - `REQUEST_TIMEOUT_SECS` (default: 30)
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match non_empty("PORT") {
            Some(raw) => raw.trim().parse::<u16>().map_err(|_| {
                AppError::Config(format!("PORT must be a port number, got {raw:?}"))
            })?,
            None => DEFAULT_PORT,
        };

        let request_timeout = match non_empty("REQUEST_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|&secs| secs > 0)
                .map(Duration::from_secs)
                .ok_or_else(|| {
                    AppError::Config(format!(
                        "REQUEST_TIMEOUT_SECS must be a positive integer, got {raw:?}"
                    ))
                })?,
            None => Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        };

        Ok(Self {
            database_url: non_empty("DATABASE_URL"),
            database_name: non_empty("DATABASE_NAME"),
            host: non_empty("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
            request_timeout,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
