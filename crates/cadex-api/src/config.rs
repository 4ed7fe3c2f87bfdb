//! Server configuration, read once at startup.

use std::fmt;
use std::net::SocketAddr;

use cadex_story::application::coordinator::{DEFAULT_MAX_ATTEMPTS, RetryPolicy};

use crate::error::AppError;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;

/// Settings for the API server.
#[derive(Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
    /// PostgreSQL URL; the in-memory store is used when absent.
    pub database_url: Option<String>,
    /// Key material for handles and continuation tokens.
    pub secret: String,
    /// Retry bound for atomic story updates.
    pub max_attempts: u32,
    /// OTLP collector endpoint; spans are only logged when absent.
    pub otlp_endpoint: Option<String>,
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database_url", &self.database_url.as_ref().map(|_| "<set>"))
            .field("secret", &"<redacted>")
            .field("max_attempts", &self.max_attempts)
            .field("otlp_endpoint", &self.otlp_endpoint)
            .finish()
    }
}

impl ServerConfig {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a variable is missing or invalid.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable
    /// name to its value.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a variable is missing or invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let host = non_empty("HOST").unwrap_or_else(|| DEFAULT_HOST.to_owned());
        let port = match non_empty("PORT") {
            Some(raw) => raw
                .parse()
                .map_err(|e| AppError::Config(format!("PORT must be a valid u16: {e}")))?,
            None => DEFAULT_PORT,
        };
        let secret = non_empty("CADEX_SECRET").ok_or_else(|| {
            AppError::Config("CADEX_SECRET environment variable must be set".into())
        })?;
        let max_attempts = match non_empty("CADEX_MAX_ATTEMPTS") {
            Some(raw) => raw
                .parse::<u32>()
                .ok()
                .filter(|n| *n >= 1)
                .ok_or_else(|| {
                    AppError::Config(format!(
                        "CADEX_MAX_ATTEMPTS must be a positive integer, got {raw:?}"
                    ))
                })?,
            None => DEFAULT_MAX_ATTEMPTS,
        };

        Ok(Self {
            host,
            port,
            database_url: non_empty("DATABASE_URL"),
            secret,
            max_attempts,
            otlp_endpoint: non_empty("OTEL_EXPORTER_OTLP_ENDPOINT"),
        })
    }

    /// Address to listen on.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `host:port` is not a socket address.
    pub fn socket_addr(&self) -> Result<SocketAddr, AppError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| AppError::Config(format!("invalid HOST:PORT combination: {e}")))
    }

    /// Retry policy for the story coordinator.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
        }
    }
}
