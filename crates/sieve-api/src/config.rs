//! Server configuration from the environment.

use axum::http::HeaderValue;
use tracing::warn;

use sieve_core::defaults::{DATABASE_URL, SERVER_PORT};

const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Origins allowed by CORS.
    pub allowed_origins: Vec<String>,
    pub log_format: LogFormat,
    /// Daily-rotated log file; stdout when unset.
    pub log_file: Option<String>,
    /// ANSI colour override; auto-detected when unset.
    pub log_ansi: Option<bool>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: SERVER_PORT,
            database_url: DATABASE_URL.to_string(),
            allowed_origins: split_origins(DEFAULT_ALLOWED_ORIGINS),
            log_format: LogFormat::Text,
            log_file: None,
            log_ansi: None,
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `HOST` | `0.0.0.0` | Bind address |
    /// | `PORT` | `3000` | Bind port |
    /// | `DATABASE_URL` | `sqlite://sieve.db?mode=rwc` | SQLite database |
    /// | `ALLOWED_ORIGINS` | `http://localhost:3000` | Comma-separated CORS origins |
    /// | `LOG_FORMAT` | `text` | `text` or `json` |
    /// | `LOG_FILE` | unset | Log file path (enables daily rotation) |
    /// | `LOG_ANSI` | auto | Force ANSI colours on or off |
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let port = std::env::var("PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(defaults.port);

        let allowed_origins = std::env::var("ALLOWED_ORIGINS")
            .ok()
            .map(|v| split_origins(&v))
            .filter(|o| !o.is_empty())
            .unwrap_or(defaults.allowed_origins);

        let log_format = match std::env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };

        Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port,
            database_url: std::env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            allowed_origins,
            log_format,
            log_file: std::env::var("LOG_FILE").ok().filter(|v| !v.is_empty()),
            log_ansi: std::env::var("LOG_ANSI")
                .ok()
                .map(|v| v == "true" || v == "1"),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Allowed origins as header values, skipping any that do not parse.
    pub fn origin_headers(&self) -> Vec<HeaderValue> {
        self.allowed_origins
            .iter()
            .filter_map(|origin| match origin.parse::<HeaderValue>() {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!(origin = %origin, error = %e, "Invalid CORS origin");
                    None
                }
            })
            .collect()
    }
}

fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
