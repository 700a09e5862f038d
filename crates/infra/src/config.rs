//! Configuration loading and representation.
//!
//! All settings come from the environment; every one of them has a
//! development default so a bare `cargo run` starts a working (in-memory)
//! service.

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

/// Process configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP bind address.
    pub bind_addr: String,
    /// Postgres connection string; in-memory storage when absent.
    pub database_url: Option<String>,
    /// API key for the image provider.
    pub openai_api_key: String,
    /// Provider endpoint override (tests, proxies).
    pub openai_base_url: String,
    /// Root directory for stored-file edit sources.
    pub file_store_root: PathBuf,
    /// Opening grant for new accounts, in images at default quality/size.
    pub initial_credits: i64,
    /// Submissions allowed per account per window.
    pub rate_limit: u32,
    /// Rate-limit window.
    pub rate_window: Duration,
    /// Delivery workers to run.
    pub workers: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            database_url: None,
            openai_api_key: String::new(),
            openai_base_url: "https://api.openai.com/v1".to_string(),
            file_store_root: PathBuf::from("files"),
            initial_credits: 10,
            rate_limit: 20,
            rate_window: Duration::from_secs(60 * 60),
            workers: 4,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// development defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let openai_api_key = std::env::var("OPENAI_API_KEY").unwrap_or_else(|_| {
            warn!("OPENAI_API_KEY not set; provider calls will be rejected upstream");
            String::new()
        });

        Self {
            bind_addr: std::env::var("PIXELMINT_BIND").unwrap_or(defaults.bind_addr),
            database_url: std::env::var("DATABASE_URL").ok(),
            openai_api_key,
            openai_base_url: std::env::var("OPENAI_BASE_URL").unwrap_or(defaults.openai_base_url),
            file_store_root: std::env::var("FILE_STORE_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.file_store_root),
            initial_credits: parse_or("INITIAL_CREDITS", std::env::var("INITIAL_CREDITS").ok(), defaults.initial_credits),
            rate_limit: parse_or("MAX_JOBS_PER_HOUR", std::env::var("MAX_JOBS_PER_HOUR").ok(), defaults.rate_limit),
            rate_window: defaults.rate_window,
            workers: parse_or("WORKER_COUNT", std::env::var("WORKER_COUNT").ok(), defaults.workers),
        }
    }
}

/// Parse an optional env value, keeping the default (with a warning) on
/// malformed input.
fn parse_or<T: core::str::FromStr + Copy>(key: &str, value: Option<String>, default: T) -> T {
    match value {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(key, raw, "ignoring unparseable configuration value");
            default
        }),
    }
}
