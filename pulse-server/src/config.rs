use std::env;
use std::path::Path;
use std::time::Duration;

use anyhow::anyhow;
use serde::Deserialize;

/// Server configuration loaded via environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // Server settings
    pub server_host: String,
    pub server_port: u16,

    // Database settings
    pub database_url: String,
    pub database_max_connections: u32,

    // Webhook settings
    /// Shared secret for webhook signature verification. Unset skips
    /// verification (dev mode).
    pub webhook_secret: Option<String>,
    pub webhook_rate_limit_max: usize,
    pub webhook_rate_limit_window: Duration,

    // Alignment analyzer settings
    pub alignment_endpoint: Option<String>,
    pub alignment_model: String,
    pub alignment_timeout: Duration,
    pub alignment_max_retries: u32,
    pub alignment_retry_delay: Duration,
    pub alignment_rate_limit_max: usize,
    pub alignment_rate_limit_window: Duration,

    // Pipeline settings
    pub default_activity_window_hours: i32,

    // CORS settings
    pub cors_allowed_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::load(None)
    }

    /// Load configuration, optionally seeding the environment from an
    /// explicit env file first. Without one, a `.env` in the working
    /// directory is picked up when present. Variables already set in the
    /// process environment always win.
    pub fn load(env_file: Option<&Path>) -> anyhow::Result<Self> {
        match env_file {
            Some(path) => {
                dotenvy::from_path(path)?;
            }
            None => {
                dotenvy::dotenv().ok();
            }
        }

        Ok(Self {
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .unwrap_or(3000),

            database_url: database_url_from_env()?,
            database_max_connections: parse_env("DATABASE_MAX_CONNECTIONS", 20),

            webhook_secret: env::var("WEBHOOK_SECRET").ok().filter(|s| !s.is_empty()),
            webhook_rate_limit_max: parse_env("WEBHOOK_RATE_LIMIT_MAX", 30),
            webhook_rate_limit_window: Duration::from_secs(parse_env(
                "WEBHOOK_RATE_LIMIT_WINDOW_SECS",
                60,
            )),

            alignment_endpoint: env::var("ALIGNMENT_ENDPOINT")
                .ok()
                .filter(|s| !s.is_empty()),
            alignment_model: env::var("ALIGNMENT_MODEL")
                .unwrap_or_else(|_| "align-default".to_string()),
            alignment_timeout: Duration::from_secs(parse_env("ALIGNMENT_TIMEOUT_SECS", 15)),
            alignment_max_retries: parse_env("ALIGNMENT_MAX_RETRIES", 1),
            alignment_retry_delay: Duration::from_millis(parse_env(
                "ALIGNMENT_RETRY_DELAY_MS",
                1500,
            )),
            alignment_rate_limit_max: parse_env("ALIGNMENT_RATE_LIMIT_MAX", 10),
            alignment_rate_limit_window: Duration::from_secs(parse_env(
                "ALIGNMENT_RATE_LIMIT_WINDOW_SECS",
                60,
            )),

            default_activity_window_hours: parse_env("ACTIVITY_WINDOW_HOURS", 72),

            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "http://localhost:5173".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        })
    }
}

/// DATABASE_URL wins; otherwise the discrete DB_* parts are composed into
/// one, so deployments can pass credentials separately.
fn database_url_from_env() -> anyhow::Result<String> {
    if let Ok(url) = env::var("DATABASE_URL") {
        if !(url.starts_with("postgres://") || url.starts_with("postgresql://")) {
            return Err(anyhow!(
                "invalid DATABASE_URL: must start with postgres:// or postgresql://"
            ));
        }
        return Ok(url);
    }

    let host = env::var("DB_HOST").map_err(|_| anyhow!("DATABASE_URL or DB_HOST must be set"))?;
    let port = env::var("DB_PORT").unwrap_or_else(|_| "5432".to_string());
    let name = env::var("DB_NAME").unwrap_or_else(|_| "pulse".to_string());
    let user = env::var("DB_USER").unwrap_or_else(|_| "pulse".to_string());
    let password = env::var("DB_PASSWORD").unwrap_or_default();

    Ok(format!(
        "postgres://{user}:{password}@{host}:{port}/{name}"
    ))
}

fn parse_env<T: std::str::FromStr + Copy>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
