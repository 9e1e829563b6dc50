//! Config loader behavior: env-file seeding, discrete database parts,
//! defaults, and rejection of non-Postgres URLs.
//!
//! These tests mutate the process environment, so they serialize on a
//! shared lock and scrub every managed key before running.

use std::fs;
use std::sync::{LazyLock, Mutex};
use std::time::Duration;

use tempfile::tempdir;

use pulse_server::Config;

static ENV_LOCK: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

const MANAGED_KEYS: &[&str] = &[
    "SERVER_HOST",
    "SERVER_PORT",
    "DATABASE_URL",
    "DATABASE_MAX_CONNECTIONS",
    "DB_HOST",
    "DB_PORT",
    "DB_NAME",
    "DB_USER",
    "DB_PASSWORD",
    "WEBHOOK_SECRET",
    "WEBHOOK_RATE_LIMIT_MAX",
    "WEBHOOK_RATE_LIMIT_WINDOW_SECS",
    "ALIGNMENT_ENDPOINT",
    "ALIGNMENT_MODEL",
    "ALIGNMENT_TIMEOUT_SECS",
    "ALIGNMENT_MAX_RETRIES",
    "ALIGNMENT_RETRY_DELAY_MS",
    "ALIGNMENT_RATE_LIMIT_MAX",
    "ALIGNMENT_RATE_LIMIT_WINDOW_SECS",
    "ACTIVITY_WINDOW_HOURS",
    "CORS_ALLOWED_ORIGINS",
];

fn clear_env() {
    for key in MANAGED_KEYS {
        unsafe { std::env::remove_var(key) };
    }
}

#[test]
fn env_file_seeds_settings_and_defaults_fill_the_rest() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let dir = tempdir().expect("tempdir");
    let env_path = dir.path().join(".env");
    fs::write(
        &env_path,
        concat!(
            "DATABASE_URL=postgres://pulse:pw@db:5432/pulse\n",
            "WEBHOOK_SECRET=wh-secret\n",
            "SERVER_PORT=8081\n",
            "ALIGNMENT_ENDPOINT=http://align:9000/analyze\n",
            "ALIGNMENT_RATE_LIMIT_MAX=5\n",
        ),
    )
    .expect("write env file");

    let config = Config::load(Some(&env_path)).expect("load config");

    assert_eq!(config.database_url, "postgres://pulse:pw@db:5432/pulse");
    assert_eq!(config.webhook_secret.as_deref(), Some("wh-secret"));
    assert_eq!(config.server_port, 8081);
    assert_eq!(
        config.alignment_endpoint.as_deref(),
        Some("http://align:9000/analyze")
    );
    assert_eq!(config.alignment_rate_limit_max, 5);

    // Everything the file left out falls back to defaults.
    assert_eq!(config.server_host, "0.0.0.0");
    assert_eq!(config.database_max_connections, 20);
    assert_eq!(config.alignment_timeout, Duration::from_secs(15));
    assert_eq!(config.alignment_max_retries, 1);
    assert_eq!(config.alignment_retry_delay, Duration::from_millis(1500));
    assert_eq!(config.alignment_rate_limit_window, Duration::from_secs(60));
    assert_eq!(config.default_activity_window_hours, 72);

    clear_env();
}

#[test]
fn discrete_database_parts_compose_a_url() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    unsafe {
        std::env::set_var("DB_HOST", "db.internal");
        std::env::set_var("DB_PORT", "6432");
        std::env::set_var("DB_NAME", "pulsedb");
        std::env::set_var("DB_USER", "svc");
        std::env::set_var("DB_PASSWORD", "pw");
    }

    let config = Config::from_env().expect("load config");
    assert_eq!(
        config.database_url,
        "postgres://svc:pw@db.internal:6432/pulsedb"
    );

    clear_env();
}

#[test]
fn non_postgres_database_url_is_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    unsafe { std::env::set_var("DATABASE_URL", "mysql://svc:pw@db/pulse") };

    let err = Config::from_env().expect_err("mysql url must be rejected");
    assert!(err.to_string().contains("postgres://"));

    clear_env();
}

#[test]
fn missing_database_settings_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let err = Config::from_env().expect_err("no database settings");
    assert!(err.to_string().contains("DB_HOST"));

    clear_env();
}
