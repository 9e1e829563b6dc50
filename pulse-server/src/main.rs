use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pulse_core::database::Database;
use pulse_server::{AppState, Config, routes};

/// Command line arguments for the Pulse server
#[derive(Parser, Debug)]
#[command(name = "pulse-server")]
#[command(about = "Workspace intelligence server - webhook ingestion and real-time dashboards")]
struct Args {
    /// Server port (overrides config)
    #[arg(short, long, env = "SERVER_PORT")]
    port: Option<u16>,

    /// Server host (overrides config)
    #[arg(long, env = "SERVER_HOST")]
    host: Option<String>,

    /// Environment file to load instead of ./.env
    #[arg(long, value_name = "FILE")]
    env_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Load configuration from environment
    let mut config = Config::load(args.env_file.as_deref())?;

    // Override config with CLI arguments if provided
    if let Some(port) = args.port {
        config.server_port = port;
    }
    if let Some(host) = args.host {
        config.server_host = host;
    }

    let config = Arc::new(config);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pulse_server=debug,pulse_core=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Server configuration loaded");
    if config.webhook_secret.is_none() {
        tracing::warn!("WEBHOOK_SECRET not set - signature verification disabled (dev mode)");
    }

    let db = Database::connect(&config.database_url, config.database_max_connections).await?;
    db.initialize_schema().await?;
    info!("Database initialized successfully");

    let state = AppState::build(config.clone(), db)?;

    // Liveness probe loop for dashboard subscribers
    let _probe = state.registry.spawn_liveness_probe();

    let app = routes::router(state);

    let addr: SocketAddr = format!("{}:{}", config.server_host, config.server_port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
