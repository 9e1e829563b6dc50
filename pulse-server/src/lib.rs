//! # Pulse Server
//!
//! Ingests version-control push events for tracked repositories and keeps a
//! live per-workspace model of conflict risk, feature progress, and overall
//! health, pushed to dashboard clients over WebSocket.
//!
//! ## Architecture
//!
//! The server is built on Axum and uses:
//! - PostgreSQL for all pipeline state
//! - An in-process per-workspace dispatcher for post-ACK engine runs
//! - A DashMap-backed subscriber registry for event fan-out

/// Server config
pub mod config;

/// Per-workspace engine dispatch after the webhook ACK
pub mod dispatch;

/// Error types and handling
pub mod errors;

/// Route organization
pub mod routes;

/// Shared application state
pub mod state;

/// Webhook ingestion endpoint
pub mod webhook;

/// WebSocket subscriber management
pub mod ws;

pub use config::Config;
pub use state::AppState;
