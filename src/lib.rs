//! Fleetdeck: operator dashboard for a fleet of remote agents
//!
//! Keeps a live view of remote agent sessions (push channel with a polling
//! safety net), merges it with locally persisted ordering, selection and
//! filters, and dispatches bulk actions one agent at a time.

pub mod activity;
pub mod agent;
pub mod cli;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod fleet;
pub mod gateway;
pub mod keys;
pub mod normalizer;
pub mod reconcile;
pub mod store;
pub mod tui;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FleetError {
    #[error("Gateway unavailable: {0}")]
    ConnectionUnavailable(String),

    #[error("Gateway rejected credentials")]
    Unauthorized,

    #[error("Action failed for {agent_id}: {message}")]
    Action { agent_id: String, message: String },

    #[error("A bulk action is already in progress")]
    Busy,

    #[error("Export error: {0}")]
    Export(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

impl FleetError {
    /// Whether the error means "treat the gateway as offline" rather than a hard failure
    pub fn is_offline(&self) -> bool {
        matches!(
            self,
            FleetError::ConnectionUnavailable(_)
                | FleetError::Unauthorized
                | FleetError::Http(_)
                | FleetError::WebSocket(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, FleetError>;
