//! Fleetdeck runtime configuration.
//!
//! State lives under `~/.fleetdeck/`:
//! `state.db` for persisted customization, `logs/fleetdeck.log` for the
//! dashboard's log output.

use crate::normalizer::NormalizerConfig;
use crate::{FleetError, Result};
use std::fs::{self, File, OpenOptions};
use std::path::PathBuf;
use std::time::Duration;

/// Directory name for state within the home directory
const STATE_DIR: &str = ".fleetdeck";

/// Directory name for logs within the state directory
const LOGS_DIR: &str = "logs";

pub const DEFAULT_GATEWAY_URL: &str = "http://127.0.0.1:18789";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub gateway_url: String,
    /// Bearer credential; without one the gateway is treated as offline
    pub token: Option<String>,
    pub poll_interval: Duration,
    /// Sessions requested per pull
    pub pull_limit: usize,
    pub push_enabled: bool,
    pub idle_threshold: Duration,
    pub progress_entries: usize,
    pub progress_max_chars: usize,
    pub token_history_len: usize,
    pub activity_capacity: usize,
    pub state_dir: PathBuf,
    pub export_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            gateway_url: DEFAULT_GATEWAY_URL.to_string(),
            token: None,
            poll_interval: Duration::from_secs(5),
            pull_limit: 50,
            push_enabled: true,
            idle_threshold: Duration::from_secs(60 * 60),
            progress_entries: 5,
            progress_max_chars: 120,
            token_history_len: 20,
            activity_capacity: crate::activity::DEFAULT_CAPACITY,
            state_dir: default_state_dir(),
            export_dir: PathBuf::from("."),
        }
    }
}

/// `~/.fleetdeck`, or `./.fleetdeck` when there is no home directory
pub fn default_state_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(STATE_DIR)
}

impl AppConfig {
    /// Reject values that would stall polling or empty every buffer
    pub fn validate(&self) -> Result<()> {
        if self.gateway_url.trim().is_empty() {
            return Err(FleetError::Config("gateway URL is empty".into()));
        }
        let zero = [
            ("poll interval", self.poll_interval.is_zero()),
            ("pull limit", self.pull_limit == 0),
            ("idle threshold", self.idle_threshold.is_zero()),
            ("progress entries", self.progress_entries == 0),
            ("progress line length", self.progress_max_chars == 0),
            ("token history length", self.token_history_len == 0),
            ("activity capacity", self.activity_capacity == 0),
        ];
        match zero.iter().find(|(_, is_zero)| *is_zero) {
            Some((name, _)) => Err(FleetError::Config(format!("{} must be greater than zero", name))),
            None => Ok(()),
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.state_dir.join("state.db")
    }

    pub fn log_path(&self) -> PathBuf {
        self.state_dir.join(LOGS_DIR).join("fleetdeck.log")
    }

    /// Open the dashboard log in append mode, creating `logs/` if needed
    pub fn open_log_file(&self) -> Result<File> {
        let path = self.log_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(file)
    }

    pub fn normalizer_config(&self) -> NormalizerConfig {
        NormalizerConfig {
            idle_threshold: chrono::Duration::from_std(self.idle_threshold)
                .unwrap_or_else(|_| chrono::Duration::minutes(60)),
            progress_entries: self.progress_entries,
            progress_max_chars: self.progress_max_chars,
        }
    }
}
