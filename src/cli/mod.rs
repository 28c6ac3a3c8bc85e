//! CLI command definitions

use crate::config::{AppConfig, DEFAULT_GATEWAY_URL};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "fleetdeck")]
#[command(about = "Operator dashboard for a fleet of remote agents", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Gateway base URL
    #[arg(long, global = true, env = "FLEETDECK_GATEWAY_URL", default_value = DEFAULT_GATEWAY_URL)]
    pub gateway_url: String,

    /// Bearer token for the gateway
    #[arg(long, global = true, env = "FLEETDECK_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Directory for persisted state and logs (defaults to ~/.fleetdeck)
    #[arg(long, global = true)]
    pub state_dir: Option<PathBuf>,

    /// Directory export files are written to
    #[arg(long, global = true, default_value = ".")]
    pub export_dir: PathBuf,

    /// Seconds between safety-net polls
    #[arg(long, global = true, default_value_t = 5)]
    pub poll_secs: u64,

    /// Maximum sessions fetched per pull
    #[arg(long, global = true, default_value_t = 50)]
    pub limit: usize,

    /// Poll only; never open the push channel
    #[arg(long, global = true)]
    pub no_push: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Launch the TUI dashboard (default)
    Dashboard,

    /// Print the current agent list in display order
    List {
        /// Status tab: all, active, queued, completed, failed
        #[arg(short, long)]
        status: Option<String>,

        /// Free-text filter on id, task and model
        #[arg(short = 'q', long)]
        search: Option<String>,

        /// Priority filter: low, medium, high
        #[arg(short, long)]
        priority: Option<String>,

        /// Only agents carrying this tag (channel or session kind)
        #[arg(short, long)]
        tag: Option<String>,
    },

    /// Kill agents, one at a time
    Kill {
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Archive agents, one at a time
    Archive {
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Export agents to a JSON file
    Export {
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Forget persisted ordering, selection, collapse and filter state
    Reset,
}

impl Cli {
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Dashboard)
    }

    /// Overlay the parsed flags onto the defaults
    pub fn config(&self) -> AppConfig {
        let defaults = AppConfig::default();
        AppConfig {
            gateway_url: self.gateway_url.clone(),
            token: self.token.clone().filter(|t| !t.trim().is_empty()),
            poll_interval: Duration::from_secs(self.poll_secs),
            pull_limit: self.limit,
            push_enabled: !self.no_push,
            state_dir: self.state_dir.clone().unwrap_or(defaults.state_dir.clone()),
            export_dir: self.export_dir.clone(),
            ..defaults
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dashboard_is_default() {
        let cli = Cli::try_parse_from(["fleetdeck", "--gateway-url", "http://gw:1"]).unwrap();
        assert_eq!(cli.command(), Commands::Dashboard);
        assert_eq!(cli.config().gateway_url, "http://gw:1");
    }

    #[test]
    fn test_flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "fleetdeck",
            "list",
            "--status",
            "failed",
            "--poll-secs",
            "9",
            "--limit",
            "10",
            "--no-push",
            "--state-dir",
            "/tmp/fd",
        ])
        .unwrap();
        assert_eq!(
            cli.command(),
            Commands::List {
                status: Some("failed".into()),
                search: None,
                priority: None,
                tag: None,
            }
        );
        let config = cli.config();
        assert_eq!(config.poll_interval, Duration::from_secs(9));
        assert_eq!(config.pull_limit, 10);
        assert!(!config.push_enabled);
        assert_eq!(config.db_path(), PathBuf::from("/tmp/fd/state.db"));
    }

    #[test]
    fn test_list_secondary_filters() {
        let cli = Cli::try_parse_from(["fleetdeck", "list", "--priority", "high", "-t", "ops"]).unwrap();
        assert_eq!(
            cli.command(),
            Commands::List {
                status: None,
                search: None,
                priority: Some("high".into()),
                tag: Some("ops".into()),
            }
        );
    }

    #[test]
    fn test_bulk_commands_need_ids() {
        assert!(Cli::try_parse_from(["fleetdeck", "kill"]).is_err());
        let cli = Cli::try_parse_from(["fleetdeck", "archive", "a", "b"]).unwrap();
        assert_eq!(
            cli.command(),
            Commands::Archive {
                ids: vec!["a".into(), "b".into()]
            }
        );
    }
}
