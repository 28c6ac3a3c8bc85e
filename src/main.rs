use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use fleetdeck::agent::Priority;
use fleetdeck::cli::{Cli, Commands};
use fleetdeck::config::AppConfig;
use fleetdeck::dispatch::{ActionDispatcher, ActionKind, BulkActionRequest, JsonFileExporter};
use fleetdeck::gateway::{HttpGateway, SessionSource};
use fleetdeck::normalizer::normalize;
use fleetdeck::reconcile::{ordered_view, Reconciler, StatusTab};
use fleetdeck::store::{CustomizationStore, SqliteStore};
use std::sync::{Arc, Mutex};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command();
    let config = cli.config();

    init_logging(&config, command == Commands::Dashboard)?;
    config.validate()?;

    match command {
        Commands::Dashboard => {
            fleetdeck::tui::run(&config).await?;
        }

        Commands::List {
            status,
            search,
            priority,
            tag,
        } => {
            let tab = match status.as_deref() {
                Some(value) => StatusTab::from_str(value)
                    .with_context(|| format!("unknown status '{}'", value))?,
                None => StatusTab::All,
            };
            let priority = match priority.as_deref() {
                Some(value) => Some(
                    Priority::from_str(value).with_context(|| format!("unknown priority '{}'", value))?,
                ),
                None => None,
            };

            let gateway = HttpGateway::new(&config.gateway_url, config.token.clone())?;
            let sessions = gateway
                .pull(config.pull_limit)
                .await
                .context("Could not reach the gateway")?;
            let agents = normalize(&sessions, Utc::now(), &config.normalizer_config());

            let mut reconciler = Reconciler::load(CustomizationStore::new(SqliteStore::open(config.db_path())?));
            reconciler.on_snapshot(&agents);

            // one-off view; the persisted filters are left alone
            let mut filters = reconciler.filters().clone();
            filters.tab = tab;
            if let Some(text) = search {
                filters.text = text;
            }
            if priority.is_some() {
                filters.priority = priority;
            }
            if tag.is_some() {
                filters.tag = tag;
            }

            let rows = ordered_view(&agents, reconciler.ordering(), &filters);
            if rows.is_empty() {
                println!("  (none)");
            }
            for agent in rows {
                let mark = if reconciler.is_selected(&agent.id) { "*" } else { " " };
                println!(
                    "{} {} [{}] {} ({}, {}, {} tokens)",
                    mark, agent.id, agent.status, agent.task, agent.model, agent.priority, agent.tokens
                );
            }
        }

        Commands::Kill { ids } => run_batch(&config, ActionKind::Kill, ids).await?,
        Commands::Archive { ids } => run_batch(&config, ActionKind::Archive, ids).await?,
        Commands::Export { ids } => run_batch(&config, ActionKind::Export, ids).await?,

        Commands::Reset => {
            let store = CustomizationStore::new(SqliteStore::open(config.db_path())?);
            store.clear();
            println!("Cleared ordering, selection, collapse and filter state");
            println!("  Store: {}", config.db_path().display());
        }
    }

    Ok(())
}

/// Dashboard logs go to a file so they never draw over the UI
fn init_logging(config: &AppConfig, to_file: bool) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive("fleetdeck=info".parse()?);

    if to_file {
        let file = config
            .open_log_file()
            .with_context(|| format!("Failed to open {}", config.log_path().display()))?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(())
}

/// Pull once, then run one batch and print each outcome as it lands
async fn run_batch(config: &AppConfig, kind: ActionKind, ids: Vec<String>) -> Result<()> {
    let gateway = Arc::new(HttpGateway::new(&config.gateway_url, config.token.clone())?);
    let sessions = gateway
        .pull(config.pull_limit)
        .await
        .context("Could not reach the gateway")?;
    let agents = normalize(&sessions, Utc::now(), &config.normalizer_config());

    let dispatcher = ActionDispatcher::new(gateway, Arc::new(JsonFileExporter::new(&config.export_dir)));
    let report = dispatcher
        .execute(BulkActionRequest::new(kind, ids), &agents, |outcome| {
            match &outcome.error {
                None => println!("  ✓ {} {}", kind, outcome.agent_id),
                Some(error) => println!("  ✗ {} {}: {}", kind, outcome.agent_id, error),
            }
        })
        .await?;

    if let Some(path) = &report.artifact {
        println!("Exported to {}", path.display());
    }
    if let Some(error) = report.aggregated_error() {
        eprintln!("Error: {}", error);
        std::process::exit(1);
    }
    Ok(())
}
