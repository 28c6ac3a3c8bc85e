//! Terminal UI components
//!
//! Renders the reconciled display list, the activity feed and connection
//! state, and feeds key presses back into the reconciler and dispatcher.

mod app;
mod events;
mod render;

pub use app::*;

use crate::config::AppConfig;
use crate::connection::{ConnectionManager, ConnectionSettings, Snapshot};
use crate::dispatch::{ActionDispatcher, JsonFileExporter};
use crate::gateway::HttpGateway;
use crate::reconcile::Reconciler;
use crate::store::{CustomizationStore, DurableStore, SqliteStore};
use crossterm::event::{DisableMouseCapture, EnableMouseCapture};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::Terminal;
use std::io;
use std::sync::Arc;
use tokio::sync::watch;

/// Split the terminal into the main layout areas
pub fn main_layout(area: Rect) -> Vec<Rect> {
    Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // Header
            Constraint::Length(1), // Tabs + search
            Constraint::Min(8),    // Body
            Constraint::Length(1), // Status bar
        ])
        .split(area)
        .to_vec()
}

/// Agent list on the left, detail and activity stacked on the right
pub fn body_layout(area: Rect) -> Vec<Rect> {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(area);
    let side = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(columns[1]);
    vec![columns[0], side[0], side[1]]
}

/// Rect of `width` x `height` centered in `area`, clamped to fit
pub fn centered_rect(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

/// Raw mode + alternate screen for as long as it lives
struct TerminalGuard {
    terminal: Terminal<CrosstermBackend<io::Stdout>>,
}

impl TerminalGuard {
    fn enter() -> crate::Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;
        terminal.clear()?;
        Ok(Self { terminal })
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(self.terminal.backend_mut(), DisableMouseCapture, LeaveAlternateScreen);
        let _ = self.terminal.show_cursor();
    }
}

/// Run the dashboard until the operator quits
pub async fn run(config: &AppConfig) -> crate::Result<()> {
    let gateway = Arc::new(HttpGateway::new(&config.gateway_url, config.token.clone())?);
    let store = SqliteStore::open(config.db_path())?;
    tracing::info!("Customization store at {}", config.db_path().display());

    let reconciler = Reconciler::load(CustomizationStore::new(store));
    let dispatcher = ActionDispatcher::new(
        gateway.clone(),
        Arc::new(JsonFileExporter::new(&config.export_dir)),
    );
    let mut app = App::new(reconciler, dispatcher, config);

    let manager = ConnectionManager::start(gateway, ConnectionSettings::from(config));
    let mut snapshots = manager.subscribe();

    let result = match TerminalGuard::enter() {
        Ok(mut guard) => event_loop(&mut guard.terminal, &mut app, &manager, &mut snapshots),
        Err(e) => Err(e),
    };

    manager.shutdown().await;
    result
}

fn event_loop<S: DurableStore>(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App<S>,
    manager: &ConnectionManager,
    snapshots: &mut watch::Receiver<Option<Arc<Snapshot>>>,
) -> crate::Result<()> {
    loop {
        if snapshots.has_changed().unwrap_or(false) {
            let latest = snapshots.borrow_and_update().clone();
            if let Some(snapshot) = latest {
                app.apply_snapshot(&snapshot);
            }
        }
        app.set_link(LinkState {
            connected: manager.is_connected(),
            refreshing: manager.is_refreshing(),
            push_connected: manager.is_push_connected(),
        });
        if app.take_refresh_request() {
            manager.refresh_now();
        }

        terminal.draw(|frame| render::render(frame, app))?;

        // crossterm polling blocks; keep the runtime's other tasks moving
        if !tokio::task::block_in_place(|| events::handle_events(app))? {
            return Ok(());
        }
    }
}
