//! Main TUI application state and event handling

use crate::activity::{ActivityEvent, ActivityFeed, ActivityKind};
use crate::agent::{Agent, AgentStatus};
use crate::config::AppConfig;
use crate::connection::Snapshot;
use crate::dispatch::{ActionDispatcher, ActionKind, ActionOutcome, BatchReport, BulkActionRequest};
use crate::fleet::FleetState;
use crate::keys::{Command, KeyRouter};
use crate::normalizer::{normalize, NormalizerConfig};
use crate::reconcile::{next_priority, next_tag, DisplayRow, Reconciler};
use crate::store::DurableStore;
use chrono::Utc;
use crossterm::event::{KeyCode, KeyEvent};
use tokio::sync::mpsc;

/// Rows scrolled per feed page key
const FEED_PAGE: usize = 5;

/// Pending confirmation action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingConfirm {
    /// Kill these agents, in order
    Kill { agent_ids: Vec<String> },
}

/// Progress of a batch running in the background
#[derive(Debug)]
pub enum DispatchEvent {
    Outcome(ActionOutcome),
    Finished(crate::Result<BatchReport>),
}

/// Connectivity as last reported by the connection manager
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkState {
    pub connected: bool,
    pub refreshing: bool,
    pub push_connected: bool,
}

/// Main application state
pub struct App<S: DurableStore> {
    pub fleet: FleetState,
    pub reconciler: Reconciler<S>,
    pub feed: ActivityFeed,
    pub router: KeyRouter,
    pub dispatcher: ActionDispatcher,
    normalizer: NormalizerConfig,
    /// Cursor row in the display list
    pub cursor: usize,
    pub search_focused: bool,
    pub should_quit: bool,
    pub show_help: bool,
    pub status_message: Option<String>,
    /// The status line reports a failed batch
    batch_failed: bool,
    pub pending_confirm: Option<PendingConfirm>,
    pub link: LinkState,
    last_revision: u64,
    refresh_requested: bool,
    dispatch_tx: mpsc::UnboundedSender<DispatchEvent>,
    dispatch_rx: mpsc::UnboundedReceiver<DispatchEvent>,
}

impl<S: DurableStore> App<S> {
    pub fn new(mut reconciler: Reconciler<S>, dispatcher: ActionDispatcher, config: &AppConfig) -> Self {
        let fleet = FleetState::new(config.token_history_len);
        // demo rows get a slot for this session but never touch saved state
        reconciler.show_demo(fleet.agents());
        let (dispatch_tx, dispatch_rx) = mpsc::unbounded_channel();

        Self {
            fleet,
            reconciler,
            feed: ActivityFeed::new(config.activity_capacity),
            router: KeyRouter::default(),
            dispatcher,
            normalizer: config.normalizer_config(),
            cursor: 0,
            search_focused: false,
            should_quit: false,
            show_help: false,
            status_message: Some("Connecting... '?' for help".to_string()),
            batch_failed: false,
            pending_confirm: None,
            link: LinkState::default(),
            last_revision: 0,
            refresh_requested: false,
            dispatch_tx,
            dispatch_rx,
        }
    }

    /// Rows in display order
    pub fn rows(&self) -> Vec<DisplayRow<'_>> {
        self.reconciler.display_list(self.fleet.agents())
    }

    /// Agent under the cursor
    pub fn current(&self) -> Option<&Agent> {
        self.rows().get(self.cursor).map(|row| row.agent)
    }

    fn current_id(&self) -> Option<String> {
        self.current().map(|a| a.id.clone())
    }

    /// Fold a published snapshot into the fleet; stale revisions are ignored
    pub fn apply_snapshot(&mut self, snapshot: &Snapshot) {
        if snapshot.revision <= self.last_revision {
            return;
        }
        self.last_revision = snapshot.revision;

        let was_demo = self.fleet.is_demo();
        let agents = normalize(&snapshot.sessions, Utc::now(), &self.normalizer);
        let events = self.fleet.apply_live(agents);
        self.reconciler.on_snapshot(self.fleet.agents());
        self.feed.record_all(events);
        self.clamp_cursor();

        if was_demo {
            self.set_status(format!("Connected: {} agent(s)", self.fleet.agents().len()));
        }
    }

    /// Replace the status line; a newer message hides any batch error
    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status_message = Some(message.into());
        self.batch_failed = false;
    }

    /// Error of the last batch, while it is still the newest status
    pub fn batch_error(&self) -> Option<String> {
        if !self.batch_failed {
            return None;
        }
        self.dispatcher.last_error().or_else(|| self.status_message.clone())
    }

    pub fn set_link(&mut self, link: LinkState) {
        self.link = link;
    }

    /// True once after the operator asked for a refresh
    pub fn take_refresh_request(&mut self) -> bool {
        std::mem::take(&mut self.refresh_requested)
    }

    /// Handle one key press. Priority: help > confirmation > search > shortcuts
    pub fn handle_key(&mut self, key: KeyEvent) {
        if self.show_help {
            self.show_help = false;
        } else if self.pending_confirm.is_some() {
            self.handle_confirm_key(key);
        } else if self.search_focused {
            self.handle_search_key(key);
        } else if let Some(command) = self.router.route(key, false) {
            self.apply_command(command);
        }
    }

    fn handle_confirm_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') => self.confirm_action(),
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => self.cancel_confirm(),
            _ => {}
        }
    }

    fn handle_search_key(&mut self, key: KeyEvent) {
        if self.router.route(key, true) == Some(Command::BlurSearch) {
            self.search_focused = false;
            return;
        }
        let mut text = self.reconciler.filters().text.clone();
        match key.code {
            KeyCode::Enter => {
                self.search_focused = false;
                return;
            }
            KeyCode::Backspace => {
                text.pop();
            }
            KeyCode::Char(c) => text.push(c),
            _ => return,
        }
        self.reconciler.set_search(&text);
        self.clamp_cursor();
    }

    pub fn apply_command(&mut self, command: Command) {
        match command {
            Command::Quit => self.should_quit = true,
            Command::ToggleHelp => self.show_help = !self.show_help,
            Command::NavigateDown => self.next_row(),
            Command::NavigateUp => self.prev_row(),
            Command::MoveDown => self.move_current(1),
            Command::MoveUp => self.move_current(-1),
            Command::ToggleExpand => {
                if let Some(id) = self.current_id() {
                    self.reconciler.toggle_collapse(&id);
                }
            }
            Command::ToggleSelect => {
                if let Some(id) = self.current_id() {
                    self.reconciler.toggle_select(&id);
                }
            }
            Command::SelectAll => {
                self.reconciler.select_all(self.fleet.agents());
                self.set_status(format!("{} selected", self.reconciler.selected().len()));
            }
            Command::DeselectAll => self.reconciler.deselect_all(),
            Command::FocusSearch => self.search_focused = true,
            Command::BlurSearch => self.search_focused = false,
            Command::NextTab => {
                self.reconciler.set_tab(self.reconciler.filters().tab.next());
                self.clamp_cursor();
            }
            Command::PrevTab => {
                self.reconciler.set_tab(self.reconciler.filters().tab.prev());
                self.clamp_cursor();
            }
            Command::CyclePriority => {
                let priority = next_priority(self.reconciler.filters().priority);
                self.reconciler.set_priority(priority);
                self.set_status(match priority {
                    Some(p) => format!("Priority: {}", p),
                    None => "Priority filter off".to_string(),
                });
                self.clamp_cursor();
            }
            Command::CycleTag => {
                let tag = next_tag(self.reconciler.filters().tag.as_deref(), &self.fleet.tags());
                self.set_status(match &tag {
                    Some(t) => format!("Tag: {}", t),
                    None => "Tag filter off".to_string(),
                });
                self.reconciler.set_tag(tag);
                self.clamp_cursor();
            }
            Command::CycleFeedFilter => self.feed.set_filter(self.feed.filter().next()),
            Command::FeedOlder => self.feed.scroll_up(FEED_PAGE),
            Command::FeedNewer => self.feed.scroll_down(FEED_PAGE),
            Command::FeedLatest => self.feed.jump_to_latest(),
            Command::Refresh => {
                self.refresh_requested = true;
                self.set_status("Refreshing...".to_string());
            }
            Command::KillSelected => self.request_kill(),
            Command::ArchiveSelected => {
                let ids = self.target_ids();
                self.start_batch(ActionKind::Archive, ids);
            }
            Command::ExportSelected => {
                let ids = self.target_ids();
                self.start_batch(ActionKind::Export, ids);
            }
        }
    }

    /// Selected ids in display order, or the cursor row when nothing is selected
    pub fn target_ids(&self) -> Vec<String> {
        let selected = self.reconciler.selected_ids(self.fleet.agents());
        if selected.is_empty() {
            self.current_id().into_iter().collect()
        } else {
            selected
        }
    }

    /// Select next row
    pub fn next_row(&mut self) {
        let count = self.rows().len();
        if count > 0 {
            self.cursor = (self.cursor + 1) % count;
        }
    }

    /// Select previous row
    pub fn prev_row(&mut self) {
        let count = self.rows().len();
        if count > 0 {
            self.cursor = self.cursor.checked_sub(1).unwrap_or(count - 1);
        }
    }

    fn move_current(&mut self, delta: isize) {
        let Some(id) = self.current_id() else {
            return;
        };
        if self.reconciler.move_visible(self.fleet.agents(), &id, delta) {
            self.cursor = self.cursor.saturating_add_signed(delta);
        }
    }

    fn clamp_cursor(&mut self) {
        let count = self.rows().len();
        if self.cursor >= count {
            self.cursor = count.saturating_sub(1);
        }
    }

    /// Request kill confirmation for the targeted agents
    pub fn request_kill(&mut self) {
        let agent_ids = self.target_ids();
        if agent_ids.is_empty() {
            self.set_status("Nothing to kill".to_string());
            return;
        }
        self.set_status(format!("Kill {} agent(s)? (y/n)", agent_ids.len()));
        self.pending_confirm = Some(PendingConfirm::Kill { agent_ids });
    }

    /// Cancel pending confirmation
    pub fn cancel_confirm(&mut self) {
        self.pending_confirm = None;
        self.set_status("Cancelled".to_string());
    }

    /// Confirm and execute pending action
    pub fn confirm_action(&mut self) {
        if let Some(PendingConfirm::Kill { agent_ids }) = self.pending_confirm.take() {
            self.start_batch(ActionKind::Kill, agent_ids);
        }
    }

    /// Run a batch in the background; outcomes come back through
    /// [`App::drain_dispatch`]. Needs a tokio runtime.
    pub fn start_batch(&mut self, kind: ActionKind, agent_ids: Vec<String>) {
        if agent_ids.is_empty() {
            self.set_status(format!("Nothing to {}", kind));
            return;
        }
        if self.dispatcher.is_processing() {
            self.set_status("Busy: a bulk action is still running".to_string());
            return;
        }

        self.set_status(format!("{} {} agent(s)...", kind, agent_ids.len()));
        let dispatcher = self.dispatcher.clone();
        let agents = self.fleet.agents().to_vec();
        let tx = self.dispatch_tx.clone();
        let request = BulkActionRequest::new(kind, agent_ids);

        tokio::spawn(async move {
            let report = dispatcher
                .execute(request, &agents, |outcome| {
                    let _ = tx.send(DispatchEvent::Outcome(outcome.clone()));
                })
                .await;
            let _ = tx.send(DispatchEvent::Finished(report));
        });
    }

    /// Apply everything the background batch has reported so far
    pub fn drain_dispatch(&mut self) {
        while let Ok(event) = self.dispatch_rx.try_recv() {
            match event {
                DispatchEvent::Outcome(outcome) => self.apply_outcome(&outcome),
                DispatchEvent::Finished(Ok(report)) => {
                    self.set_status(batch_summary(&report));
                    self.batch_failed = report.aggregated_error().is_some();
                }
                DispatchEvent::Finished(Err(e)) => {
                    self.set_status(e.to_string());
                    self.batch_failed = true;
                }
            }
        }
    }

    fn apply_outcome(&mut self, outcome: &ActionOutcome) {
        let task = self
            .fleet
            .get(&outcome.agent_id)
            .map(|a| a.task.clone())
            .unwrap_or_else(|| outcome.agent_id.clone());

        if let Some(event) = outcome_event(outcome, &task) {
            self.feed.record(event);
        }
        self.fleet.apply_outcome(outcome);
        if outcome.is_success() && outcome.kind == ActionKind::Kill {
            self.reconciler.forget(&outcome.agent_id);
        }
        self.clamp_cursor();
    }

    /// Tab label with its agent count
    pub fn tab_badge(&self, tab: crate::reconcile::StatusTab) -> String {
        format!("{} ({})", tab.label(), self.fleet.count_for(tab))
    }

    /// Agents needing attention
    pub fn attention_count(&self) -> usize {
        self.fleet
            .agents()
            .iter()
            .filter(|a| a.status == AgentStatus::Failed)
            .count()
    }
}

/// Format duration as human-readable string
pub fn format_duration(duration: chrono::Duration) -> String {
    let secs = duration.num_seconds().max(0);
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else if secs < 86400 {
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        if mins > 0 {
            format!("{}h {}m", hours, mins)
        } else {
            format!("{}h", hours)
        }
    } else {
        format!("{}d", secs / 86400)
    }
}

/// Activity entry for one action outcome
fn outcome_event(outcome: &ActionOutcome, task: &str) -> Option<ActivityEvent> {
    let event = match (&outcome.error, outcome.kind) {
        (Some(error), kind) => ActivityEvent::new(
            ActivityKind::Failed,
            &outcome.agent_id,
            format!("{} failed for {}: {}", kind, task, error),
        )
        .with_meta("error", error.as_str()),
        (None, ActionKind::Kill) => ActivityEvent::new(
            ActivityKind::StatusChanged,
            &outcome.agent_id,
            format!("Killed: {}", task),
        ),
        (None, ActionKind::Archive) => ActivityEvent::new(
            ActivityKind::Completed,
            &outcome.agent_id,
            format!("Archived: {}", task),
        ),
        (None, ActionKind::Export) => return None,
    };
    Some(event.with_meta("action", outcome.kind.as_str()))
}

fn batch_summary(report: &BatchReport) -> String {
    if let Some(error) = report.aggregated_error() {
        return error;
    }
    match (&report.artifact, report.kind) {
        (Some(path), ActionKind::Export) => {
            format!("Exported {} agent(s) to {}", report.succeeded(), path.display())
        }
        (_, kind) => format!("{}: {} agent(s) done", kind, report.succeeded()),
    }
}
