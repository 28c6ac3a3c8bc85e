//! Keyboard/command router
//!
//! Maps global key presses onto dashboard commands. Routing is inert while
//! a text input has focus (only Escape gets through, to blur it) and
//! entirely inert when disabled.

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

/// A dashboard operation a key press resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SelectAll,
    KillSelected,
    FocusSearch,
    BlurSearch,
    DeselectAll,
    NavigateDown,
    NavigateUp,
    MoveDown,
    MoveUp,
    ToggleExpand,
    ToggleSelect,
    ArchiveSelected,
    ExportSelected,
    NextTab,
    PrevTab,
    CyclePriority,
    CycleTag,
    CycleFeedFilter,
    FeedOlder,
    FeedNewer,
    FeedLatest,
    Refresh,
    ToggleHelp,
    Quit,
}

impl Command {
    pub fn describe(self) -> &'static str {
        match self {
            Command::SelectAll => "select all",
            Command::KillSelected => "kill selected",
            Command::FocusSearch => "search",
            Command::BlurSearch => "leave search",
            Command::DeselectAll => "deselect all",
            Command::NavigateDown => "down",
            Command::NavigateUp => "up",
            Command::MoveDown => "move row down",
            Command::MoveUp => "move row up",
            Command::ToggleExpand => "expand/collapse",
            Command::ToggleSelect => "select/unselect",
            Command::ArchiveSelected => "archive selected",
            Command::ExportSelected => "export selected",
            Command::NextTab => "next tab",
            Command::PrevTab => "previous tab",
            Command::CyclePriority => "priority filter",
            Command::CycleTag => "tag filter",
            Command::CycleFeedFilter => "feed filter",
            Command::FeedOlder => "scroll feed",
            Command::FeedNewer => "scroll feed down",
            Command::FeedLatest => "follow feed",
            Command::Refresh => "refresh",
            Command::ToggleHelp => "help",
            Command::Quit => "quit",
        }
    }
}

/// Key legend for the help overlay
pub const HELP: &[(&str, Command)] = &[
    ("j/k ↑/↓", Command::NavigateDown),
    ("J/K S-↑/↓", Command::MoveDown),
    ("Enter", Command::ToggleExpand),
    ("Space/x", Command::ToggleSelect),
    ("Ctrl+A", Command::SelectAll),
    ("Esc", Command::DeselectAll),
    ("Ctrl+K/Del", Command::KillSelected),
    ("a", Command::ArchiveSelected),
    ("e", Command::ExportSelected),
    ("/", Command::FocusSearch),
    ("Tab/S-Tab", Command::NextTab),
    ("p", Command::CyclePriority),
    ("t", Command::CycleTag),
    ("f", Command::CycleFeedFilter),
    ("PgUp/PgDn", Command::FeedOlder),
    ("End", Command::FeedLatest),
    ("r", Command::Refresh),
    ("?", Command::ToggleHelp),
    ("q/Ctrl+C", Command::Quit),
];

#[derive(Debug, Clone)]
pub struct KeyRouter {
    enabled: bool,
}

impl Default for KeyRouter {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl KeyRouter {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Resolve a key press; `None` means the key is not a shortcut here
    pub fn route(&self, key: KeyEvent, input_focused: bool) -> Option<Command> {
        if !self.enabled || key.kind == KeyEventKind::Release {
            return None;
        }
        if input_focused {
            return (key.code == KeyCode::Esc).then_some(Command::BlurSearch);
        }

        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        let shift = key.modifiers.contains(KeyModifiers::SHIFT);

        let command = match key.code {
            KeyCode::Char('a') | KeyCode::Char('A') if ctrl => Command::SelectAll,
            KeyCode::Char('k') | KeyCode::Char('K') if ctrl => Command::KillSelected,
            KeyCode::Char('c') | KeyCode::Char('C') if ctrl => Command::Quit,
            _ if ctrl => return None,

            KeyCode::Delete => Command::KillSelected,
            KeyCode::Esc => Command::DeselectAll,
            KeyCode::Char('/') => Command::FocusSearch,

            KeyCode::Down if shift => Command::MoveDown,
            KeyCode::Up if shift => Command::MoveUp,
            KeyCode::Char('J') => Command::MoveDown,
            KeyCode::Char('K') => Command::MoveUp,
            KeyCode::Down | KeyCode::Char('j') => Command::NavigateDown,
            KeyCode::Up | KeyCode::Char('k') => Command::NavigateUp,

            KeyCode::Enter => Command::ToggleExpand,
            KeyCode::Char(' ') | KeyCode::Char('x') => Command::ToggleSelect,
            KeyCode::Char('a') => Command::ArchiveSelected,
            KeyCode::Char('e') => Command::ExportSelected,
            KeyCode::BackTab => Command::PrevTab,
            KeyCode::Tab if shift => Command::PrevTab,
            KeyCode::Tab => Command::NextTab,
            KeyCode::Char('p') => Command::CyclePriority,
            KeyCode::Char('t') => Command::CycleTag,
            KeyCode::Char('f') => Command::CycleFeedFilter,
            KeyCode::PageUp => Command::FeedOlder,
            KeyCode::PageDown => Command::FeedNewer,
            KeyCode::End => Command::FeedLatest,
            KeyCode::Char('r') => Command::Refresh,
            KeyCode::Char('?') => Command::ToggleHelp,
            KeyCode::Char('q') => Command::Quit,
            _ => return None,
        };
        Some(command)
    }
}
