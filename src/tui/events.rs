//! Event handling for the TUI

use crossterm::event::{self, Event, KeyEventKind};
use std::time::Duration;

use super::App;
use crate::store::DurableStore;

/// Handle terminal events
/// Returns true if the app should continue running
pub fn handle_events<S: DurableStore>(app: &mut App<S>) -> crate::Result<bool> {
    // Short timeout so snapshots and batch outcomes are picked up promptly
    if event::poll(Duration::from_millis(100))? {
        match event::read()? {
            Event::Key(key) if key.kind != KeyEventKind::Release => app.handle_key(key),
            Event::Mouse(mouse) => match mouse.kind {
                event::MouseEventKind::ScrollUp => app.feed.scroll_up(1),
                event::MouseEventKind::ScrollDown => app.feed.scroll_down(1),
                _ => {}
            },
            _ => {}
        }
    }

    app.drain_dispatch();

    Ok(!app.should_quit)
}
