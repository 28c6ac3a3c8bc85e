//! Activity feed
//!
//! Bounded, append-only log of agent state transitions. Oldest entries are
//! evicted first once capacity is reached; filters only narrow the view.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// Default number of retained events
pub const DEFAULT_CAPACITY: usize = 200;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Spawned,
    StatusChanged,
    Completed,
    Failed,
    ProgressUpdate,
}

impl ActivityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActivityKind::Spawned => "spawned",
            ActivityKind::StatusChanged => "status_changed",
            ActivityKind::Completed => "completed",
            ActivityKind::Failed => "failed",
            ActivityKind::ProgressUpdate => "progress_update",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    pub agent_id: String,
    pub timestamp: DateTime<Utc>,
    pub description: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl ActivityEvent {
    pub fn new(kind: ActivityKind, agent_id: impl Into<String>, description: impl Into<String>) -> Self {
        let timestamp = Utc::now();
        Self {
            id: generate_event_id(timestamp),
            kind,
            agent_id: agent_id.into(),
            timestamp,
            description: description.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Generate a local event id: `evt-<millis>-<hex>`
pub fn generate_event_id(at: DateTime<Utc>) -> String {
    format!("evt-{}-{:04x}", at.timestamp_millis(), rand::random::<u16>())
}

/// Which events the feed view shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActivityFilter {
    #[default]
    All,
    Errors,
    Completed,
}

impl ActivityFilter {
    pub fn matches(self, event: &ActivityEvent) -> bool {
        match self {
            ActivityFilter::All => true,
            ActivityFilter::Errors => event.kind == ActivityKind::Failed,
            ActivityFilter::Completed => event.kind == ActivityKind::Completed,
        }
    }

    pub fn next(self) -> Self {
        match self {
            ActivityFilter::All => ActivityFilter::Errors,
            ActivityFilter::Errors => ActivityFilter::Completed,
            ActivityFilter::Completed => ActivityFilter::All,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ActivityFilter::All => "all",
            ActivityFilter::Errors => "errors",
            ActivityFilter::Completed => "completed",
        }
    }
}

/// Ring buffer of activity events plus the view's scroll state
pub struct ActivityFeed {
    events: VecDeque<ActivityEvent>,
    capacity: usize,
    /// Which events the view shows
    filter: ActivityFilter,
    /// Follow the newest event
    auto_scroll: bool,
    /// Filtered rows scrolled up from the newest event while not following
    scroll_offset: usize,
}

impl ActivityFeed {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
            filter: ActivityFilter::All,
            auto_scroll: true,
            scroll_offset: 0,
        }
    }

    /// Append an event (newest last), evicting the oldest beyond capacity.
    ///
    /// Timestamps are clamped so storage order stays non-decreasing.
    pub fn record(&mut self, mut event: ActivityEvent) {
        if let Some(last) = self.events.back() {
            if event.timestamp < last.timestamp {
                event.timestamp = last.timestamp;
            }
        }
        // keep a paused viewport on the same rows; hidden events don't shift it
        if !self.auto_scroll && self.filter.matches(&event) {
            self.scroll_offset += 1;
        }
        self.events.push_back(event);
        while self.events.len() > self.capacity {
            self.events.pop_front();
        }
    }

    pub fn record_all(&mut self, events: impl IntoIterator<Item = ActivityEvent>) {
        for event in events {
            self.record(event);
        }
    }

    /// Filtered events, oldest first
    pub fn events(&self, filter: ActivityFilter) -> Vec<&ActivityEvent> {
        self.events.iter().filter(|e| filter.matches(e)).collect()
    }

    pub fn latest(&self) -> Option<&ActivityEvent> {
        self.events.back()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn filter(&self) -> ActivityFilter {
        self.filter
    }

    /// Switch the view filter and follow the newest event again
    pub fn set_filter(&mut self, filter: ActivityFilter) {
        self.filter = filter;
        self.jump_to_latest();
    }

    pub fn is_auto_scroll(&self) -> bool {
        self.auto_scroll
    }

    /// Manual scroll towards older events; stops following
    pub fn scroll_up(&mut self, rows: usize) {
        self.auto_scroll = false;
        self.scroll_offset = self.scroll_offset.saturating_add(rows).min(self.events.len());
    }

    /// Manual scroll towards newer events; following resumes only via
    /// [`ActivityFeed::jump_to_latest`]
    pub fn scroll_down(&mut self, rows: usize) {
        self.auto_scroll = false;
        self.scroll_offset = self.scroll_offset.saturating_sub(rows);
    }

    pub fn jump_to_latest(&mut self) {
        self.auto_scroll = true;
        self.scroll_offset = 0;
    }

    /// Window of at most `height` events under the view filter, oldest first
    pub fn visible(&self, height: usize) -> Vec<&ActivityEvent> {
        let filtered = self.events(self.filter);
        let offset = if self.auto_scroll {
            0
        } else {
            self.scroll_offset.min(filtered.len().saturating_sub(height))
        };
        let end = filtered.len() - offset;
        let start = end.saturating_sub(height);
        filtered[start..end].to_vec()
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.jump_to_latest();
    }
}

impl Default for ActivityFeed {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn event(n: usize, kind: ActivityKind) -> ActivityEvent {
        ActivityEvent::new(kind, format!("agent-{}", n), format!("event {}", n))
    }

    #[test]
    fn test_fifo_eviction() {
        let mut feed = ActivityFeed::new(3);
        for n in 0..5 {
            feed.record(event(n, ActivityKind::Spawned));
        }
        assert_eq!(feed.len(), 3);
        let agents: Vec<_> = feed.events(ActivityFilter::All).iter().map(|e| e.agent_id.clone()).collect();
        assert_eq!(agents, vec!["agent-2", "agent-3", "agent-4"]);
    }

    #[test]
    fn test_timestamps_never_decrease() {
        let mut feed = ActivityFeed::new(10);
        let now = Utc::now();
        feed.record(event(0, ActivityKind::Spawned).at(now));
        feed.record(event(1, ActivityKind::Spawned).at(now - Duration::seconds(30)));
        feed.record(event(2, ActivityKind::Spawned).at(now + Duration::seconds(1)));
        let stamps: Vec<_> = feed.events(ActivityFilter::All).iter().map(|e| e.timestamp).collect();
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(stamps[1], now);
    }

    #[test]
    fn test_filters_do_not_mutate_log() {
        let mut feed = ActivityFeed::new(10);
        feed.record(event(0, ActivityKind::Failed));
        feed.record(event(1, ActivityKind::Completed));
        feed.record(event(2, ActivityKind::StatusChanged));

        assert_eq!(feed.events(ActivityFilter::Errors).len(), 1);
        assert_eq!(feed.events(ActivityFilter::Completed).len(), 1);
        assert_eq!(feed.events(ActivityFilter::All).len(), 3);
        assert_eq!(feed.len(), 3);
    }

    #[test]
    fn test_auto_scroll_suspends_and_resumes() {
        let mut feed = ActivityFeed::new(50);
        for n in 0..10 {
            feed.record(event(n, ActivityKind::ProgressUpdate));
        }
        let tail: Vec<_> = feed.visible(3).iter().map(|e| e.agent_id.clone()).collect();
        assert_eq!(tail, vec!["agent-7", "agent-8", "agent-9"]);

        feed.scroll_up(2);
        assert!(!feed.is_auto_scroll());
        let window: Vec<_> = feed.visible(3).iter().map(|e| e.agent_id.clone()).collect();
        assert_eq!(window, vec!["agent-5", "agent-6", "agent-7"]);

        // new events do not move the manual viewport
        feed.record(event(10, ActivityKind::ProgressUpdate));
        let window: Vec<_> = feed.visible(3).iter().map(|e| e.agent_id.clone()).collect();
        assert_eq!(window, vec!["agent-5", "agent-6", "agent-7"]);

        // scrolling back to the bottom does not re-enable following
        feed.scroll_down(10);
        assert!(!feed.is_auto_scroll());

        feed.jump_to_latest();
        assert!(feed.is_auto_scroll());
        let tail: Vec<_> = feed.visible(1).iter().map(|e| e.agent_id.clone()).collect();
        assert_eq!(tail, vec!["agent-10"]);
    }

    #[test]
    fn test_visible_clamps_offset() {
        let mut feed = ActivityFeed::new(50);
        for n in 0..4 {
            feed.record(event(n, ActivityKind::Spawned));
        }
        feed.scroll_up(100);
        let window: Vec<_> = feed.visible(3).iter().map(|e| e.agent_id.clone()).collect();
        assert_eq!(window, vec!["agent-0", "agent-1", "agent-2"]);
        feed.set_filter(ActivityFilter::Errors);
        assert!(feed.visible(3).is_empty());
    }

    #[test]
    fn test_paused_window_ignores_hidden_events() {
        let mut feed = ActivityFeed::new(50);
        feed.set_filter(ActivityFilter::Errors);
        for n in 0..6 {
            feed.record(event(n, ActivityKind::Failed));
        }
        feed.scroll_up(1);
        let window = |feed: &ActivityFeed| -> Vec<String> {
            feed.visible(3).iter().map(|e| e.agent_id.clone()).collect()
        };
        assert_eq!(window(&feed), vec!["agent-2", "agent-3", "agent-4"]);

        feed.record(event(6, ActivityKind::ProgressUpdate));
        feed.record(event(7, ActivityKind::ProgressUpdate));
        assert_eq!(window(&feed), vec!["agent-2", "agent-3", "agent-4"]);

        feed.record(event(8, ActivityKind::Failed));
        assert_eq!(window(&feed), vec!["agent-2", "agent-3", "agent-4"]);
    }

    #[test]
    fn test_event_serializes_with_type_field() {
        let e = event(1, ActivityKind::StatusChanged).with_meta("from", "active");
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["type"], "status_changed");
        assert_eq!(json["agentId"], "agent-1");
        assert_eq!(json["metadata"]["from"], "active");
    }
}
