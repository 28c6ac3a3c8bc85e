//! Display filters
//!
//! Filters are pure predicates over agents. They are persisted alongside
//! the ordering but never touch it.

use crate::agent::{Agent, AgentStatus, Priority};
use serde::{Deserialize, Serialize};

/// Status tab shown above the agent list
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StatusTab {
    #[default]
    All,
    Active,
    Queued,
    Completed,
    Failed,
}

impl StatusTab {
    pub const ALL: [StatusTab; 5] = [
        StatusTab::All,
        StatusTab::Active,
        StatusTab::Queued,
        StatusTab::Completed,
        StatusTab::Failed,
    ];

    pub fn label(self) -> &'static str {
        match self {
            StatusTab::All => "All",
            StatusTab::Active => "Active",
            StatusTab::Queued => "Queued",
            StatusTab::Completed => "Completed",
            StatusTab::Failed => "Failed",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "all" => Some(StatusTab::All),
            "active" => Some(StatusTab::Active),
            "queued" => Some(StatusTab::Queued),
            "completed" | "done" => Some(StatusTab::Completed),
            "failed" | "errors" => Some(StatusTab::Failed),
            _ => None,
        }
    }

    pub fn matches(self, status: AgentStatus) -> bool {
        match self {
            StatusTab::All => true,
            StatusTab::Active => status == AgentStatus::Active,
            StatusTab::Queued => status == AgentStatus::Queued,
            StatusTab::Completed => status == AgentStatus::Completed,
            StatusTab::Failed => status == AgentStatus::Failed,
        }
    }

    pub fn next(self) -> Self {
        let idx = Self::ALL.iter().position(|t| *t == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }

    pub fn prev(self) -> Self {
        let idx = Self::ALL.iter().position(|t| *t == self).unwrap_or(0);
        Self::ALL[idx.checked_sub(1).unwrap_or(Self::ALL.len() - 1)]
    }
}

/// Persisted filter state: status tab plus secondary filters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct FilterState {
    pub tab: StatusTab,
    pub priority: Option<Priority>,
    pub tag: Option<String>,
    /// Free-text search
    pub text: String,
}

impl FilterState {
    pub fn matches(&self, agent: &Agent) -> bool {
        self.tab.matches(agent.status)
            && self.priority.is_none_or(|p| agent.priority == p)
            && self.tag.as_deref().is_none_or(|t| agent.has_tag(t))
            && agent.matches_text(&self.text)
    }

    /// True when nothing besides the status tab narrows the list
    pub fn is_unfiltered(&self) -> bool {
        self.priority.is_none() && self.tag.is_none() && self.text.trim().is_empty()
    }
}

/// Next priority filter in the cycle: off, high, medium, low, off
pub fn next_priority(current: Option<Priority>) -> Option<Priority> {
    match current {
        None => Some(Priority::High),
        Some(Priority::High) => Some(Priority::Medium),
        Some(Priority::Medium) => Some(Priority::Low),
        Some(Priority::Low) => None,
    }
}

/// Next tag filter: off, then each of `tags` in order, then off again.
/// A current tag no longer in `tags` restarts the cycle.
pub fn next_tag(current: Option<&str>, tags: &[String]) -> Option<String> {
    let next = match current {
        None => 0,
        Some(tag) => match tags.iter().position(|t| t.eq_ignore_ascii_case(tag)) {
            Some(idx) => idx + 1,
            None => 0,
        },
    };
    tags.get(next).cloned()
}
