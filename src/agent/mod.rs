//! Canonical agent entity
//!
//! Every snapshot from the gateway is normalized into a fresh set of
//! [`Agent`] values. Agents are never patched in place across snapshots.

pub mod demo;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of an agent
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Agent is running and working
    Active,
    /// Agent is waiting to start
    Queued,
    /// Agent finished (or went idle long enough to be considered finished)
    Completed,
    /// Agent reported an error
    Failed,
}

impl AgentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentStatus::Active => "active",
            AgentStatus::Queued => "queued",
            AgentStatus::Completed => "completed",
            AgentStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Operator-facing priority, used only for filtering
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "low" => Some(Priority::Low),
            "medium" | "med" => Some(Priority::Medium),
            "high" => Some(Priority::High),
            _ => None,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One point of the token trend series
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TokenSample {
    pub at: DateTime<Utc>,
    pub tokens: u64,
}

/// A remote agent session as shown on the dashboard
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    /// Stable id, unique within a snapshot
    pub id: String,
    pub status: AgentStatus,
    /// Human readable task label
    pub task: String,
    /// Most recent progress lines, oldest first; never empty
    pub progress: Vec<String>,
    pub model: String,
    pub tokens: u64,
    /// Time-ordered token counter samples
    pub token_history: Vec<TokenSample>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_completion: Option<DateTime<Utc>>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    /// Set optimistically after a successful archive
    #[serde(default)]
    pub archived: bool,
}

impl Agent {
    /// Latest progress line
    pub fn latest_progress(&self) -> Option<&str> {
        self.progress.last().map(String::as_str)
    }

    /// Case-insensitive match against id, task, model and tags
    pub fn matches_text(&self, needle: &str) -> bool {
        let needle = needle.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        self.id.to_lowercase().contains(&needle)
            || self.task.to_lowercase().contains(&needle)
            || self.model.to_lowercase().contains(&needle)
            || self.tags.iter().any(|t| t.to_lowercase().contains(&needle))
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn agent(id: &str, status: AgentStatus) -> Agent {
        let now = Utc::now();
        Agent {
            id: id.to_string(),
            status,
            task: format!("task {}", id),
            progress: vec!["working".to_string()],
            model: "test-model".to_string(),
            tokens: 0,
            token_history: vec![],
            created_at: now,
            updated_at: now,
            dependencies: vec![],
            estimated_completion: None,
            priority: Priority::Medium,
            tags: vec![],
            channel: None,
            archived: false,
        }
    }

    #[test]
    fn test_matches_text_is_case_insensitive() {
        let mut a = agent("alpha", AgentStatus::Active);
        a.task = "Refactor Parser".to_string();
        a.tags = vec!["Discord".to_string()];
        assert!(a.matches_text("parser"));
        assert!(a.matches_text("DISCORD"));
        assert!(a.matches_text("  "));
        assert!(!a.matches_text("billing"));
    }

    #[test]
    fn test_priority_parse() {
        assert_eq!(Priority::from_str("HIGH"), Some(Priority::High));
        assert_eq!(Priority::from_str("med"), Some(Priority::Medium));
        assert_eq!(Priority::from_str("urgent"), None);
    }
}
