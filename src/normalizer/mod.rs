//! Session normalizer
//!
//! Pure mapping from raw gateway records to canonical [`Agent`] values.
//! Noise records (system kinds, heartbeats, cron runs) are dropped first;
//! everything else gets documented defaults for missing fields.

use crate::agent::{Agent, AgentStatus, Priority, TokenSample};
use crate::gateway::RemoteSessionSnapshot;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;

/// Model id used when the record does not name one
pub const UNKNOWN_MODEL: &str = "unknown";

/// Progress line used when a session has no usable assistant output
pub const NO_PROGRESS: &str = "No recent output";

/// Record kinds that never represent an agent
const EXCLUDED_KINDS: &[&str] = &["system", "internal", "heartbeat", "cron"];

/// Label fragments marking scheduler or keep-alive sessions
const NOISE_PATTERNS: &[&str] = &["heartbeat", "cron:", ":cron", "[cron]"];

/// Prefixes stripped from display names, matched case-insensitively
const LABEL_PREFIXES: &[&str] = &["agent:", "session:", "subagent:", "main:", "task:"];

const LABEL_SEPARATORS: &[char] = &[':', '|', '/', '-', '>', '›', '·', '•'];

/// Tunables for normalization
#[derive(Debug, Clone)]
pub struct NormalizerConfig {
    /// Idle time after which a session counts as completed
    pub idle_threshold: Duration,
    /// How many assistant messages become progress lines
    pub progress_entries: usize,
    /// Maximum characters per progress line
    pub progress_max_chars: usize,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            idle_threshold: Duration::minutes(60),
            progress_entries: 5,
            progress_max_chars: 120,
        }
    }
}

/// Normalize a snapshot. Order of surviving records is preserved and the
/// first record wins when a key repeats.
pub fn normalize(
    sessions: &[RemoteSessionSnapshot],
    now: DateTime<Utc>,
    config: &NormalizerConfig,
) -> Vec<Agent> {
    let mut seen = HashSet::new();
    sessions
        .iter()
        .filter(|s| !is_excluded(s))
        .filter(|s| seen.insert(s.key.clone()))
        .map(|s| normalize_one(s, now, config))
        .collect()
}

/// Whether a record is system noise rather than an agent
pub fn is_excluded(session: &RemoteSessionSnapshot) -> bool {
    if session.key.trim().is_empty() {
        return true;
    }

    if let Some(kind) = session.kind.as_deref() {
        let kind = kind.trim().to_ascii_lowercase();
        if EXCLUDED_KINDS.contains(&kind.as_str()) {
            return true;
        }
    }

    let key = session.key.to_lowercase();
    let label = session.display_name.as_deref().unwrap_or_default().to_lowercase();
    NOISE_PATTERNS
        .iter()
        .any(|p| key.contains(p) || label.contains(p))
}

fn normalize_one(
    session: &RemoteSessionSnapshot,
    now: DateTime<Utc>,
    config: &NormalizerConfig,
) -> Agent {
    let updated_at = session
        .updated_at
        .and_then(DateTime::from_timestamp_millis)
        .unwrap_or(now);

    let earliest_message = session
        .recent_messages
        .iter()
        .filter_map(|m| m.timestamp)
        .min()
        .and_then(DateTime::from_timestamp_millis);
    let created_at = session
        .created_at
        .and_then(DateTime::from_timestamp_millis)
        .or(earliest_message)
        .unwrap_or(updated_at)
        .min(updated_at);

    let tokens = session.total_tokens.unwrap_or(0);
    let model = session
        .model
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or(UNKNOWN_MODEL)
        .to_string();

    Agent {
        id: session.key.clone(),
        status: infer_status(session, updated_at, now, config.idle_threshold),
        task: task_label(session),
        progress: progress_entries(session, config),
        model,
        tokens,
        token_history: vec![TokenSample { at: updated_at, tokens }],
        created_at,
        updated_at,
        dependencies: Vec::new(),
        estimated_completion: None,
        priority: Priority::Medium,
        tags: tags(session),
        channel: session.channel.clone().filter(|c| !c.trim().is_empty()),
        archived: false,
    }
}

/// Explicit error wins; otherwise idle time decides between active and completed
fn infer_status(
    session: &RemoteSessionSnapshot,
    updated_at: DateTime<Utc>,
    now: DateTime<Utc>,
    idle_threshold: Duration,
) -> AgentStatus {
    if session
        .last_error
        .as_deref()
        .is_some_and(|e| !e.trim().is_empty())
    {
        return AgentStatus::Failed;
    }

    if now - updated_at > idle_threshold {
        AgentStatus::Completed
    } else {
        AgentStatus::Active
    }
}

/// Readable task label from the display name (or key)
pub fn task_label(session: &RemoteSessionSnapshot) -> String {
    let raw = session
        .display_name
        .as_deref()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or(&session.key);

    let channel_prefix = session
        .channel
        .as_deref()
        .map(|c| c.trim().to_ascii_lowercase())
        .filter(|c| !c.is_empty());

    let mut label = raw.trim();
    loop {
        let lower = label.to_ascii_lowercase();
        let prefix_len = LABEL_PREFIXES
            .iter()
            .find(|p| lower.starts_with(*p))
            .map(|p| p.len())
            .or_else(|| {
                let channel = channel_prefix.as_deref()?;
                let rest = lower.strip_prefix(channel)?;
                rest.starts_with(LABEL_SEPARATORS).then_some(channel.len())
            });

        match prefix_len {
            Some(len) => {
                label = label[len..].trim_start_matches(|c: char| {
                    c.is_whitespace() || LABEL_SEPARATORS.contains(&c)
                });
            }
            None => break,
        }
    }

    let label = label
        .trim_matches(|c: char| c.is_whitespace() || LABEL_SEPARATORS.contains(&c))
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    if label.is_empty() {
        session.key.clone()
    } else {
        label
    }
}

fn progress_entries(session: &RemoteSessionSnapshot, config: &NormalizerConfig) -> Vec<String> {
    let lines: Vec<String> = session
        .recent_messages
        .iter()
        .filter(|m| m.is_assistant())
        .map(|m| m.text().split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|text| !text.is_empty())
        .collect();

    let skip = lines.len().saturating_sub(config.progress_entries);
    let mut progress: Vec<String> = lines
        .into_iter()
        .skip(skip)
        .map(|line| truncate(&line, config.progress_max_chars))
        .collect();

    if progress.is_empty() {
        progress.push(NO_PROGRESS.to_string());
    }
    progress
}

/// Truncate to at most `max` characters, marking the cut with an ellipsis
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    if max == 0 {
        return String::new();
    }
    let mut out: String = text.chars().take(max - 1).collect();
    out.push('…');
    out
}

fn tags(session: &RemoteSessionSnapshot) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for value in [session.channel.as_deref(), session.kind.as_deref()]
        .into_iter()
        .flatten()
    {
        let tag = value.trim().to_lowercase();
        if !tag.is_empty() && !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}
