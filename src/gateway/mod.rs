//! Remote gateway protocol
//!
//! The gateway owns the agent sessions. We consume three things from it:
//! a bounded pull of session summaries, a push channel delivering the same
//! shape on change, and per-session actions (kill, archive).

pub mod http;

pub use http::HttpGateway;

use crate::Result;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One message from a session's recent history
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecentMessage {
    #[serde(default)]
    pub role: String,
    /// Either a plain string or a list of content blocks
    #[serde(default)]
    pub content: Value,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

impl RecentMessage {
    /// Flatten the content into plain text
    pub fn text(&self) -> String {
        match &self.content {
            Value::String(s) => s.clone(),
            Value::Array(blocks) => blocks
                .iter()
                .filter_map(|block| match block {
                    Value::String(s) => Some(s.as_str()),
                    Value::Object(obj) => obj.get("text").and_then(Value::as_str),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(" "),
            _ => String::new(),
        }
    }

    pub fn is_assistant(&self) -> bool {
        self.role.eq_ignore_ascii_case("assistant")
    }
}

/// Raw session record as delivered by pull or push
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSessionSnapshot {
    pub key: String,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    /// Epoch milliseconds
    #[serde(default)]
    pub updated_at: Option<i64>,
    /// Epoch milliseconds
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub total_tokens: Option<u64>,
    #[serde(default)]
    pub recent_messages: Vec<RecentMessage>,
    #[serde(default)]
    pub last_error: Option<String>,
}

/// Decode a session array, skipping records that do not parse.
///
/// Accepts either a bare JSON array or an object with a `sessions` array.
pub fn decode_sessions(body: &str) -> Result<Vec<RemoteSessionSnapshot>> {
    let value: Value = serde_json::from_str(body)?;
    Ok(sessions_from_value(value))
}

pub fn sessions_from_value(value: Value) -> Vec<RemoteSessionSnapshot> {
    let records = match value {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("sessions") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };

    records
        .into_iter()
        .filter_map(|record| match serde_json::from_value::<RemoteSessionSnapshot>(record) {
            Ok(session) if !session.key.trim().is_empty() => Some(session),
            Ok(_) => {
                tracing::debug!("Skipping session record without key");
                None
            }
            Err(e) => {
                tracing::warn!("Skipping malformed session record: {}", e);
                None
            }
        })
        .collect()
}

/// Stream of pushed snapshots; ends when the channel closes
pub type PushStream = BoxStream<'static, Result<Vec<RemoteSessionSnapshot>>>;

/// Read side of the gateway
#[async_trait]
pub trait SessionSource: Send + Sync {
    /// Fetch up to `limit` session summaries
    async fn pull(&self, limit: usize) -> Result<Vec<RemoteSessionSnapshot>>;

    /// Open the push channel
    async fn subscribe(&self) -> Result<PushStream>;
}

/// Per-agent operations against the gateway
#[async_trait]
pub trait AgentActions: Send + Sync {
    async fn kill(&self, agent_id: &str) -> Result<()>;

    async fn archive(&self, agent_id: &str) -> Result<()>;
}
