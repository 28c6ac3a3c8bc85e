//! Action dispatcher
//!
//! Runs kill/archive/export over a list of agents strictly in order, one
//! call at a time. Every item gets its own outcome; a failure never aborts
//! the rest of the batch. Only one batch may run at a time.
//!
//! Sequential processing bounds load on the gateway and keeps the activity
//! feed deterministic. A bounded worker pool would raise throughput at the
//! cost of that ordering.

pub mod export;

pub use export::{ExportSink, JsonFileExporter};

use crate::agent::Agent;
use crate::gateway::AgentActions;
use crate::{FleetError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Kill,
    Archive,
    Export,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Kill => "kill",
            ActionKind::Archive => "archive",
            ActionKind::Export => "export",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A batch of agents to act on, processed in the given order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkActionRequest {
    pub kind: ActionKind,
    pub agent_ids: Vec<String>,
}

impl BulkActionRequest {
    pub fn new(kind: ActionKind, agent_ids: Vec<String>) -> Self {
        Self { kind, agent_ids }
    }

    pub fn single(kind: ActionKind, agent_id: impl Into<String>) -> Self {
        Self {
            kind,
            agent_ids: vec![agent_id.into()],
        }
    }
}

/// Final result for one agent of a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutcome {
    pub kind: ActionKind,
    pub agent_id: String,
    /// `None` on success
    pub error: Option<String>,
}

impl ActionOutcome {
    pub fn succeeded(kind: ActionKind, agent_id: impl Into<String>) -> Self {
        Self {
            kind,
            agent_id: agent_id.into(),
            error: None,
        }
    }

    pub fn failed(kind: ActionKind, agent_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            kind,
            agent_id: agent_id.into(),
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Everything that happened in one batch
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub kind: ActionKind,
    pub outcomes: Vec<ActionOutcome>,
    /// Export artifact, when one was written
    pub artifact: Option<PathBuf>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// One message for the whole batch, if anything failed
    pub fn aggregated_error(&self) -> Option<String> {
        let first = self.outcomes.iter().find_map(|o| o.error.as_deref())?;
        Some(format!(
            "{} failed for {} of {} agents: {}",
            self.kind,
            self.failed(),
            self.outcomes.len(),
            first
        ))
    }
}

#[derive(Default)]
struct DispatchState {
    processing: AtomicBool,
    last_error: Mutex<Option<String>>,
}

impl DispatchState {
    fn set_last_error(&self, value: Option<String>) {
        if let Ok(mut last) = self.last_error.lock() {
            *last = value;
        }
    }
}

/// Clears the processing flag however the batch ends
struct ProcessingGuard(Arc<DispatchState>);

impl Drop for ProcessingGuard {
    fn drop(&mut self) {
        self.0.processing.store(false, Ordering::SeqCst);
    }
}

/// Cheap to clone; clones share the processing flag and last error
#[derive(Clone)]
pub struct ActionDispatcher {
    actions: Arc<dyn AgentActions>,
    exporter: Arc<dyn ExportSink>,
    state: Arc<DispatchState>,
}

impl ActionDispatcher {
    pub fn new(actions: Arc<dyn AgentActions>, exporter: Arc<dyn ExportSink>) -> Self {
        Self {
            actions,
            exporter,
            state: Arc::new(DispatchState::default()),
        }
    }

    /// True for the whole duration of a batch
    pub fn is_processing(&self) -> bool {
        self.state.processing.load(Ordering::SeqCst)
    }

    /// Aggregated failure message of the most recent batch
    pub fn last_error(&self) -> Option<String> {
        self.state.last_error.lock().ok().and_then(|e| e.clone())
    }

    /// Run a batch against the agents in `agents`.
    ///
    /// `on_outcome` sees every outcome in request order as soon as it is
    /// known. Fails with [`FleetError::Busy`] if another batch is running.
    pub async fn execute<F>(
        &self,
        request: BulkActionRequest,
        agents: &[Agent],
        mut on_outcome: F,
    ) -> Result<BatchReport>
    where
        F: FnMut(&ActionOutcome) + Send,
    {
        if self.state.processing.swap(true, Ordering::SeqCst) {
            return Err(FleetError::Busy);
        }
        let _guard = ProcessingGuard(self.state.clone());
        self.state.set_last_error(None);

        tracing::info!(
            "Dispatching {} for {} agent(s)",
            request.kind,
            request.agent_ids.len()
        );

        let (outcomes, artifact) = match request.kind {
            ActionKind::Export => self.run_export(&request, agents, &mut on_outcome).await,
            kind => (self.run_remote(kind, &request.agent_ids, agents, &mut on_outcome).await, None),
        };

        let report = BatchReport {
            kind: request.kind,
            outcomes,
            artifact,
        };
        if let Some(message) = report.aggregated_error() {
            tracing::warn!("{}", message);
            self.state.set_last_error(Some(message));
        }
        Ok(report)
    }

    async fn run_remote<F>(
        &self,
        kind: ActionKind,
        agent_ids: &[String],
        agents: &[Agent],
        on_outcome: &mut F,
    ) -> Vec<ActionOutcome>
    where
        F: FnMut(&ActionOutcome) + Send,
    {
        let mut outcomes = Vec::with_capacity(agent_ids.len());
        for id in agent_ids {
            let outcome = if !agents.iter().any(|a| &a.id == id) {
                ActionOutcome::failed(kind, id, "agent not found")
            } else {
                let result = match kind {
                    ActionKind::Kill => self.actions.kill(id).await,
                    _ => self.actions.archive(id).await,
                };
                match result {
                    Ok(()) => ActionOutcome::succeeded(kind, id),
                    Err(FleetError::Action { message, .. }) => ActionOutcome::failed(kind, id, message),
                    Err(e) => ActionOutcome::failed(kind, id, e.to_string()),
                }
            };
            if let Some(error) = &outcome.error {
                tracing::warn!("{} {} failed: {}", kind, id, error);
            }
            on_outcome(&outcome);
            outcomes.push(outcome);
        }
        outcomes
    }

    async fn run_export<F>(
        &self,
        request: &BulkActionRequest,
        agents: &[Agent],
        on_outcome: &mut F,
    ) -> (Vec<ActionOutcome>, Option<PathBuf>)
    where
        F: FnMut(&ActionOutcome) + Send,
    {
        let found: Vec<Option<&Agent>> = request
            .agent_ids
            .iter()
            .map(|id| agents.iter().find(|a| &a.id == id))
            .collect();
        let exported: Vec<Agent> = found.iter().flatten().map(|a| (*a).clone()).collect();

        let written = if exported.is_empty() {
            Ok(None)
        } else {
            self.exporter.export(&exported).await.map(Some)
        };

        let mut outcomes = Vec::with_capacity(request.agent_ids.len());
        for (id, agent) in request.agent_ids.iter().zip(&found) {
            let outcome = match (agent, &written) {
                (None, _) => ActionOutcome::failed(ActionKind::Export, id, "agent not found"),
                (Some(_), Ok(_)) => ActionOutcome::succeeded(ActionKind::Export, id),
                (Some(_), Err(e)) => ActionOutcome::failed(ActionKind::Export, id, e.to_string()),
            };
            on_outcome(&outcome);
            outcomes.push(outcome);
        }

        let artifact = written.ok().flatten();
        if let Some(path) = &artifact {
            tracing::info!("Exported {} agent(s) to {}", exported.len(), path.display());
        }
        (outcomes, artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::tests::agent;
    use crate::agent::AgentStatus;
    use async_trait::async_trait;
    use std::path::Path;
    use tokio::sync::Notify;

    /// Records calls; ids listed in `fail` return an action error
    #[derive(Default)]
    struct FakeActions {
        calls: Mutex<Vec<String>>,
        fail: Vec<String>,
        gate: Option<Arc<Notify>>,
    }

    impl FakeActions {
        fn failing(ids: &[&str]) -> Self {
            Self {
                fail: ids.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            }
        }

        async fn call(&self, action: &str, id: &str) -> Result<()> {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.calls.lock().unwrap().push(format!("{} {}", action, id));
            if self.fail.iter().any(|f| f == id) {
                return Err(FleetError::Action {
                    agent_id: id.to_string(),
                    message: "remote refused".to_string(),
                });
            }
            Ok(())
        }
    }

    #[async_trait]
    impl AgentActions for FakeActions {
        async fn kill(&self, agent_id: &str) -> Result<()> {
            self.call("kill", agent_id).await
        }

        async fn archive(&self, agent_id: &str) -> Result<()> {
            self.call("archive", agent_id).await
        }
    }

    struct FailingExporter;

    #[async_trait]
    impl ExportSink for FailingExporter {
        async fn export(&self, _agents: &[Agent]) -> Result<PathBuf> {
            Err(FleetError::Export("disk full".to_string()))
        }
    }

    fn fleet(ids: &[&str]) -> Vec<Agent> {
        ids.iter().map(|id| agent(id, AgentStatus::Active)).collect()
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn dispatcher(actions: Arc<FakeActions>, export_dir: &Path) -> ActionDispatcher {
        ActionDispatcher::new(actions, Arc::new(JsonFileExporter::new(export_dir)))
    }

    #[tokio::test]
    async fn test_failure_is_isolated_per_item() {
        let dir = tempfile::tempdir().unwrap();
        let actions = Arc::new(FakeActions::failing(&["b"]));
        let d = dispatcher(actions.clone(), dir.path());
        let agents = fleet(&["a", "b", "c"]);

        let mut seen = Vec::new();
        let report = d
            .execute(BulkActionRequest::new(ActionKind::Kill, ids(&["a", "b", "c"])), &agents, |o| {
                seen.push((o.agent_id.clone(), o.is_success()))
            })
            .await
            .unwrap();

        assert_eq!(
            seen,
            vec![("a".to_string(), true), ("b".to_string(), false), ("c".to_string(), true)]
        );
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), 1);
        assert_eq!(*actions.calls.lock().unwrap(), vec!["kill a", "kill b", "kill c"]);
        assert_eq!(
            d.last_error().as_deref(),
            Some("kill failed for 1 of 3 agents: remote refused")
        );
        assert!(!d.is_processing());
    }

    #[tokio::test]
    async fn test_last_error_cleared_by_next_batch() {
        let dir = tempfile::tempdir().unwrap();
        let d = dispatcher(Arc::new(FakeActions::failing(&["x"])), dir.path());
        let agents = fleet(&["x", "y"]);

        d.execute(BulkActionRequest::single(ActionKind::Archive, "x"), &agents, |_| {})
            .await
            .unwrap();
        assert!(d.last_error().is_some());

        let report = d
            .execute(BulkActionRequest::single(ActionKind::Archive, "y"), &agents, |_| {})
            .await
            .unwrap();
        assert_eq!(report.failed(), 0);
        assert!(d.last_error().is_none());
    }

    #[tokio::test]
    async fn test_unknown_agent_fails_without_remote_call() {
        let dir = tempfile::tempdir().unwrap();
        let actions = Arc::new(FakeActions::default());
        let d = dispatcher(actions.clone(), dir.path());

        let report = d
            .execute(BulkActionRequest::single(ActionKind::Kill, "ghost"), &fleet(&["a"]), |_| {})
            .await
            .unwrap();
        assert_eq!(report.outcomes[0].error.as_deref(), Some("agent not found"));
        assert!(actions.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_second_batch_rejected_while_processing() {
        let dir = tempfile::tempdir().unwrap();
        let gate = Arc::new(Notify::new());
        let actions = Arc::new(FakeActions {
            gate: Some(gate.clone()),
            ..Default::default()
        });
        let d = dispatcher(actions, dir.path());
        let agents = fleet(&["a"]);

        let running = {
            let d = d.clone();
            let agents = agents.clone();
            tokio::spawn(async move {
                d.execute(BulkActionRequest::single(ActionKind::Kill, "a"), &agents, |_| {})
                    .await
            })
        };

        while !d.is_processing() {
            tokio::task::yield_now().await;
        }
        let rejected = d
            .execute(BulkActionRequest::single(ActionKind::Kill, "a"), &agents, |_| {})
            .await;
        assert!(matches!(rejected, Err(FleetError::Busy)));

        gate.notify_one();
        let report = running.await.unwrap().unwrap();
        assert_eq!(report.succeeded(), 1);
        assert!(!d.is_processing());
    }

    #[tokio::test]
    async fn test_export_writes_one_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let d = dispatcher(Arc::new(FakeActions::default()), dir.path());
        let agents = fleet(&["a", "b"]);

        let report = d
            .execute(BulkActionRequest::new(ActionKind::Export, ids(&["b", "zzz", "a"])), &agents, |_| {})
            .await
            .unwrap();

        let results: Vec<_> = report.outcomes.iter().map(|o| o.is_success()).collect();
        assert_eq!(results, vec![true, false, true]);
        let path = report.artifact.expect("artifact written");
        let body: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        let exported: Vec<_> = body["agents"]
            .as_array()
            .unwrap()
            .iter()
            .map(|a| a["id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(exported, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_export_failure_marks_every_item() {
        let d = ActionDispatcher::new(Arc::new(FakeActions::default()), Arc::new(FailingExporter));
        let agents = fleet(&["a", "b"]);
        let report = d
            .execute(BulkActionRequest::new(ActionKind::Export, ids(&["a", "b"])), &agents, |_| {})
            .await
            .unwrap();
        assert_eq!(report.failed(), 2);
        assert!(report.artifact.is_none());
        assert!(d.last_error().unwrap().starts_with("export failed for 2 of 2 agents"));
    }
}
