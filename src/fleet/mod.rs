//! Live agent set
//!
//! Sole owner of the working agent set. Each live snapshot replaces the set
//! wholesale (last write wins); the bundled demo fleet is shown only until
//! the first live snapshot. Other components read projections and change
//! the set only through optimistic action updates.

use crate::activity::{ActivityEvent, ActivityKind};
use crate::agent::demo::demo_agents;
use crate::agent::{Agent, AgentStatus, TokenSample};
use crate::dispatch::{ActionKind, ActionOutcome};
use crate::reconcile::StatusTab;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};

pub struct FleetState {
    agents: Vec<Agent>,
    /// Last live snapshot as received, before any optimistic edits
    live: Vec<Agent>,
    token_history: HashMap<String, Vec<TokenSample>>,
    history_len: usize,
    demo: bool,
}

impl FleetState {
    /// Start out showing the demo fleet
    pub fn new(history_len: usize) -> Self {
        Self {
            agents: demo_agents(Utc::now()),
            live: Vec::new(),
            token_history: HashMap::new(),
            history_len: history_len.max(1),
            demo: true,
        }
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn get(&self, id: &str) -> Option<&Agent> {
        self.agents.iter().find(|a| a.id == id)
    }

    /// True until the first live snapshot has been applied
    pub fn is_demo(&self) -> bool {
        self.demo
    }

    /// Replace the working set with a freshly normalized live snapshot.
    ///
    /// Returns the transitions against the previous live snapshot, not the
    /// optimistically edited working set; the first live snapshot is the
    /// baseline and produces none.
    pub fn apply_live(&mut self, mut agents: Vec<Agent>) -> Vec<ActivityEvent> {
        for agent in &mut agents {
            let history = self.token_history.entry(agent.id.clone()).or_default();
            let changed = history.last().is_none_or(|s| s.tokens != agent.tokens);
            if changed {
                let at = history.last().map_or(agent.updated_at, |s| s.at.max(agent.updated_at));
                history.push(TokenSample { at, tokens: agent.tokens });
            }
            if history.len() > self.history_len {
                let excess = history.len() - self.history_len;
                history.drain(..excess);
            }
            agent.token_history = history.clone();
        }
        self.token_history
            .retain(|id, _| agents.iter().any(|a| &a.id == id));

        let events = if self.demo {
            Vec::new()
        } else {
            diff_transitions(&self.live, &agents, Utc::now())
        };

        self.live = agents.clone();
        self.agents = agents;
        self.demo = false;
        events
    }

    /// Optimistic update after a successful per-agent action
    pub fn apply_outcome(&mut self, outcome: &ActionOutcome) {
        if !outcome.is_success() {
            return;
        }
        match outcome.kind {
            ActionKind::Kill => {
                self.remove(&outcome.agent_id);
            }
            ActionKind::Archive => {
                self.mark_archived(&outcome.agent_id);
            }
            ActionKind::Export => {}
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<Agent> {
        let pos = self.agents.iter().position(|a| a.id == id)?;
        self.token_history.remove(id);
        Some(self.agents.remove(pos))
    }

    pub fn mark_archived(&mut self, id: &str) -> bool {
        match self.agents.iter_mut().find(|a| a.id == id) {
            Some(agent) => {
                agent.archived = true;
                agent.status = AgentStatus::Completed;
                true
            }
            None => false,
        }
    }

    /// Number of agents under a status tab
    pub fn count_for(&self, tab: StatusTab) -> usize {
        self.agents.iter().filter(|a| tab.matches(a.status)).count()
    }

    /// Distinct tags across the fleet, sorted
    pub fn tags(&self) -> Vec<String> {
        let tags: BTreeSet<&str> = self
            .agents
            .iter()
            .flat_map(|a| a.tags.iter().map(String::as_str))
            .collect();
        tags.into_iter().map(str::to_string).collect()
    }

    pub fn total_tokens(&self) -> u64 {
        self.agents.iter().map(|a| a.tokens).sum()
    }
}

/// Activity events describing how `next` differs from `prev`
pub fn diff_transitions(prev: &[Agent], next: &[Agent], at: DateTime<Utc>) -> Vec<ActivityEvent> {
    let previous: HashMap<&str, &Agent> = prev.iter().map(|a| (a.id.as_str(), a)).collect();
    let mut events = Vec::new();

    for agent in next {
        let Some(old) = previous.get(agent.id.as_str()) else {
            events.push(
                ActivityEvent::new(ActivityKind::Spawned, &agent.id, format!("Spawned: {}", agent.task))
                    .at(at)
                    .with_meta("status", agent.status.as_str()),
            );
            continue;
        };

        if old.status != agent.status {
            let event = match agent.status {
                AgentStatus::Completed => {
                    ActivityEvent::new(ActivityKind::Completed, &agent.id, format!("Completed: {}", agent.task))
                }
                AgentStatus::Failed => {
                    ActivityEvent::new(ActivityKind::Failed, &agent.id, format!("Failed: {}", agent.task))
                }
                _ => ActivityEvent::new(
                    ActivityKind::StatusChanged,
                    &agent.id,
                    format!("{}: {} → {}", agent.task, old.status, agent.status),
                ),
            };
            events.push(
                event
                    .at(at)
                    .with_meta("from", old.status.as_str())
                    .with_meta("to", agent.status.as_str()),
            );
        } else if old.latest_progress() != agent.latest_progress() {
            let line = agent.latest_progress().unwrap_or_default();
            events.push(
                ActivityEvent::new(ActivityKind::ProgressUpdate, &agent.id, format!("{}: {}", agent.task, line))
                    .at(at),
            );
        }
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::tests::agent;

    fn live(ids: &[(&str, AgentStatus)]) -> Vec<Agent> {
        ids.iter().map(|(id, status)| agent(id, *status)).collect()
    }

    #[test]
    fn test_demo_until_first_live_snapshot() {
        let mut fleet = FleetState::new(10);
        assert!(fleet.is_demo());
        assert!(!fleet.agents().is_empty());

        let events = fleet.apply_live(live(&[("a", AgentStatus::Active)]));
        assert!(events.is_empty());
        assert!(!fleet.is_demo());
        assert_eq!(fleet.agents().len(), 1);
    }

    #[test]
    fn test_empty_snapshot_is_valid() {
        let mut fleet = FleetState::new(10);
        fleet.apply_live(live(&[
            ("a", AgentStatus::Active),
            ("b", AgentStatus::Active),
            ("c", AgentStatus::Active),
        ]));
        fleet.apply_live(Vec::new());
        assert!(fleet.agents().is_empty());
        assert!(!fleet.is_demo());
    }

    #[test]
    fn test_last_applied_snapshot_wins() {
        let push = live(&[("p", AgentStatus::Active)]);
        let poll = live(&[("q", AgentStatus::Active), ("r", AgentStatus::Active)]);

        let mut fleet = FleetState::new(10);
        fleet.apply_live(push.clone());
        fleet.apply_live(poll.clone());
        let ids: Vec<_> = fleet.agents().iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["q", "r"]);

        let mut fleet = FleetState::new(10);
        fleet.apply_live(poll);
        fleet.apply_live(push);
        let ids: Vec<_> = fleet.agents().iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["p"]);
    }

    #[test]
    fn test_transitions_emitted() {
        let mut fleet = FleetState::new(10);
        fleet.apply_live(live(&[
            ("a", AgentStatus::Active),
            ("b", AgentStatus::Active),
            ("c", AgentStatus::Active),
            ("d", AgentStatus::Queued),
        ]));

        let mut next = live(&[
            ("a", AgentStatus::Completed),
            ("b", AgentStatus::Failed),
            ("c", AgentStatus::Active),
            ("d", AgentStatus::Active),
            ("e", AgentStatus::Active),
        ]);
        next[2].progress = vec!["step two".to_string()];

        let events = fleet.apply_live(next);
        let kinds: Vec<_> = events.iter().map(|e| (e.agent_id.as_str(), e.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                ("a", ActivityKind::Completed),
                ("b", ActivityKind::Failed),
                ("c", ActivityKind::ProgressUpdate),
                ("d", ActivityKind::StatusChanged),
                ("e", ActivityKind::Spawned),
            ]
        );
        assert_eq!(events[3].metadata.get("from").map(String::as_str), Some("queued"));
    }

    #[test]
    fn test_token_history_accumulates_on_change() {
        let mut fleet = FleetState::new(3);
        for tokens in [10, 10, 20, 30, 40] {
            let mut a = agent("a", AgentStatus::Active);
            a.tokens = tokens;
            fleet.apply_live(vec![a]);
        }
        let history: Vec<_> = fleet.agents()[0].token_history.iter().map(|s| s.tokens).collect();
        assert_eq!(history, vec![20, 30, 40]);
    }

    #[test]
    fn test_optimistic_updates() {
        let mut fleet = FleetState::new(10);
        fleet.apply_live(live(&[("a", AgentStatus::Active), ("b", AgentStatus::Active)]));

        fleet.apply_outcome(&ActionOutcome::succeeded(ActionKind::Kill, "a"));
        assert!(fleet.get("a").is_none());

        fleet.apply_outcome(&ActionOutcome::failed(ActionKind::Archive, "b", "nope"));
        assert!(!fleet.get("b").unwrap().archived);

        fleet.apply_outcome(&ActionOutcome::succeeded(ActionKind::Archive, "b"));
        let b = fleet.get("b").unwrap();
        assert!(b.archived);
        assert_eq!(b.status, AgentStatus::Completed);
    }

    #[test]
    fn test_killed_agent_still_listed_is_not_respawned() {
        let mut fleet = FleetState::new(10);
        fleet.apply_live(live(&[("a", AgentStatus::Active), ("b", AgentStatus::Active)]));
        fleet.apply_outcome(&ActionOutcome::succeeded(ActionKind::Kill, "a"));

        let events = fleet.apply_live(live(&[("a", AgentStatus::Active), ("b", AgentStatus::Active)]));
        assert!(events.is_empty(), "{:?}", events);
        assert!(fleet.get("a").is_some());
    }

    #[test]
    fn test_archived_agent_does_not_flip_back() {
        let mut fleet = FleetState::new(10);
        fleet.apply_live(live(&[("b", AgentStatus::Active)]));
        fleet.apply_outcome(&ActionOutcome::succeeded(ActionKind::Archive, "b"));
        assert_eq!(fleet.get("b").unwrap().status, AgentStatus::Completed);

        let events = fleet.apply_live(live(&[("b", AgentStatus::Active)]));
        assert!(events.is_empty(), "{:?}", events);

        // real transitions are still reported
        let events = fleet.apply_live(live(&[("b", AgentStatus::Failed)]));
        let kinds: Vec<_> = events.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![ActivityKind::Failed]);
    }

    #[test]
    fn test_counts() {
        let mut fleet = FleetState::new(10);
        let mut agents = live(&[
            ("a", AgentStatus::Active),
            ("b", AgentStatus::Failed),
            ("c", AgentStatus::Active),
        ]);
        agents[0].tokens = 5;
        agents[1].tokens = 7;
        fleet.apply_live(agents);
        assert_eq!(fleet.count_for(StatusTab::All), 3);
        assert_eq!(fleet.count_for(StatusTab::Active), 2);
        assert_eq!(fleet.count_for(StatusTab::Queued), 0);
        assert_eq!(fleet.total_tokens(), 12);
    }

    #[test]
    fn test_tags_are_distinct_and_sorted() {
        let mut fleet = FleetState::new(10);
        let mut agents = live(&[("a", AgentStatus::Active), ("b", AgentStatus::Active)]);
        agents[0].tags = vec!["ops".to_string(), "cli".to_string()];
        agents[1].tags = vec!["cli".to_string()];
        fleet.apply_live(agents);
        assert_eq!(fleet.tags(), vec!["cli", "ops"]);
    }
}
