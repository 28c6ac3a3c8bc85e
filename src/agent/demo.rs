//! Bundled demo fleet, shown until the first live snapshot arrives

use super::{Agent, AgentStatus, Priority, TokenSample};
use chrono::{DateTime, Duration, Utc};

struct DemoSpec {
    id: &'static str,
    status: AgentStatus,
    task: &'static str,
    progress: &'static [&'static str],
    model: &'static str,
    tokens: u64,
    age_mins: i64,
    idle_mins: i64,
    priority: Priority,
    tags: &'static [&'static str],
    dependencies: &'static [&'static str],
    eta_mins: Option<i64>,
}

const DEMO: &[DemoSpec] = &[
    DemoSpec {
        id: "demo-research",
        status: AgentStatus::Active,
        task: "Survey vector store options",
        progress: &["Compared 4 candidates", "Benchmarking recall on sample set"],
        model: "claude-sonnet",
        tokens: 48_200,
        age_mins: 42,
        idle_mins: 1,
        priority: Priority::High,
        tags: &["research", "demo"],
        dependencies: &[],
        eta_mins: Some(15),
    },
    DemoSpec {
        id: "demo-refactor",
        status: AgentStatus::Active,
        task: "Split billing module into services",
        progress: &["Extracted invoice service", "Updating call sites"],
        model: "claude-opus",
        tokens: 131_900,
        age_mins: 95,
        idle_mins: 3,
        priority: Priority::Medium,
        tags: &["code", "demo"],
        dependencies: &["demo-research"],
        eta_mins: Some(40),
    },
    DemoSpec {
        id: "demo-docs",
        status: AgentStatus::Queued,
        task: "Write migration guide",
        progress: &["Waiting for refactor"],
        model: "claude-haiku",
        tokens: 0,
        age_mins: 10,
        idle_mins: 10,
        priority: Priority::Low,
        tags: &["docs", "demo"],
        dependencies: &["demo-refactor"],
        eta_mins: None,
    },
    DemoSpec {
        id: "demo-triage",
        status: AgentStatus::Completed,
        task: "Triage overnight alerts",
        progress: &["Closed 12 duplicates", "Filed 2 incidents"],
        model: "claude-sonnet",
        tokens: 22_450,
        age_mins: 300,
        idle_mins: 180,
        priority: Priority::Medium,
        tags: &["ops", "demo"],
        dependencies: &[],
        eta_mins: None,
    },
    DemoSpec {
        id: "demo-deploy",
        status: AgentStatus::Failed,
        task: "Roll out config change to staging",
        progress: &["Applied to 3 of 5 hosts", "Health check failed on staging-4"],
        model: "claude-sonnet",
        tokens: 9_800,
        age_mins: 60,
        idle_mins: 25,
        priority: Priority::High,
        tags: &["ops", "demo"],
        dependencies: &[],
        eta_mins: None,
    },
];

/// Build the demo fleet relative to `now`
pub fn demo_agents(now: DateTime<Utc>) -> Vec<Agent> {
    DEMO.iter().map(|spec| build(spec, now)).collect()
}

fn build(spec: &DemoSpec, now: DateTime<Utc>) -> Agent {
    let created_at = now - Duration::minutes(spec.age_mins);
    let updated_at = now - Duration::minutes(spec.idle_mins);

    // A gentle ramp up to the current counter
    let token_history = (1..=6u64)
        .map(|step| TokenSample {
            at: created_at + (updated_at - created_at) * (step as i32) / 6,
            tokens: spec.tokens * step / 6,
        })
        .collect();

    Agent {
        id: spec.id.to_string(),
        status: spec.status,
        task: spec.task.to_string(),
        progress: spec.progress.iter().map(|s| s.to_string()).collect(),
        model: spec.model.to_string(),
        tokens: spec.tokens,
        token_history,
        created_at,
        updated_at,
        dependencies: spec.dependencies.iter().map(|s| s.to_string()).collect(),
        estimated_completion: spec.eta_mins.map(|m| now + Duration::minutes(m)),
        priority: spec.priority,
        tags: spec.tags.iter().map(|s| s.to_string()).collect(),
        channel: None,
        archived: false,
    }
}
