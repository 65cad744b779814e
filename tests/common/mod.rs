//! Shared fixtures for the workflow integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use issue_ops::github::InMemoryIssueTracker;
use issue_ops::workflow::{
    Orchestrator, OrchestratorSettings, Stage, StageTransition, StateStore, TaskTracker,
    TransitionEvent, WorkflowDefinition, WorkflowRegistry,
};
use issue_ops::ManualClock;

pub const ISSUE: u64 = 42;

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
}

/// `review` → `approval` → done, both on `task-completed`.
pub fn review_approval() -> WorkflowDefinition {
    WorkflowDefinition::new("review-flow", "Review flow", "Two-step sign-off")
        .with_stage(
            Stage::new("review", "Initial review")
                .with_transition(StageTransition::new(TransitionEvent::TaskCompleted, "approval")),
        )
        .with_stage(
            Stage::new("approval", "Final approval")
                .with_transition(StageTransition::complete(TransitionEvent::TaskCompleted)),
        )
}

pub struct Harness {
    pub tracker: Arc<InMemoryIssueTracker>,
    pub clock: Arc<ManualClock>,
    pub store: Arc<StateStore>,
    pub tasks: Arc<TaskTracker>,
    pub orchestrator: Orchestrator,
}

impl Harness {
    /// Task auto-creation off, so tests only see the writes they cause.
    pub fn new() -> Self {
        Self::with_settings(OrchestratorSettings {
            auto_create_tasks: false,
            ..OrchestratorSettings::default()
        })
    }

    pub fn with_settings(settings: OrchestratorSettings) -> Self {
        Self::build(settings, &[])
    }

    pub fn with_definitions(settings: OrchestratorSettings, extra: &[WorkflowDefinition]) -> Self {
        Self::build(settings, extra)
    }

    fn build(settings: OrchestratorSettings, extra: &[WorkflowDefinition]) -> Self {
        let tracker = Arc::new(InMemoryIssueTracker::new());
        tracker.add_issue(
            ISSUE,
            "Deprecate roads_2019",
            "### Dataset Name\n\nroads_2019\n\n### Reason\n\nSuperseded",
            &["deprecation"],
        );
        let clock = Arc::new(ManualClock::new(start()));

        let mut registry = WorkflowRegistry::with_builtin_definitions().unwrap();
        registry.register(review_approval()).unwrap();
        for definition in extra {
            registry.register(definition.clone()).unwrap();
        }

        let store = Arc::new(StateStore::new(tracker.clone(), clock.clone()));
        let tasks = Arc::new(
            TaskTracker::new(store.clone()).with_task_label(Some("workflow-task".to_string())),
        );
        let orchestrator =
            Orchestrator::new(store.clone(), tasks.clone(), Arc::new(registry), settings);

        Self {
            tracker,
            clock,
            store,
            tasks,
            orchestrator,
        }
    }
}
