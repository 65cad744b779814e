// issue-ops library - issue-driven workflow orchestration
// This exposes the core components for the CLI, tests and integrations

pub mod cli;
pub mod clock;
pub mod config;
pub mod errors;
pub mod github;
pub mod telemetry;
pub mod workflow;

// Re-export key types for easy access
pub use clock::{Clock, ManualClock, SharedClock};
pub use config::IssueOpsConfig;
pub use errors::{IssueOpsError, Result};
pub use github::{GitHubClient, GitHubError, InMemoryIssueTracker, IssueTracker};
pub use telemetry::{create_workflow_span, generate_correlation_id, init_telemetry};
pub use workflow::{
    Orchestrator, StateStore, TaskTracker, TransitionEvent, TriggerCommand, WorkflowDefinition,
    WorkflowRegistry, WorkflowState,
};
