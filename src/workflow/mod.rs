//! Issue-driven workflow orchestration
//!
//! State is stored inside the tracked issue itself; see [`codec`] for the
//! format and [`store`] for where it is kept.

pub mod builtin;
pub mod codec;
pub mod definition;
pub mod issue_form;
pub mod notices;
pub mod orchestrator;
pub mod registry;
pub mod state;
pub mod store;
pub mod tasks;
pub mod trigger;

pub use definition::{
    Stage, StageTransition, TaskTemplate, TransitionAction, TransitionCondition,
    TransitionEvent, WorkflowDefinition,
};
pub use issue_form::parse_issue_form;
pub use orchestrator::{Orchestrator, OrchestratorSettings, DEFAULT_PAUSED_LABEL};
pub use registry::WorkflowRegistry;
pub use state::{
    StageState, StageStatus, TaskIssue, TaskStatus, WorkflowState, WorkflowStatus,
};
pub use store::{StateLocation, StateStore};
pub use tasks::{interpolate, parent_issue_from_body, TaskSummary, TaskTracker};
pub use trigger::TriggerCommand;
