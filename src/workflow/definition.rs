//! Static workflow definitions
//!
//! Definitions are plain serde data: stages, task templates and a transition
//! table per stage. Conditions and actions are closed enums so a definition
//! can live in a config file as easily as in code.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::{TaskStatus, WorkflowState};
use crate::errors::{IssueOpsError, Result};

/// Events that can move a workflow from one stage to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransitionEvent {
    TaskCompleted,
    GracePeriodExpired,
    ManualOverride,
    ManualSkip,
    ValidationPassed,
    Error,
}

impl TransitionEvent {
    pub const ALL: [TransitionEvent; 6] = [
        TransitionEvent::TaskCompleted,
        TransitionEvent::GracePeriodExpired,
        TransitionEvent::ManualOverride,
        TransitionEvent::ManualSkip,
        TransitionEvent::ValidationPassed,
        TransitionEvent::Error,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            TransitionEvent::TaskCompleted => "task-completed",
            TransitionEvent::GracePeriodExpired => "grace-period-expired",
            TransitionEvent::ManualOverride => "manual-override",
            TransitionEvent::ManualSkip => "manual-skip",
            TransitionEvent::ValidationPassed => "validation-passed",
            TransitionEvent::Error => "error",
        }
    }
}

impl fmt::Display for TransitionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransitionEvent {
    type Err = IssueOpsError;

    fn from_str(value: &str) -> Result<Self> {
        let normalized = value.trim().to_ascii_lowercase().replace('_', "-");
        TransitionEvent::ALL
            .into_iter()
            .find(|event| event.as_str() == normalized)
            .ok_or_else(|| IssueOpsError::validation("event", format!("unknown event '{value}'")))
    }
}

/// Data-driven guard evaluated against the current state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransitionCondition {
    /// `data[field] == value`
    FieldEquals {
        field: String,
        value: serde_json::Value,
    },
    /// `data[field]` exists and is neither null nor an empty string
    FieldPresent { field: String },
    /// Every tracked task of `stage` (current stage when absent) is completed
    AllTasksCompleted {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stage: Option<String>,
    },
    /// The current stage's grace period has ended
    GracePeriodElapsed,
    FeatureEnabled { flag: String },
    All { conditions: Vec<TransitionCondition> },
    Any { conditions: Vec<TransitionCondition> },
    Not { condition: Box<TransitionCondition> },
}

impl TransitionCondition {
    pub fn evaluate(&self, state: &WorkflowState, now: DateTime<Utc>) -> bool {
        match self {
            TransitionCondition::FieldEquals { field, value } => state.data.get(field) == Some(value),
            TransitionCondition::FieldPresent { field } => match state.data.get(field) {
                None | Some(serde_json::Value::Null) => false,
                Some(serde_json::Value::String(s)) => !s.trim().is_empty(),
                Some(_) => true,
            },
            TransitionCondition::AllTasksCompleted { stage } => {
                let stage_name = stage.as_deref().unwrap_or(&state.current_stage);
                state.stages.get(stage_name).map_or(true, |stage| {
                    stage
                        .task_issues
                        .iter()
                        .all(|task| task.status == TaskStatus::Completed)
                })
            }
            TransitionCondition::GracePeriodElapsed => state
                .current()
                .and_then(|stage| stage.grace_period_ends_at)
                .is_some_and(|ends_at| now >= ends_at),
            TransitionCondition::FeatureEnabled { flag } => state
                .feature_flags
                .as_ref()
                .and_then(|flags| flags.get(flag))
                .copied()
                .unwrap_or(false),
            TransitionCondition::All { conditions } => {
                conditions.iter().all(|c| c.evaluate(state, now))
            }
            TransitionCondition::Any { conditions } => {
                conditions.iter().any(|c| c.evaluate(state, now))
            }
            TransitionCondition::Not { condition } => !condition.evaluate(state, now),
        }
    }
}

/// Side effect executed after a transition has been persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransitionAction {
    AddLabel { label: String },
    RemoveLabel { label: String },
    /// Comment body; `{{var}}` placeholders are filled from the workflow variables
    PostComment { body: String },
    /// Not delivered anywhere yet, only logged
    Notify {
        #[serde(default)]
        recipients: Vec<String>,
        message: String,
    },
}

impl TransitionAction {
    pub fn kind(&self) -> &'static str {
        match self {
            TransitionAction::AddLabel { .. } => "add_label",
            TransitionAction::RemoveLabel { .. } => "remove_label",
            TransitionAction::PostComment { .. } => "post_comment",
            TransitionAction::Notify { .. } => "notify",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageTransition {
    pub event: TransitionEvent,
    /// `None` or an empty string completes the workflow
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_stage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<TransitionCondition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<TransitionAction>,
}

impl StageTransition {
    pub fn new(event: TransitionEvent, target_stage: &str) -> Self {
        Self {
            event,
            target_stage: Some(target_stage.to_string()),
            condition: None,
            actions: Vec::new(),
        }
    }

    /// A transition that completes the workflow.
    pub fn complete(event: TransitionEvent) -> Self {
        Self {
            event,
            target_stage: None,
            condition: None,
            actions: Vec::new(),
        }
    }

    pub fn with_condition(mut self, condition: TransitionCondition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn with_action(mut self, action: TransitionAction) -> Self {
        self.actions.push(action);
        self
    }

    /// Target stage name, or `None` when the transition ends the workflow.
    pub fn target(&self) -> Option<&str> {
        self.target_stage.as_deref().filter(|name| !name.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskTemplate {
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    /// Overrides the stage's default assignee
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
}

impl TaskTemplate {
    pub fn new(title: &str, body: &str) -> Self {
        Self {
            title: title.to_string(),
            body: body.to_string(),
            labels: Vec::new(),
            assignee: None,
        }
    }

    pub fn with_labels(mut self, labels: &[&str]) -> Self {
        self.labels = labels.iter().map(|l| l.to_string()).collect();
        self
    }

    pub fn with_assignee(mut self, assignee: &str) -> Self {
        self.assignee = Some(assignee.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stage {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee_role: Option<String>,
    #[serde(default)]
    pub tasks: Vec<TaskTemplate>,
    #[serde(default)]
    pub transitions: Vec<StageTransition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grace_period_days: Option<u32>,
    #[serde(default)]
    pub allow_manual_skip: bool,
}

impl Stage {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            assignee_role: None,
            tasks: Vec::new(),
            transitions: Vec::new(),
            grace_period_days: None,
            allow_manual_skip: false,
        }
    }

    pub fn with_assignee_role(mut self, role: &str) -> Self {
        self.assignee_role = Some(role.to_string());
        self
    }

    pub fn with_task(mut self, task: TaskTemplate) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn with_transition(mut self, transition: StageTransition) -> Self {
        self.transitions.push(transition);
        self
    }

    pub fn with_grace_period(mut self, days: u32) -> Self {
        self.grace_period_days = Some(days);
        self
    }

    pub fn skippable(mut self) -> Self {
        self.allow_manual_skip = true;
        self
    }

    /// Grace period length, if entering this stage pauses the workflow.
    pub fn grace_period(&self) -> Option<u32> {
        self.grace_period_days.filter(|days| *days > 0)
    }

    /// First transition listening for `event`.
    pub fn transition_for(&self, event: TransitionEvent) -> Option<&StageTransition> {
        self.transitions.iter().find(|t| t.event == event)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    #[serde(rename = "type")]
    pub workflow_type: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub stages: Vec<Stage>,
    /// Labels that mark an issue as belonging to this workflow
    #[serde(default)]
    pub trigger_labels: Vec<String>,
    /// Body substrings that mark an issue as belonging to this workflow
    #[serde(default)]
    pub body_markers: Vec<String>,
}

impl WorkflowDefinition {
    pub fn new(workflow_type: &str, name: &str, description: &str) -> Self {
        Self {
            workflow_type: workflow_type.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            stages: Vec::new(),
            trigger_labels: Vec::new(),
            body_markers: Vec::new(),
        }
    }

    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn with_trigger_label(mut self, label: &str) -> Self {
        self.trigger_labels.push(label.to_string());
        self
    }

    pub fn with_body_marker(mut self, marker: &str) -> Self {
        self.body_markers.push(marker.to_string());
        self
    }

    pub fn stage(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|stage| stage.name == name)
    }

    pub fn first_stage(&self) -> Option<&Stage> {
        self.stages.first()
    }

    /// Stage following `name` in definition order.
    pub fn next_stage_after(&self, name: &str) -> Option<&Stage> {
        let index = self.stages.iter().position(|stage| stage.name == name)?;
        self.stages.get(index + 1)
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|stage| stage.name.as_str()).collect()
    }

    /// Structural checks: at least one stage, unique names, known targets.
    pub fn validate(&self) -> Result<()> {
        if self.workflow_type.trim().is_empty() {
            return Err(IssueOpsError::configuration("workflow type must not be empty"));
        }
        if self.stages.is_empty() {
            return Err(IssueOpsError::configuration(format!(
                "workflow '{}' defines no stages",
                self.workflow_type
            ))
            .with_context("workflow_type", &self.workflow_type));
        }

        let mut seen = HashSet::new();
        for stage in &self.stages {
            if !seen.insert(stage.name.as_str()) {
                return Err(IssueOpsError::configuration(format!(
                    "stage '{}' is defined more than once",
                    stage.name
                ))
                .with_context("workflow_type", &self.workflow_type));
            }
        }

        for stage in &self.stages {
            for transition in &stage.transitions {
                if let Some(target) = transition.target() {
                    if !seen.contains(target) {
                        return Err(IssueOpsError::configuration(format!(
                            "stage '{}' transitions on {} to unknown stage '{}'",
                            stage.name, transition.event, target
                        ))
                        .with_context("workflow_type", &self.workflow_type));
                    }
                }
            }
        }
        Ok(())
    }

    /// Variables available to every template of this workflow.
    pub fn variables_for(&self, state: &WorkflowState) -> BTreeMap<String, String> {
        let mut variables = state.variables();
        variables.insert("workflow_name".to_string(), self.name.clone());
        variables
    }
}
