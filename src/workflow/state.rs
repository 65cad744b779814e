//! The mutable workflow aggregate persisted inside the tracked issue.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{IssueOpsError, Result};

pub const STATE_VERSION: &str = "1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Active,
    Paused,
    Completed,
    Cancelled,
    Failed,
}

impl WorkflowStatus {
    /// `completed` and `cancelled` are absorbing.
    pub fn is_terminal(self) -> bool {
        matches!(self, WorkflowStatus::Completed | WorkflowStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowStatus::Active => "active",
            WorkflowStatus::Paused => "paused",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Cancelled => "cancelled",
            WorkflowStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    InProgress,
    Completed,
    Blocked,
    Skipped,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StageStatus::Pending => "pending",
            StageStatus::InProgress => "in_progress",
            StageStatus::Completed => "completed",
            StageStatus::Blocked => "blocked",
            StageStatus::Skipped => "skipped",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Open,
    InProgress,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskIssue {
    pub number: u64,
    pub title: String,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    pub parent_issue: u64,
    pub stage: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageState {
    pub name: String,
    pub status: StageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(default)]
    pub task_issues: Vec<TaskIssue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grace_period_ends_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl StageState {
    pub fn pending(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: StageStatus::Pending,
            assignee: None,
            task_issues: Vec::new(),
            started_at: None,
            completed_at: None,
            grace_period_ends_at: None,
            notes: None,
        }
    }

    /// Append a line to the stage notes.
    pub fn add_note(&mut self, note: &str) {
        match &mut self.notes {
            Some(notes) if !notes.is_empty() => {
                notes.push('\n');
                notes.push_str(note);
            }
            _ => self.notes = Some(note.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowState {
    pub version: String,
    pub workflow_type: String,
    pub issue_number: u64,
    pub status: WorkflowStatus,
    pub current_stage: String,
    #[serde(default)]
    pub data: BTreeMap<String, Value>,
    pub stages: BTreeMap<String, StageState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_flags: Option<BTreeMap<String, bool>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Bumped on save only when conflict detection is enabled
    #[serde(default)]
    pub revision: u64,
}

impl WorkflowState {
    /// Fresh state: every stage pending except the first, which is in progress.
    pub fn new(
        issue_number: u64,
        workflow_type: &str,
        stage_names: &[&str],
        data: BTreeMap<String, Value>,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let first = stage_names.first().ok_or_else(|| {
            IssueOpsError::workflow(format!("workflow '{workflow_type}' has no stages"))
                .with_context("issue_number", issue_number)
        })?;

        let mut stages: BTreeMap<String, StageState> = stage_names
            .iter()
            .map(|name| (name.to_string(), StageState::pending(name)))
            .collect();
        if let Some(stage) = stages.get_mut(*first) {
            stage.status = StageStatus::InProgress;
            stage.started_at = Some(now);
        }

        Ok(Self {
            version: STATE_VERSION.to_string(),
            workflow_type: workflow_type.to_string(),
            issue_number,
            status: WorkflowStatus::Active,
            current_stage: first.to_string(),
            data,
            stages,
            feature_flags: None,
            created_at: now,
            updated_at: now,
            revision: 0,
        })
    }

    pub fn current(&self) -> Option<&StageState> {
        self.stages.get(&self.current_stage)
    }

    pub fn current_mut(&mut self) -> Option<&mut StageState> {
        self.stages.get_mut(&self.current_stage)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn stages_in_progress(&self) -> usize {
        self.stages
            .values()
            .filter(|stage| stage.status == StageStatus::InProgress)
            .count()
    }

    /// Template variables: the issue-form data plus workflow identifiers.
    pub fn variables(&self) -> BTreeMap<String, String> {
        let mut variables: BTreeMap<String, String> = self
            .data
            .iter()
            .filter_map(|(key, value)| {
                let rendered = match value {
                    Value::String(s) => s.clone(),
                    Value::Null => return None,
                    Value::Bool(_) | Value::Number(_) => value.to_string(),
                    Value::Array(items) => items
                        .iter()
                        .map(|item| match item {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        })
                        .collect::<Vec<_>>()
                        .join(", "),
                    Value::Object(_) => value.to_string(),
                };
                Some((key.clone(), rendered))
            })
            .collect();
        variables.insert("issue_number".to_string(), self.issue_number.to_string());
        variables.insert("workflow_type".to_string(), self.workflow_type.clone());
        variables.insert("current_stage".to_string(), self.current_stage.clone());
        variables
    }

    /// Structural checks run on every load and before every save.
    pub fn validate(&self) -> Result<()> {
        let fail = |message: String| {
            Err(IssueOpsError::invalid_state(message).with_context("issue_number", self.issue_number))
        };

        if self.version.trim().is_empty() {
            return fail("state is missing 'version'".to_string());
        }
        if self.workflow_type.trim().is_empty() {
            return fail("state is missing 'workflowType'".to_string());
        }
        if self.issue_number == 0 {
            return fail("'issueNumber' must be greater than zero".to_string());
        }
        if self.current_stage.trim().is_empty() {
            return fail("state is missing 'currentStage'".to_string());
        }
        if self.stages.is_empty() {
            return fail("state has no stages".to_string());
        }
        if !self.stages.contains_key(&self.current_stage) {
            return fail(format!(
                "current stage '{}' is not one of the tracked stages",
                self.current_stage
            ));
        }
        if self.updated_at < self.created_at {
            return fail(format!(
                "'updatedAt' ({}) is earlier than 'createdAt' ({})",
                self.updated_at.to_rfc3339(),
                self.created_at.to_rfc3339()
            ));
        }
        Ok(())
    }
}
