//! Auxiliary task issues
//!
//! A stage's task templates become real issues. Each one is tracked in the
//! parent's state so stage transitions can wait for them.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use regex::{Captures, Regex};
use serde::Serialize;
use tracing::{info, warn};

use super::definition::TaskTemplate;
use super::notices;
use super::state::{TaskIssue, TaskStatus, WorkflowState};
use super::store::StateStore;
use crate::errors::{IssueOpsError, Result};
use crate::github::NewIssue;

/// Compiled placeholder pattern, cached using OnceLock
fn placeholder_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").ok())
        .as_ref()
}

/// Task footer marker. The stage is a JSON string; footers written before
/// quoting was introduced carry a bare stage name.
fn footer_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(
                r#"<!-- issue-ops-task parent=(\d+) stage=(?:("(?:[^"\\]|\\.)*")|(\S+)) -->"#,
            )
            .ok()
        })
        .as_ref()
}

/// Fill `{{name}}` placeholders. Unknown names stay in the text as written.
pub fn interpolate(template: &str, variables: &BTreeMap<String, String>) -> String {
    let Some(pattern) = placeholder_pattern() else {
        return template.to_string();
    };
    pattern
        .replace_all(template, |caps: &Captures| match variables.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

fn task_footer(parent_issue: u64, stage: &str) -> String {
    let quoted = serde_json::Value::from(stage).to_string();
    format!(
        "\n\n---\n<!-- issue-ops-task parent={parent_issue} stage={quoted} -->\n\
         Part of #{parent_issue}, stage **{stage}**."
    )
}

/// Parent issue and stage recorded in a task issue's footer.
pub fn parent_issue_from_body(body: &str) -> Option<(u64, String)> {
    let caps = footer_pattern()?.captures(body)?;
    let parent = caps[1].parse().ok()?;
    let stage = match (caps.get(2), caps.get(3)) {
        (Some(quoted), _) => serde_json::from_str(quoted.as_str()).ok()?,
        (None, Some(bare)) => bare.as_str().to_string(),
        (None, None) => return None,
    };
    Some((parent, stage))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskSummary {
    pub total: usize,
    pub completed: usize,
    pub remaining: usize,
    pub tasks: Vec<TaskIssue>,
}

impl TaskSummary {
    fn from_tasks(tasks: Vec<TaskIssue>) -> Self {
        let completed = tasks
            .iter()
            .filter(|task| task.status == TaskStatus::Completed)
            .count();
        Self {
            total: tasks.len(),
            completed,
            remaining: tasks.len() - completed,
            tasks,
        }
    }
}

pub struct TaskTracker {
    store: Arc<StateStore>,
    task_label: Option<String>,
}

impl TaskTracker {
    pub fn new(store: Arc<StateStore>) -> Self {
        Self {
            store,
            task_label: None,
        }
    }

    /// Label added to every created task issue.
    pub fn with_task_label(mut self, label: Option<String>) -> Self {
        self.task_label = label.filter(|l| !l.trim().is_empty());
        self
    }

    async fn require_state(&self, parent_issue: u64) -> Result<WorkflowState> {
        self.store.load(parent_issue).await?.ok_or_else(|| {
            IssueOpsError::workflow(format!("issue #{parent_issue} has no workflow state"))
                .with_context("issue_number", parent_issue)
        })
    }

    /// Open one issue per template and record them on `stage`.
    ///
    /// Creation stops at the first failure; issues opened before it are kept.
    pub async fn create_task_issues(
        &self,
        parent_issue: u64,
        stage: &str,
        templates: &[TaskTemplate],
        default_assignee: Option<&str>,
        variables: &BTreeMap<String, String>,
    ) -> Result<Vec<TaskIssue>> {
        if templates.is_empty() {
            return Ok(Vec::new());
        }

        let tracker = self.store.tracker();
        let mut created = Vec::with_capacity(templates.len());

        for template in templates {
            let title = interpolate(&template.title, variables);
            let body = format!(
                "{}{}",
                interpolate(&template.body, variables),
                task_footer(parent_issue, stage)
            );
            let mut labels = template.labels.clone();
            if let Some(label) = &self.task_label {
                if !labels.contains(label) {
                    labels.push(label.clone());
                }
            }
            let assignee = template.assignee.as_deref().or(default_assignee);

            let request = NewIssue::new(&title, &body)
                .with_labels(labels)
                .with_assignee(assignee);

            let issue = tracker.create_issue(&request).await.map_err(|e| {
                IssueOpsError::task(None, format!("failed to create task '{title}': {e}"))
                    .with_context("template", &template.title)
                    .with_context("parent_issue", parent_issue)
                    .with_context("created_before_failure", created.len())
            })?;

            info!(
                parent_issue,
                stage,
                task_number = issue.number,
                "Created task issue"
            );
            created.push(TaskIssue {
                number: issue.number,
                title,
                status: TaskStatus::Open,
                assignee: assignee.map(str::to_string),
                parent_issue,
                stage: stage.to_string(),
                created_at: self.store.clock().utc(),
                completed_at: None,
                url: issue.url,
            });
        }

        let mut state = self.require_state(parent_issue).await?;
        let stage_state = state.stages.get_mut(stage).ok_or_else(|| {
            IssueOpsError::workflow(format!("stage '{stage}' is not tracked in the workflow state"))
                .with_context("issue_number", parent_issue)
        })?;
        stage_state.task_issues.extend(created.iter().cloned());
        self.store.save(&mut state).await?;

        let checklist = notices::task_checklist(stage, &created);
        if let Err(e) = tracker.create_comment(parent_issue, &checklist).await {
            warn!(parent_issue, stage, error = %e, "Failed to post task checklist");
        }

        Ok(created)
    }

    /// A stage without tracked tasks counts as complete.
    pub async fn are_all_tasks_completed(&self, parent_issue: u64, stage: &str) -> Result<bool> {
        let state = self.require_state(parent_issue).await?;
        Ok(state.stages.get(stage).map_or(true, |stage| {
            stage
                .task_issues
                .iter()
                .all(|task| task.status == TaskStatus::Completed)
        }))
    }

    /// Set the status of a task tracked on any stage of the parent workflow.
    pub async fn update_task_status(
        &self,
        parent_issue: u64,
        task_number: u64,
        status: TaskStatus,
    ) -> Result<TaskIssue> {
        let mut state = self
            .require_state(parent_issue)
            .await
            .map_err(|e| IssueOpsError::task(Some(task_number), e.to_string()))?;
        let now = self.store.clock().utc();

        let task = state
            .stages
            .values_mut()
            .flat_map(|stage| stage.task_issues.iter_mut())
            .find(|task| task.number == task_number)
            .ok_or_else(|| {
                IssueOpsError::task(
                    Some(task_number),
                    format!("not tracked by issue #{parent_issue}"),
                )
                .with_context("parent_issue", parent_issue)
            })?;

        if status == TaskStatus::Completed {
            if task.status != TaskStatus::Completed {
                task.completed_at = Some(now);
            }
        } else {
            task.completed_at = None;
        }
        task.status = status;
        let updated = task.clone();

        self.store.save(&mut state).await?;
        info!(parent_issue, task_number, status = ?status, "Updated task status");
        Ok(updated)
    }

    /// Counts for one stage, or for the whole workflow when `stage` is `None`.
    pub async fn get_task_summary(
        &self,
        parent_issue: u64,
        stage: Option<&str>,
    ) -> Result<TaskSummary> {
        let state = self.require_state(parent_issue).await?;
        let tasks: Vec<TaskIssue> = match stage {
            Some(name) => state
                .stages
                .get(name)
                .map(|stage| stage.task_issues.clone())
                .unwrap_or_default(),
            None => state
                .stages
                .values()
                .flat_map(|stage| stage.task_issues.iter().cloned())
                .collect(),
        };
        Ok(TaskSummary::from_tasks(tasks))
    }
}
