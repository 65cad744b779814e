//! Markdown notices posted back to the tracked issue.

use std::fmt::Write;

use chrono::{DateTime, Utc};

use super::definition::{Stage, WorkflowDefinition};
use super::state::{TaskIssue, TaskStatus, WorkflowState};

fn date(instant: DateTime<Utc>) -> String {
    instant.format("%Y-%m-%d").to_string()
}

pub fn initialization(definition: &WorkflowDefinition, state: &WorkflowState) -> String {
    let mut notice = format!(
        "## 🚀 {} started\n\nThis issue is now tracked by the **{}** workflow.\n\n### Stages\n\n",
        definition.name, definition.workflow_type
    );
    for (index, stage) in definition.stages.iter().enumerate() {
        let marker = if stage.name == state.current_stage {
            " ← current"
        } else {
            ""
        };
        let _ = writeln!(notice, "{}. **{}**{}", index + 1, stage.name, marker);
    }
    notice
}

pub fn stage_entered(from: &str, to: &Stage) -> String {
    let mut notice = format!("## ➡️ Stage: {}\n\nMoved from **{}** to **{}**.", to.name, from, to.name);
    if !to.description.is_empty() {
        let _ = write!(notice, "\n\n{}", to.description);
    }
    notice
}

pub fn grace_period_started(to: &Stage, days: u32, ends_at: DateTime<Utc>) -> String {
    let unit = if days == 1 { "day" } else { "days" };
    format!(
        "## ⏸️ Grace period: {}\n\nThe workflow is paused for a grace period of **{} {}**. \
         It can resume on or after **{}**.",
        to.name,
        days,
        unit,
        date(ends_at)
    )
}

pub fn stage_skipped(stage: &str, reason: &str) -> String {
    format!("## ⏭️ Stage skipped: {stage}\n\n**Reason:** {reason}")
}

pub fn completed(definition: &WorkflowDefinition, state: &WorkflowState) -> String {
    format!(
        "## ✅ {} complete\n\nAll stages finished; the final stage was **{}**.",
        definition.name, state.current_stage
    )
}

pub fn cancelled(state: &WorkflowState, reason: &str) -> String {
    format!(
        "## 🛑 Workflow cancelled\n\nThe **{}** workflow was cancelled during stage **{}**.\n\n**Reason:** {}",
        state.workflow_type, state.current_stage, reason
    )
}

pub fn task_checklist(stage: &str, tasks: &[TaskIssue]) -> String {
    let mut notice = format!("## 📋 Tasks for stage: {stage}\n\n");
    for task in tasks {
        let check = if task.status == TaskStatus::Completed { "x" } else { " " };
        let _ = write!(notice, "- [{}] #{} {}", check, task.number, task.title);
        if let Some(assignee) = &task.assignee {
            let _ = write!(notice, " (@{assignee})");
        }
        notice.push('\n');
    }
    notice
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::definition::StageTransition;
    use crate::workflow::definition::TransitionEvent;
    use chrono::TimeZone;
    use std::collections::BTreeMap;

    fn definition() -> WorkflowDefinition {
        WorkflowDefinition::new("deprecation", "Dataset deprecation", "")
            .with_stage(
                Stage::new("review", "")
                    .with_transition(StageTransition::new(TransitionEvent::TaskCompleted, "approval")),
            )
            .with_stage(Stage::new("approval", "Sign-off by the data owner"))
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_initialization_lists_stages_in_order() {
        let state =
            WorkflowState::new(42, "deprecation", &["review", "approval"], BTreeMap::new(), now())
                .unwrap();
        let notice = initialization(&definition(), &state);
        let review = notice.find("1. **review** ← current").unwrap();
        let approval = notice.find("2. **approval**").unwrap();
        assert!(review < approval);
    }

    #[test]
    fn test_stage_notice_includes_description() {
        let notice = stage_entered("review", &definition().stages[1]);
        assert!(notice.contains("Moved from **review** to **approval**."));
        assert!(notice.contains("Sign-off by the data owner"));
    }

    #[test]
    fn test_grace_notice_names_length_and_end() {
        let stage = Stage::new("grace-period", "");
        let notice = grace_period_started(&stage, 14, now() + chrono::Duration::days(14));
        assert!(notice.contains("**14 days**"));
        assert!(notice.contains("2024-03-15"));
    }

    #[test]
    fn test_checklist_marks_completed_tasks() {
        let task = |number, status| TaskIssue {
            number,
            title: format!("Task {number}"),
            status,
            assignee: Some("alice".to_string()),
            parent_issue: 42,
            stage: "review".to_string(),
            created_at: now(),
            completed_at: None,
            url: String::new(),
        };
        let notice = task_checklist(
            "review",
            &[task(43, TaskStatus::Open), task(44, TaskStatus::Completed)],
        );
        assert!(notice.contains("- [ ] #43 Task 43 (@alice)\n"));
        assert!(notice.contains("- [x] #44 Task 44 (@alice)\n"));
    }
}
