use anyhow::Result;

use super::{print_outcome, AppContext, Command};
use crate::workflow::{parent_issue_from_body, TaskStatus};

/// Handles a closed task issue.
pub struct TaskClosedCommand {
    pub task: u64,
}

impl Command for TaskClosedCommand {
    async fn execute(&self, ctx: &AppContext) -> Result<()> {
        ctx.prepare_issue(self.task).await?;
        let issue = ctx.tracker().get_issue(self.task).await?;
        let Some((parent, _)) = parent_issue_from_body(&issue.body) else {
            println!("ℹ️  Issue #{} is not a workflow task", self.task);
            return Ok(());
        };
        ctx.prepare_issue(parent).await?;

        println!("📋 Task #{} closed (parent #{})", self.task, parent);
        let outcome = ctx.orchestrator.handle_task_closed(self.task).await?;
        print_outcome(outcome, "Stage is still waiting for other tasks");
        Ok(())
    }
}

pub struct SummaryCommand {
    pub issue: u64,
    pub stage: Option<String>,
    pub json: bool,
}

impl Command for SummaryCommand {
    async fn execute(&self, ctx: &AppContext) -> Result<()> {
        ctx.prepare_issue(self.issue).await?;
        let (state, _) = ctx.require_workflow(self.issue).await?;
        let summary = ctx
            .orchestrator
            .tasks()
            .get_task_summary(self.issue, self.stage.as_deref())
            .await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&summary)?);
            return Ok(());
        }

        println!("📊 WORKFLOW #{}", self.issue);
        println!("==================");
        println!("   Type:   {}", state.workflow_type);
        println!("   Status: {}", state.status);
        println!("   Stage:  {}", state.current_stage);
        if let Some(ends_at) = state.current().and_then(|s| s.grace_period_ends_at) {
            println!("   Grace period ends: {}", ends_at.format("%Y-%m-%d %H:%M UTC"));
        }
        println!();
        println!(
            "📋 Tasks{}: {} total, {} completed, {} remaining",
            self.stage
                .as_deref()
                .map(|s| format!(" in '{s}'"))
                .unwrap_or_default(),
            summary.total,
            summary.completed,
            summary.remaining
        );
        for task in &summary.tasks {
            let icon = if task.status == TaskStatus::Completed { "✅" } else { "⬜" };
            println!("   {} #{} {} [{}]", icon, task.number, task.title, task.stage);
        }
        Ok(())
    }
}
