use anyhow::Result;

use super::{describe_state, AppContext, Command};

/// Reports which workflow an issue belongs to and whether it has started.
pub struct DetectCommand {
    pub issue: u64,
}

impl Command for DetectCommand {
    async fn execute(&self, ctx: &AppContext) -> Result<()> {
        ctx.prepare_issue(self.issue).await?;
        let issue = ctx.tracker().get_issue(self.issue).await?;

        match ctx
            .orchestrator
            .registry()
            .detect_workflow_type(&issue.labels, &issue.body)
        {
            Some(workflow_type) => println!("🔍 #{}: {}", self.issue, workflow_type),
            None => println!("🔍 #{}: no workflow", self.issue),
        }
        if let Some(state) = ctx.orchestrator.load_state(self.issue).await? {
            println!("   {}", describe_state(&state));
        }
        Ok(())
    }
}
