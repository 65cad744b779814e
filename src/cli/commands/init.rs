use anyhow::{bail, Result};

use super::{describe_state, AppContext, Command};
use crate::workflow::parse_issue_form;

pub struct InitCommand {
    pub issue: u64,
    pub workflow: Option<String>,
}

impl InitCommand {
    pub fn new(issue: u64) -> Self {
        Self {
            issue,
            workflow: None,
        }
    }

    pub fn with_workflow(mut self, workflow: Option<String>) -> Self {
        self.workflow = workflow;
        self
    }
}

impl Command for InitCommand {
    async fn execute(&self, ctx: &AppContext) -> Result<()> {
        ctx.prepare_issue(self.issue).await?;
        let issue = ctx.tracker().get_issue(self.issue).await?;
        let registry = ctx.orchestrator.registry();

        let workflow_type = match &self.workflow {
            Some(workflow_type) => workflow_type.as_str(),
            None => match registry.detect_workflow_type(&issue.labels, &issue.body) {
                Some(workflow_type) => workflow_type,
                None => bail!(
                    "Issue #{} does not look like any known workflow ({}); pass --workflow",
                    self.issue,
                    registry.workflow_types().join(", ")
                ),
            },
        };
        let definition = registry.require(workflow_type)?;

        println!("🚀 Initializing '{}' on issue #{}", definition.name, self.issue);
        let data = parse_issue_form(&issue.body);
        let state = ctx
            .orchestrator
            .initialize_workflow(self.issue, definition, data)
            .await?;

        println!("✅ {}", describe_state(&state));
        Ok(())
    }
}
