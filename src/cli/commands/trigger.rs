use anyhow::Result;
use tracing::Instrument;

use super::{print_outcome, AppContext, Command};
use crate::telemetry::{create_workflow_span, generate_correlation_id};
use crate::workflow::TriggerCommand;

/// Runs one trigger (event, skip or cancel) against an issue's workflow.
pub struct DispatchCommand {
    pub issue: u64,
    pub trigger: TriggerCommand,
}

impl DispatchCommand {
    pub fn new(issue: u64, trigger: TriggerCommand) -> Self {
        Self { issue, trigger }
    }

    /// Parse a raw label name or comment command.
    pub fn parse(issue: u64, raw: &str) -> Result<Self> {
        Ok(Self::new(issue, TriggerCommand::parse(raw)?))
    }
}

impl Command for DispatchCommand {
    async fn execute(&self, ctx: &AppContext) -> Result<()> {
        ctx.prepare_issue(self.issue).await?;
        let (state, definition) = ctx.require_workflow(self.issue).await?;

        let correlation_id = generate_correlation_id();
        let span = create_workflow_span(
            "dispatch",
            Some(self.issue),
            Some(&state.workflow_type),
            Some(&correlation_id),
        );

        println!(
            "🔄 Issue #{} at stage '{}': {:?}",
            self.issue, state.current_stage, self.trigger
        );
        let outcome = ctx
            .orchestrator
            .dispatch(self.issue, &self.trigger, definition)
            .instrument(span)
            .await?;

        print_outcome(outcome, "Nothing to do for this trigger");
        Ok(())
    }
}
