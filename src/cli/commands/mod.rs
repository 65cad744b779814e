use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::clock::system_clock;
use crate::config::IssueOpsConfig;
use crate::github::{bot_predicate, GitHubClient, InMemoryIssueTracker, IssueState, IssueTracker};
use crate::workflow::{
    Orchestrator, StateStore, TaskTracker, WorkflowDefinition, WorkflowRegistry, WorkflowState,
};

pub mod config;
pub mod detect;
pub mod grace;
pub mod init;
pub mod tasks;
pub mod trigger;

#[allow(async_fn_in_trait)]
pub trait Command {
    async fn execute(&self, ctx: &AppContext) -> Result<()>;
}

/// Services shared by every command, wired from configuration.
pub struct AppContext {
    pub config: IssueOpsConfig,
    pub orchestrator: Orchestrator,
    tracker: Arc<dyn IssueTracker>,
    remote: Option<Arc<GitHubClient>>,
    dry_run: Option<Arc<InMemoryIssueTracker>>,
}

impl AppContext {
    /// Connect to GitHub. With `dry_run`, every write goes to an in-memory
    /// copy of the issues instead.
    pub fn build(config: IssueOpsConfig, dry_run: bool) -> Result<Self> {
        let client = Arc::new(
            GitHubClient::new(&config.github).context("Failed to create GitHub client")?,
        );

        let memory = dry_run.then(|| {
            Arc::new(InMemoryIssueTracker::with_bot_login(
                config.github.bot_login.as_deref().unwrap_or("issue-ops[bot]"),
            ))
        });
        let tracker: Arc<dyn IssueTracker> = match &memory {
            Some(memory) => memory.clone(),
            None => client.clone(),
        };

        Self::assemble(config, tracker, Some(client), memory)
    }

    /// Wire the services around an already constructed tracker.
    pub fn with_tracker(config: IssueOpsConfig, tracker: Arc<dyn IssueTracker>) -> Result<Self> {
        Self::assemble(config, tracker, None, None)
    }

    fn assemble(
        config: IssueOpsConfig,
        tracker: Arc<dyn IssueTracker>,
        remote: Option<Arc<GitHubClient>>,
        dry_run: Option<Arc<InMemoryIssueTracker>>,
    ) -> Result<Self> {
        let registry = Arc::new(WorkflowRegistry::with_builtin_definitions()?);
        let store = Arc::new(
            StateStore::new(tracker.clone(), system_clock())
                .with_location(config.workflow.state_location)
                .with_bot_predicate(bot_predicate(config.github.bot_login.as_deref()))
                .with_conflict_detection(config.workflow.conflict_detection),
        );
        let tasks = Arc::new(
            TaskTracker::new(store.clone()).with_task_label(config.workflow.task_label.clone()),
        );
        let orchestrator =
            Orchestrator::new(store, tasks, registry, config.orchestrator_settings());

        Ok(Self {
            config,
            orchestrator,
            tracker,
            remote,
            dry_run,
        })
    }

    pub fn tracker(&self) -> &dyn IssueTracker {
        self.tracker.as_ref()
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run.is_some()
    }

    /// In dry-run mode, copy `issue_number` and its comments from GitHub into
    /// the in-memory tracker. Does nothing otherwise.
    pub async fn prepare_issue(&self, issue_number: u64) -> Result<()> {
        let (Some(memory), Some(remote)) = (&self.dry_run, &self.remote) else {
            return Ok(());
        };
        if memory.issue(issue_number).is_some() {
            return Ok(());
        }

        let issue = remote.get_issue(issue_number).await?;
        let labels: Vec<&str> = issue.labels.iter().map(String::as_str).collect();
        memory.add_issue(issue.number, &issue.title, &issue.body, &labels);
        if issue.state == IssueState::Closed {
            memory.close_issue(issue.number);
        }
        for comment in remote.list_comments(issue_number).await? {
            memory.add_comment(
                issue_number,
                &comment.author.login,
                comment.author.is_bot,
                &comment.body,
            );
        }
        memory.clear_calls();
        info!(issue_number, "Mirrored issue for dry run");
        Ok(())
    }

    /// Load the state of `issue_number` together with its definition.
    pub async fn require_workflow(
        &self,
        issue_number: u64,
    ) -> Result<(WorkflowState, &WorkflowDefinition)> {
        let state = self
            .orchestrator
            .load_state(issue_number)
            .await?
            .with_context(|| format!("Issue #{issue_number} has no workflow state"))?;
        let definition = self.orchestrator.definition_for(&state)?;
        Ok((state, definition))
    }

    /// Print what a dry run would have written.
    pub fn report_dry_run(&self) {
        let Some(memory) = &self.dry_run else {
            return;
        };
        let writes = memory.write_calls();
        println!();
        println!("🧪 Dry run: {} write(s) skipped", writes.len());
        for call in writes {
            println!("   • {call:?}");
        }
    }
}

/// One-line description of a state, for command output.
pub fn describe_state(state: &WorkflowState) -> String {
    format!(
        "#{} {} → stage '{}' ({})",
        state.issue_number, state.workflow_type, state.current_stage, state.status
    )
}

pub fn print_outcome(outcome: Option<WorkflowState>, nothing: &str) {
    match outcome {
        Some(state) => println!("✅ {}", describe_state(&state)),
        None => println!("ℹ️  {nothing}"),
    }
}
