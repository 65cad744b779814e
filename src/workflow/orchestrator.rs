//! Workflow state machine
//!
//! Every operation follows the same shape: load the state from the issue,
//! decide, mutate, save, then post notices and run transition actions.
//! Anything after the save is best-effort; a failed label or comment never
//! undoes a stage change that has already been persisted.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Duration;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::definition::{Stage, StageTransition, TransitionAction, TransitionEvent, WorkflowDefinition};
use super::notices;
use super::registry::WorkflowRegistry;
use super::state::{StageState, StageStatus, TaskStatus, WorkflowState, WorkflowStatus};
use super::store::StateStore;
use super::tasks::{interpolate, parent_issue_from_body, TaskTracker};
use super::trigger::TriggerCommand;
use crate::errors::{IssueOpsError, Result};

pub const DEFAULT_PAUSED_LABEL: &str = "paused: grace-period";

/// Knobs the orchestrator reads from configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub paused_label: String,
    /// Assignee used when a stage role has no mapping
    pub default_assignee: Option<String>,
    /// Stage role → tracker login
    pub role_assignees: HashMap<String, String>,
    /// Open task issues whenever a stage with task templates is entered
    pub auto_create_tasks: bool,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            paused_label: DEFAULT_PAUSED_LABEL.to_string(),
            default_assignee: None,
            role_assignees: HashMap::new(),
            auto_create_tasks: true,
        }
    }
}

pub struct Orchestrator {
    store: Arc<StateStore>,
    tasks: Arc<TaskTracker>,
    registry: Arc<WorkflowRegistry>,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        store: Arc<StateStore>,
        tasks: Arc<TaskTracker>,
        registry: Arc<WorkflowRegistry>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            store,
            tasks,
            registry,
            settings,
        }
    }

    pub fn registry(&self) -> &WorkflowRegistry {
        &self.registry
    }

    pub fn tasks(&self) -> &TaskTracker {
        &self.tasks
    }

    pub async fn load_state(&self, issue_number: u64) -> Result<Option<WorkflowState>> {
        self.store.load(issue_number).await
    }

    /// Definition the stored state was created from.
    pub fn definition_for(&self, state: &WorkflowState) -> Result<&WorkflowDefinition> {
        self.registry
            .require(&state.workflow_type)
            .map_err(|e| e.with_context("issue_number", state.issue_number))
    }

    fn assignee_for(&self, stage: &Stage) -> Option<String> {
        stage
            .assignee_role
            .as_ref()
            .and_then(|role| self.settings.role_assignees.get(role))
            .or(self.settings.default_assignee.as_ref())
            .cloned()
    }

    /// Start `definition` on `issue_number`.
    ///
    /// An issue that already carries state is returned as is, so a
    /// re-delivered "opened" event is harmless.
    pub async fn initialize_workflow(
        &self,
        issue_number: u64,
        definition: &WorkflowDefinition,
        data: BTreeMap<String, Value>,
    ) -> Result<WorkflowState> {
        let Some(first) = definition.first_stage() else {
            return Err(IssueOpsError::workflow(format!(
                "workflow '{}' has no stages",
                definition.workflow_type
            ))
            .with_context("issue_number", issue_number));
        };

        if let Some(existing) = self.store.load(issue_number).await? {
            info!(
                issue_number,
                workflow_type = %existing.workflow_type,
                "Workflow already initialized, leaving state untouched"
            );
            return Ok(existing);
        }

        let now = self.store.clock().utc();
        let mut state = WorkflowState::new(
            issue_number,
            &definition.workflow_type,
            &definition.stage_names(),
            data,
            now,
        )?;
        if let Some(stage) = state.current_mut() {
            stage.assignee = self.assignee_for(first);
        }

        self.store.save(&mut state).await?;
        info!(
            issue_number,
            workflow_type = %definition.workflow_type,
            stage = %state.current_stage,
            "Initialized workflow"
        );

        self.post_notice(issue_number, &notices::initialization(definition, &state))
            .await;
        self.open_stage_tasks(state, first, definition).await
    }

    /// Pure check: would `event` fire a transition right now?
    pub fn can_transition(
        &self,
        state: &WorkflowState,
        event: TransitionEvent,
        definition: &WorkflowDefinition,
    ) -> bool {
        if state.is_terminal() {
            return false;
        }
        let now = self.store.clock().utc();
        definition
            .stage(&state.current_stage)
            .and_then(|stage| stage.transition_for(event))
            .is_some_and(|transition| {
                transition
                    .condition
                    .as_ref()
                    .map_or(true, |condition| condition.evaluate(state, now))
            })
    }

    /// Fire `event` against the workflow on `issue_number`.
    ///
    /// Returns `None` when nothing happened: no state, a terminal workflow,
    /// no transition for the event, or a condition that does not hold.
    pub async fn transition_stage(
        &self,
        issue_number: u64,
        event: TransitionEvent,
        definition: &WorkflowDefinition,
    ) -> Result<Option<WorkflowState>> {
        let Some(state) = self.store.load(issue_number).await? else {
            debug!(issue_number, %event, "No workflow state, ignoring event");
            return Ok(None);
        };
        if state.is_terminal() {
            debug!(issue_number, %event, status = %state.status, "Workflow finished, ignoring event");
            return Ok(None);
        }

        let stage = self.current_stage_definition(&state, definition)?;
        let Some(transition) = stage.transition_for(event) else {
            debug!(issue_number, %event, stage = %stage.name, "No transition for event");
            return Ok(None);
        };
        if let Some(condition) = &transition.condition {
            if !condition.evaluate(&state, self.store.clock().utc()) {
                debug!(issue_number, %event, stage = %stage.name, "Transition condition not met");
                return Ok(None);
            }
        }

        self.apply_transition(state, transition, definition)
            .await
            .map(Some)
    }

    fn current_stage_definition<'d>(
        &self,
        state: &WorkflowState,
        definition: &'d WorkflowDefinition,
    ) -> Result<&'d Stage> {
        if state.workflow_type != definition.workflow_type {
            return Err(IssueOpsError::workflow(format!(
                "issue runs workflow '{}', not '{}'",
                state.workflow_type, definition.workflow_type
            ))
            .with_context("issue_number", state.issue_number));
        }
        definition.stage(&state.current_stage).ok_or_else(|| {
            IssueOpsError::workflow(format!(
                "stage '{}' is not defined by workflow '{}'",
                state.current_stage, definition.workflow_type
            ))
            .with_context("issue_number", state.issue_number)
        })
    }

    async fn apply_transition(
        &self,
        mut state: WorkflowState,
        transition: &StageTransition,
        definition: &WorkflowDefinition,
    ) -> Result<WorkflowState> {
        let issue_number = state.issue_number;
        let now = self.store.clock().utc();
        let from = state.current_stage.clone();

        if let Some(outgoing) = state.current_mut() {
            if outgoing.status != StageStatus::Skipped {
                outgoing.status = StageStatus::Completed;
                outgoing.completed_at = Some(now);
            }
        }

        let entered = match transition.target() {
            None => {
                let was_paused = state.status == WorkflowStatus::Paused;
                state.status = WorkflowStatus::Completed;
                self.store.save(&mut state).await?;
                info!(issue_number, stage = %from, event = %transition.event, "Workflow completed");

                if was_paused {
                    self.remove_paused_label(issue_number).await;
                }
                self.post_notice(issue_number, &notices::completed(definition, &state))
                    .await;
                None
            }
            Some(target) => {
                let target_stage = definition.stage(target).ok_or_else(|| {
                    IssueOpsError::workflow(format!(
                        "transition from '{from}' targets undefined stage '{target}'"
                    ))
                    .with_context("issue_number", issue_number)
                })?;
                let assignee = self.assignee_for(target_stage);

                let entry = state
                    .stages
                    .entry(target.to_string())
                    .or_insert_with(|| StageState::pending(target));
                entry.status = StageStatus::InProgress;
                entry.started_at = Some(now);
                entry.completed_at = None;
                entry.assignee = assignee;
                state.current_stage = target.to_string();

                if let Some(days) = target_stage.grace_period() {
                    let ends_at = now + Duration::days(i64::from(days));
                    if let Some(entry) = state.current_mut() {
                        entry.grace_period_ends_at = Some(ends_at);
                    }
                    state.status = WorkflowStatus::Paused;
                    self.store.save(&mut state).await?;
                    info!(
                        issue_number,
                        from = %from,
                        to = target,
                        grace_period_days = days,
                        ends_at = %ends_at,
                        "Entered grace period"
                    );

                    self.post_notice(
                        issue_number,
                        &notices::grace_period_started(target_stage, days, ends_at),
                    )
                    .await;
                    self.add_paused_label(issue_number).await;
                } else {
                    let was_paused = state.status == WorkflowStatus::Paused;
                    if was_paused {
                        state.status = WorkflowStatus::Active;
                    }
                    self.store.save(&mut state).await?;
                    info!(issue_number, from = %from, to = target, "Advanced workflow stage");

                    if was_paused {
                        self.remove_paused_label(issue_number).await;
                    }
                    self.post_notice(issue_number, &notices::stage_entered(&from, target_stage))
                        .await;
                }
                Some(target_stage)
            }
        };

        self.run_actions(&state, &transition.actions, definition).await;

        match entered {
            Some(stage) => self.open_stage_tasks(state, stage, definition).await,
            None => Ok(state),
        }
    }

    /// Open the task issues of the stage just entered. The stage change is
    /// already saved, so a failure here is logged rather than returned.
    async fn open_stage_tasks(
        &self,
        state: WorkflowState,
        stage: &Stage,
        definition: &WorkflowDefinition,
    ) -> Result<WorkflowState> {
        if !self.settings.auto_create_tasks || stage.tasks.is_empty() {
            return Ok(state);
        }

        let issue_number = state.issue_number;
        let assignee = self.assignee_for(stage);
        let variables = definition.variables_for(&state);
        match self
            .tasks
            .create_task_issues(
                issue_number,
                &stage.name,
                &stage.tasks,
                assignee.as_deref(),
                &variables,
            )
            .await
        {
            Ok(_) => Ok(self.store.load(issue_number).await?.unwrap_or(state)),
            Err(e) => {
                error!(issue_number, stage = %stage.name, error = %e, "Failed to create stage tasks");
                Ok(state)
            }
        }
    }

    async fn run_actions(
        &self,
        state: &WorkflowState,
        actions: &[TransitionAction],
        definition: &WorkflowDefinition,
    ) {
        if actions.is_empty() {
            return;
        }
        let issue_number = state.issue_number;
        let variables = definition.variables_for(state);
        let tracker = self.store.tracker();

        for action in actions {
            let result = match action {
                TransitionAction::AddLabel { label } => {
                    tracker.add_labels(issue_number, &[label.clone()]).await
                }
                TransitionAction::RemoveLabel { label } => {
                    tracker.remove_label(issue_number, label).await
                }
                TransitionAction::PostComment { body } => tracker
                    .create_comment(issue_number, &interpolate(body, &variables))
                    .await
                    .map(|_| ()),
                TransitionAction::Notify {
                    recipients,
                    message,
                } => {
                    info!(
                        issue_number,
                        recipients = ?recipients,
                        message = %interpolate(message, &variables),
                        "Notification requested"
                    );
                    Ok(())
                }
            };

            match result {
                Ok(()) => debug!(issue_number, action = action.kind(), "Ran transition action"),
                Err(e) => warn!(
                    issue_number,
                    action = action.kind(),
                    error = %e,
                    "Transition action failed, continuing"
                ),
            }
        }
    }

    async fn post_notice(&self, issue_number: u64, body: &str) {
        if let Err(e) = self.store.tracker().create_comment(issue_number, body).await {
            warn!(issue_number, error = %e, "Failed to post workflow notice");
        }
    }

    async fn add_paused_label(&self, issue_number: u64) {
        let labels = [self.settings.paused_label.clone()];
        if let Err(e) = self.store.tracker().add_labels(issue_number, &labels).await {
            warn!(issue_number, error = %e, "Failed to add paused label");
        }
    }

    async fn remove_paused_label(&self, issue_number: u64) {
        let label = &self.settings.paused_label;
        if let Err(e) = self.store.tracker().remove_label(issue_number, label).await {
            warn!(issue_number, error = %e, "Failed to remove paused label");
        }
    }

    /// Skip the current stage, if its definition allows it.
    ///
    /// The stage is marked skipped with `reason` in its notes, then the
    /// workflow moves on through the stage's `manual-skip` transition, or to
    /// the next stage in definition order when it has none.
    pub async fn skip_stage(
        &self,
        issue_number: u64,
        definition: &WorkflowDefinition,
        reason: &str,
    ) -> Result<Option<WorkflowState>> {
        let Some(mut state) = self.store.load(issue_number).await? else {
            return Ok(None);
        };
        if state.is_terminal() {
            return Ok(None);
        }
        let stage = self.current_stage_definition(&state, definition)?;
        if !stage.allow_manual_skip {
            info!(issue_number, stage = %stage.name, "Stage does not allow manual skip");
            return Ok(None);
        }

        let now = self.store.clock().utc();
        if let Some(current) = state.current_mut() {
            current.status = StageStatus::Skipped;
            current.completed_at = Some(now);
            current.add_note(&format!("Skipped: {reason}"));
        }
        self.store.save(&mut state).await?;
        info!(issue_number, stage = %stage.name, reason, "Skipped stage");
        self.post_notice(issue_number, &notices::stage_skipped(&stage.name, reason))
            .await;

        if stage.transition_for(TransitionEvent::ManualSkip).is_some() {
            let moved = self
                .transition_stage(issue_number, TransitionEvent::ManualSkip, definition)
                .await?;
            return Ok(moved.or(Some(state)));
        }

        let fallback = match definition.next_stage_after(&stage.name) {
            Some(next) => StageTransition::new(TransitionEvent::ManualSkip, &next.name),
            None => StageTransition::complete(TransitionEvent::ManualSkip),
        };
        self.apply_transition(state, &fallback, definition)
            .await
            .map(Some)
    }

    /// Stop the workflow for good. Terminal workflows are left alone.
    pub async fn cancel_workflow(
        &self,
        issue_number: u64,
        reason: &str,
    ) -> Result<Option<WorkflowState>> {
        let Some(mut state) = self.store.load(issue_number).await? else {
            return Ok(None);
        };
        if state.is_terminal() {
            return Ok(None);
        }

        let was_paused = state.status == WorkflowStatus::Paused;
        state.status = WorkflowStatus::Cancelled;
        if let Some(current) = state.current_mut() {
            current.add_note(&format!("Cancelled: {reason}"));
        }
        self.store.save(&mut state).await?;
        info!(issue_number, stage = %state.current_stage, reason, "Cancelled workflow");

        if was_paused {
            self.remove_paused_label(issue_number).await;
        }
        self.post_notice(issue_number, &notices::cancelled(&state, reason))
            .await;
        Ok(Some(state))
    }

    /// Fire `grace-period-expired` once a paused workflow's grace period has ended.
    pub async fn expire_grace_period(
        &self,
        issue_number: u64,
        definition: &WorkflowDefinition,
    ) -> Result<Option<WorkflowState>> {
        let Some(state) = self.store.load(issue_number).await? else {
            return Ok(None);
        };
        if state.status != WorkflowStatus::Paused {
            return Ok(None);
        }
        let Some(ends_at) = state.current().and_then(|stage| stage.grace_period_ends_at) else {
            return Ok(None);
        };
        let now = self.store.clock().utc();
        if now < ends_at {
            debug!(issue_number, ends_at = %ends_at, "Grace period still running");
            return Ok(None);
        }

        self.transition_stage(issue_number, TransitionEvent::GracePeriodExpired, definition)
            .await
    }

    /// Route a parsed trigger to the matching operation.
    pub async fn dispatch(
        &self,
        issue_number: u64,
        command: &TriggerCommand,
        definition: &WorkflowDefinition,
    ) -> Result<Option<WorkflowState>> {
        match command {
            TriggerCommand::Event(event) => {
                self.transition_stage(issue_number, *event, definition).await
            }
            TriggerCommand::Skip { reason } => {
                self.skip_stage(issue_number, definition, reason).await
            }
            TriggerCommand::Cancel { reason } => self.cancel_workflow(issue_number, reason).await,
        }
    }

    /// A task issue was closed: mark it completed on its parent, and fire
    /// `task-completed` once every task of the parent's current stage is done.
    pub async fn handle_task_closed(&self, task_issue: u64) -> Result<Option<WorkflowState>> {
        let issue = self.store.tracker().get_issue(task_issue).await?;
        let Some((parent_issue, stage)) = parent_issue_from_body(&issue.body) else {
            debug!(task_issue, "Closed issue is not a workflow task");
            return Ok(None);
        };

        self.tasks
            .update_task_status(parent_issue, task_issue, TaskStatus::Completed)
            .await?;

        let Some(state) = self.store.load(parent_issue).await? else {
            return Ok(None);
        };
        if state.current_stage != stage {
            debug!(parent_issue, task_issue, stage = %stage, "Task belongs to an earlier stage");
            return Ok(None);
        }
        if !self
            .tasks
            .are_all_tasks_completed(parent_issue, &state.current_stage)
            .await?
        {
            return Ok(None);
        }

        let definition = self.definition_for(&state)?;
        self.transition_stage(parent_issue, TransitionEvent::TaskCompleted, definition)
            .await
    }
}
