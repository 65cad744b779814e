//! End-to-end orchestrator scenarios against the in-memory tracker.

mod common;

use std::collections::BTreeMap;

use chrono::Duration;
use common::{review_approval, start, Harness, ISSUE};
use issue_ops::github::{TrackerCall, TrackerOperation};
use issue_ops::workflow::builtin::deprecation_workflow;
use issue_ops::workflow::{
    codec, Stage, StageStatus, StageTransition, TransitionAction, TransitionCondition,
    TransitionEvent, TriggerCommand, WorkflowDefinition, WorkflowStatus, DEFAULT_PAUSED_LABEL,
};
use issue_ops::IssueOpsError;

fn grace_flow(days: u32) -> WorkflowDefinition {
    WorkflowDefinition::new("grace-flow", "Grace flow", "")
        .with_stage(
            Stage::new("notify", "")
                .with_transition(StageTransition::new(TransitionEvent::TaskCompleted, "wait")),
        )
        .with_stage(
            Stage::new("wait", "")
                .with_grace_period(days)
                .with_transition(
                    StageTransition::new(TransitionEvent::GracePeriodExpired, "remove")
                        .with_condition(TransitionCondition::GracePeriodElapsed),
                ),
        )
        .with_stage(
            Stage::new("remove", "")
                .with_transition(StageTransition::complete(TransitionEvent::TaskCompleted)),
        )
}

#[tokio::test]
async fn test_review_approval_scenario_for_issue_42() {
    let h = Harness::new();
    let definition = review_approval();

    let state = h
        .orchestrator
        .initialize_workflow(ISSUE, &definition, BTreeMap::new())
        .await
        .unwrap();
    assert_eq!(state.current_stage, "review");
    assert_eq!(state.stages["review"].status, StageStatus::InProgress);
    assert_eq!(state.stages["approval"].status, StageStatus::Pending);
    assert_eq!(state.stages_in_progress(), 1);

    h.clock.advance(Duration::hours(1));
    let state = h
        .orchestrator
        .transition_stage(ISSUE, TransitionEvent::TaskCompleted, &definition)
        .await
        .unwrap()
        .expect("review should advance");
    assert_eq!(state.current_stage, "approval");
    assert_eq!(state.stages["review"].status, StageStatus::Completed);
    assert_eq!(
        state.stages["review"].completed_at,
        Some(start() + Duration::hours(1))
    );
    assert_eq!(state.stages["approval"].status, StageStatus::InProgress);
    assert_eq!(state.stages_in_progress(), 1);

    let state = h
        .orchestrator
        .transition_stage(ISSUE, TransitionEvent::TaskCompleted, &definition)
        .await
        .unwrap()
        .expect("approval should complete the workflow");
    assert_eq!(state.status, WorkflowStatus::Completed);
    assert_eq!(state.current_stage, "approval");

    let stored = h.store.load(ISSUE).await.unwrap().unwrap();
    assert_eq!(stored, state);
}

#[tokio::test]
async fn test_initialization_posts_stage_overview() {
    let h = Harness::new();
    h.orchestrator
        .initialize_workflow(ISSUE, &review_approval(), BTreeMap::new())
        .await
        .unwrap();

    let comments = h.tracker.comments(ISSUE);
    assert_eq!(comments.len(), 1);
    let notice = &comments[0].body;
    assert!(notice.find("**review**").unwrap() < notice.find("**approval**").unwrap());
}

#[tokio::test]
async fn test_reinitializing_returns_existing_state() {
    let h = Harness::new();
    let definition = review_approval();
    let first = h
        .orchestrator
        .initialize_workflow(ISSUE, &definition, BTreeMap::new())
        .await
        .unwrap();
    h.tracker.clear_calls();

    let again = h
        .orchestrator
        .initialize_workflow(ISSUE, &definition, BTreeMap::new())
        .await
        .unwrap();

    assert_eq!(again, first);
    assert!(h.tracker.write_calls().is_empty());
}

#[tokio::test]
async fn test_zero_stage_definition_is_a_workflow_error() {
    let h = Harness::new();
    let empty = WorkflowDefinition::new("empty", "Empty", "");

    let err = h
        .orchestrator
        .initialize_workflow(ISSUE, &empty, BTreeMap::new())
        .await
        .unwrap_err();

    assert!(matches!(err, IssueOpsError::Workflow { .. }));
    assert!(h.tracker.write_calls().is_empty());
}

#[tokio::test]
async fn test_terminal_workflows_ignore_events_without_writes() {
    let h = Harness::new();
    let definition = review_approval();
    h.orchestrator
        .initialize_workflow(ISSUE, &definition, BTreeMap::new())
        .await
        .unwrap();
    h.orchestrator.cancel_workflow(ISSUE, "no longer needed").await.unwrap();
    h.tracker.clear_calls();

    for event in TransitionEvent::ALL {
        let outcome = h
            .orchestrator
            .transition_stage(ISSUE, event, &definition)
            .await
            .unwrap();
        assert!(outcome.is_none(), "{event} should not fire on a cancelled workflow");
    }
    assert!(h.orchestrator.cancel_workflow(ISSUE, "again").await.unwrap().is_none());
    assert!(h
        .orchestrator
        .skip_stage(ISSUE, &definition, "again")
        .await
        .unwrap()
        .is_none());
    assert!(h.tracker.write_calls().is_empty());
}

#[tokio::test]
async fn test_completed_workflows_ignore_events_without_writes() {
    let h = Harness::new();
    let definition = review_approval();
    h.orchestrator
        .initialize_workflow(ISSUE, &definition, BTreeMap::new())
        .await
        .unwrap();
    for _ in 0..2 {
        h.orchestrator
            .transition_stage(ISSUE, TransitionEvent::TaskCompleted, &definition)
            .await
            .unwrap()
            .unwrap();
    }
    let completed = h.store.load(ISSUE).await.unwrap().unwrap();
    assert_eq!(completed.status, WorkflowStatus::Completed);
    h.tracker.clear_calls();

    for event in TransitionEvent::ALL {
        let outcome = h
            .orchestrator
            .transition_stage(ISSUE, event, &definition)
            .await
            .unwrap();
        assert!(outcome.is_none(), "{event} should not fire on a completed workflow");
    }
    assert!(h.orchestrator.cancel_workflow(ISSUE, "too late").await.unwrap().is_none());
    assert!(h
        .orchestrator
        .expire_grace_period(ISSUE, &definition)
        .await
        .unwrap()
        .is_none());
    assert!(h.tracker.write_calls().is_empty());
    assert_eq!(h.store.load(ISSUE).await.unwrap().unwrap(), completed);
}

#[tokio::test]
async fn test_unmatched_event_and_false_condition_are_no_ops() {
    let definition = WorkflowDefinition::new("gated", "Gated", "")
        .with_stage(
            Stage::new("review", "").with_transition(
                StageTransition::new(TransitionEvent::ValidationPassed, "done").with_condition(
                    TransitionCondition::FieldEquals {
                        field: "approved".to_string(),
                        value: serde_json::json!(true),
                    },
                ),
            ),
        )
        .with_stage(Stage::new("done", ""));
    let h = Harness::new();
    h.orchestrator
        .initialize_workflow(ISSUE, &definition, BTreeMap::new())
        .await
        .unwrap();
    h.tracker.clear_calls();

    assert!(h
        .orchestrator
        .transition_stage(ISSUE, TransitionEvent::TaskCompleted, &definition)
        .await
        .unwrap()
        .is_none());
    assert!(h
        .orchestrator
        .transition_stage(ISSUE, TransitionEvent::ValidationPassed, &definition)
        .await
        .unwrap()
        .is_none());
    assert!(h.tracker.write_calls().is_empty());

    let mut state = h.store.load(ISSUE).await.unwrap().unwrap();
    assert!(!h
        .orchestrator
        .can_transition(&state, TransitionEvent::ValidationPassed, &definition));
    state.data.insert("approved".to_string(), serde_json::json!(true));
    h.store.save(&mut state).await.unwrap();
    assert!(h
        .orchestrator
        .can_transition(&state, TransitionEvent::ValidationPassed, &definition));

    let moved = h
        .orchestrator
        .transition_stage(ISSUE, TransitionEvent::ValidationPassed, &definition)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(moved.current_stage, "done");
}

#[tokio::test]
async fn test_missing_stage_definition_is_a_workflow_error() {
    let h = Harness::new();
    h.orchestrator
        .initialize_workflow(ISSUE, &review_approval(), BTreeMap::new())
        .await
        .unwrap();

    let renamed = WorkflowDefinition::new("review-flow", "Review flow", "")
        .with_stage(Stage::new("triage", ""));
    let err = h
        .orchestrator
        .transition_stage(ISSUE, TransitionEvent::TaskCompleted, &renamed)
        .await
        .unwrap_err();

    assert!(matches!(err, IssueOpsError::Workflow { .. }));
    assert!(!err.is_recoverable());
}

#[tokio::test]
async fn test_malformed_state_raises_invalid_state() {
    let h = Harness::new();
    h.tracker
        .add_issue(7, "broken", "text\n<!-- issue-ops-state\n{invalid}\n-->", &[]);

    let err = h
        .orchestrator
        .transition_stage(7, TransitionEvent::TaskCompleted, &review_approval())
        .await
        .unwrap_err();

    assert!(matches!(err, IssueOpsError::InvalidState { .. }));
    assert!(err.context()["snippet"].contains("{invalid}"));
}

#[tokio::test]
async fn test_grace_period_pauses_for_exactly_fourteen_days() {
    let definition = grace_flow(14);
    let h = Harness::new();
    h.orchestrator
        .initialize_workflow(ISSUE, &definition, BTreeMap::new())
        .await
        .unwrap();

    let entered_at = start() + Duration::days(2);
    h.clock.set(entered_at);
    let state = h
        .orchestrator
        .transition_stage(ISSUE, TransitionEvent::TaskCompleted, &definition)
        .await
        .unwrap()
        .unwrap();

    let wait = &state.stages["wait"];
    assert_eq!(state.status, WorkflowStatus::Paused);
    assert_eq!(wait.status, StageStatus::InProgress);
    assert_eq!(wait.started_at, Some(entered_at));
    assert_eq!(wait.grace_period_ends_at, Some(entered_at + Duration::days(14)));
    assert!(h.tracker.labels(ISSUE).contains(&DEFAULT_PAUSED_LABEL.to_string()));
    assert!(h
        .tracker
        .comments(ISSUE)
        .iter()
        .any(|c| c.body.contains("**14 days**")));
}

#[tokio::test]
async fn test_grace_expiry_waits_for_the_deadline_then_resumes() {
    let definition = grace_flow(14);
    let h = Harness::new();
    h.orchestrator
        .initialize_workflow(ISSUE, &definition, BTreeMap::new())
        .await
        .unwrap();
    h.orchestrator
        .transition_stage(ISSUE, TransitionEvent::TaskCompleted, &definition)
        .await
        .unwrap()
        .unwrap();

    h.clock.advance(Duration::days(14) - Duration::seconds(1));
    assert!(h
        .orchestrator
        .expire_grace_period(ISSUE, &definition)
        .await
        .unwrap()
        .is_none());
    assert!(h
        .orchestrator
        .transition_stage(ISSUE, TransitionEvent::GracePeriodExpired, &definition)
        .await
        .unwrap()
        .is_none());

    h.clock.advance(Duration::seconds(1));
    let state = h
        .orchestrator
        .expire_grace_period(ISSUE, &definition)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(state.current_stage, "remove");
    assert_eq!(state.status, WorkflowStatus::Active);
    assert_eq!(state.stages["wait"].status, StageStatus::Completed);
    assert!(!h.tracker.labels(ISSUE).contains(&DEFAULT_PAUSED_LABEL.to_string()));
}

#[tokio::test]
async fn test_skip_is_refused_when_stage_does_not_allow_it() {
    let h = Harness::new();
    let definition = review_approval();
    h.orchestrator
        .initialize_workflow(ISSUE, &definition, BTreeMap::new())
        .await
        .unwrap();
    let before = h.tracker.issue(ISSUE).unwrap().body;
    h.tracker.clear_calls();

    let outcome = h
        .orchestrator
        .skip_stage(ISSUE, &definition, "owner is on leave")
        .await
        .unwrap();

    assert!(outcome.is_none());
    assert!(h.tracker.write_calls().is_empty());
    assert_eq!(h.tracker.issue(ISSUE).unwrap().body, before);
}

#[tokio::test]
async fn test_skip_marks_stage_skipped_with_reason_and_moves_on() {
    let definition = WorkflowDefinition::new("skip-flow", "Skip flow", "")
        .with_stage(
            Stage::new("review", "")
                .skippable()
                .with_transition(StageTransition::new(TransitionEvent::ManualSkip, "approval")),
        )
        .with_stage(Stage::new("approval", ""));
    let h = Harness::new();
    h.orchestrator
        .initialize_workflow(ISSUE, &definition, BTreeMap::new())
        .await
        .unwrap();

    let reason = "Owner confirmed: no consumers left (see #17)";
    let state = h
        .orchestrator
        .skip_stage(ISSUE, &definition, reason)
        .await
        .unwrap()
        .unwrap();

    let review = &state.stages["review"];
    assert_eq!(review.status, StageStatus::Skipped);
    assert!(review.notes.as_deref().unwrap().contains(reason));
    assert_eq!(state.current_stage, "approval");
    assert_eq!(state.stages["approval"].status, StageStatus::InProgress);
    assert!(h
        .tracker
        .comments(ISSUE)
        .iter()
        .any(|c| c.body.contains(reason)));
}

#[tokio::test]
async fn test_skip_without_manual_skip_transition_uses_definition_order() {
    let definition = grace_flow(30);
    let definition = WorkflowDefinition {
        stages: definition
            .stages
            .into_iter()
            .map(|stage| if stage.name == "wait" { stage.skippable() } else { stage })
            .collect(),
        ..definition
    };
    let h = Harness::new();
    h.orchestrator
        .initialize_workflow(ISSUE, &definition, BTreeMap::new())
        .await
        .unwrap();
    h.orchestrator
        .transition_stage(ISSUE, TransitionEvent::TaskCompleted, &definition)
        .await
        .unwrap()
        .unwrap();

    let state = h
        .orchestrator
        .skip_stage(ISSUE, &definition, "migration already finished")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(state.current_stage, "remove");
    assert_eq!(state.status, WorkflowStatus::Active);
    assert_eq!(state.stages["wait"].status, StageStatus::Skipped);
    assert!(!h.tracker.labels(ISSUE).contains(&DEFAULT_PAUSED_LABEL.to_string()));
}

#[tokio::test]
async fn test_failing_action_does_not_block_later_actions_or_the_transition() {
    let definition = WorkflowDefinition::new("action-flow", "Action flow", "")
        .with_stage(
            Stage::new("review", "").with_transition(
                StageTransition::new(TransitionEvent::ManualOverride, "done")
                    .with_action(TransitionAction::AddLabel {
                        label: "approved".to_string(),
                    })
                    .with_action(TransitionAction::Notify {
                        recipients: vec!["@geo/stewards".to_string()],
                        message: "{{dataset_name}} approved".to_string(),
                    })
                    .with_action(TransitionAction::PostComment {
                        body: "Approved removal of {{dataset_name}}".to_string(),
                    }),
            ),
        )
        .with_stage(Stage::new("done", ""));
    let h = Harness::new();
    let mut data = BTreeMap::new();
    data.insert("dataset_name".to_string(), serde_json::json!("roads_2019"));
    h.orchestrator
        .initialize_workflow(ISSUE, &definition, data)
        .await
        .unwrap();
    h.tracker.fail(TrackerOperation::AddLabels, 500);

    let state = h
        .orchestrator
        .transition_stage(ISSUE, TransitionEvent::ManualOverride, &definition)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(state.current_stage, "done");
    assert_eq!(h.store.load(ISSUE).await.unwrap().unwrap().current_stage, "done");
    assert!(!h.tracker.labels(ISSUE).contains(&"approved".to_string()));
    assert!(h
        .tracker
        .comments(ISSUE)
        .iter()
        .any(|c| c.body == "Approved removal of roads_2019"));
}

#[tokio::test]
async fn test_failed_save_is_surfaced_and_nothing_else_happens() {
    let h = Harness::new();
    let definition = review_approval();
    h.orchestrator
        .initialize_workflow(ISSUE, &definition, BTreeMap::new())
        .await
        .unwrap();
    h.tracker.fail(TrackerOperation::UpdateIssueBody, 502);
    h.tracker.clear_calls();

    let err = h
        .orchestrator
        .transition_stage(ISSUE, TransitionEvent::TaskCompleted, &definition)
        .await
        .unwrap_err();

    assert!(err.is_recoverable());
    assert!(!h
        .tracker
        .calls()
        .iter()
        .any(|call| matches!(call, TrackerCall::CreateComment { .. })));
}

#[tokio::test]
async fn test_dispatch_routes_parsed_triggers() {
    let h = Harness::new();
    let definition = review_approval();
    h.orchestrator
        .initialize_workflow(ISSUE, &definition, BTreeMap::new())
        .await
        .unwrap();

    let advanced = h
        .orchestrator
        .dispatch(
            ISSUE,
            &TriggerCommand::parse("issue-ops:task-completed").unwrap(),
            &definition,
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(advanced.current_stage, "approval");

    let cancelled = h
        .orchestrator
        .dispatch(
            ISSUE,
            &TriggerCommand::parse("/cancel dataset is still in use").unwrap(),
            &definition,
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cancelled.status, WorkflowStatus::Cancelled);
    assert!(cancelled.stages["approval"]
        .notes
        .as_deref()
        .unwrap()
        .contains("dataset is still in use"));
}

#[tokio::test]
async fn test_bot_comment_location_keeps_body_untouched() {
    use issue_ops::workflow::{StateLocation, StateStore, WorkflowState};

    let h = Harness::new();
    let store = StateStore::new(h.tracker.clone(), h.clock.clone())
        .with_location(StateLocation::BotComment);
    let body_before = h.tracker.issue(ISSUE).unwrap().body;

    let mut state = WorkflowState::new(
        ISSUE,
        "review-flow",
        &["review", "approval"],
        BTreeMap::new(),
        start(),
    )
    .unwrap();
    store.save(&mut state).await.unwrap();
    store.save(&mut state).await.unwrap();

    assert_eq!(h.tracker.issue(ISSUE).unwrap().body, body_before);
    let holders: Vec<_> = h
        .tracker
        .comments(ISSUE)
        .into_iter()
        .filter(|c| codec::has_state_block(&c.body))
        .collect();
    assert_eq!(holders.len(), 1);
}

#[tokio::test]
async fn test_builtin_deprecation_runs_to_completion() {
    let h = Harness::with_settings(Default::default());
    let definition = deprecation_workflow();
    let body = h.tracker.issue(ISSUE).unwrap().body;
    let data = issue_ops::workflow::parse_issue_form(&body);

    let state = h
        .orchestrator
        .initialize_workflow(ISSUE, &definition, data)
        .await
        .unwrap();
    let review_tasks = &state.stages["review"].task_issues;
    assert_eq!(review_tasks.len(), 1);
    assert_eq!(review_tasks[0].title, "Review deprecation of roads_2019");

    // Closing the review task advances to notification and opens its task.
    let state = h
        .orchestrator
        .handle_task_closed(review_tasks[0].number)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state.current_stage, "notification");
    let notify_task = state.stages["notification"].task_issues[0].number;

    let state = h
        .orchestrator
        .handle_task_closed(notify_task)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state.current_stage, "grace-period");
    assert_eq!(state.status, WorkflowStatus::Paused);
    assert!(h.tracker.labels(ISSUE).contains(&"deprecated".to_string()));

    h.clock.advance(Duration::days(30));
    let state = h
        .orchestrator
        .expire_grace_period(ISSUE, &definition)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state.current_stage, "removal");
    let removal_task = state.stages["removal"].task_issues[0].number;

    let state = h
        .orchestrator
        .handle_task_closed(removal_task)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state.current_stage, "verification");

    let state = h
        .orchestrator
        .dispatch(ISSUE, &TriggerCommand::parse("/validated").unwrap(), &definition)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state.status, WorkflowStatus::Completed);
    assert!(h
        .tracker
        .comments(ISSUE)
        .iter()
        .any(|c| c.body.contains("**roads_2019** has been fully deprecated")));
}
