//! Workflow definitions shipped with the binary.

use super::definition::{
    Stage, StageTransition, TaskTemplate, TransitionAction, TransitionCondition,
    TransitionEvent, WorkflowDefinition,
};

pub const DEPRECATION: &str = "deprecation";
pub const DEPRECATED_LABEL: &str = "deprecated";

fn tasks_done() -> TransitionCondition {
    TransitionCondition::AllTasksCompleted { stage: None }
}

/// Catalog dataset deprecation: review, notify, wait, remove, verify.
pub fn deprecation_workflow() -> WorkflowDefinition {
    WorkflowDefinition::new(
        DEPRECATION,
        "Dataset deprecation",
        "Retire a catalog dataset after consumers have been notified and given time to migrate.",
    )
    .with_trigger_label(DEPRECATION)
    .with_body_marker("### Dataset Name")
    .with_stage(
        Stage::new("review", "The data owner reviews the request and its downstream impact.")
            .with_assignee_role("data-owner")
            .with_task(
                TaskTemplate::new(
                    "Review deprecation of {{dataset_name}}",
                    "Confirm that **{{dataset_name}}** can be deprecated.\n\n\
                     Reason given: {{reason}}\n\n\
                     Close this issue once the review is done.",
                )
                .with_labels(&["review"]),
            )
            .with_transition(
                StageTransition::new(TransitionEvent::TaskCompleted, "notification")
                    .with_condition(tasks_done()),
            )
            .with_transition(StageTransition::new(
                TransitionEvent::ManualOverride,
                "notification",
            )),
    )
    .with_stage(
        Stage::new("notification", "Known consumers are told about the upcoming removal.")
            .with_assignee_role("data-steward")
            .with_task(TaskTemplate::new(
                "Notify consumers of {{dataset_name}}",
                "Announce the deprecation of **{{dataset_name}}** to every known consumer.",
            ))
            .with_transition(
                StageTransition::new(TransitionEvent::TaskCompleted, "grace-period")
                    .with_condition(tasks_done())
                    .with_action(TransitionAction::AddLabel {
                        label: DEPRECATED_LABEL.to_string(),
                    }),
            )
            .skippable(),
    )
    .with_stage(
        Stage::new("grace-period", "Consumers have time to migrate away.")
            .with_grace_period(30)
            .with_transition(
                StageTransition::new(TransitionEvent::GracePeriodExpired, "removal")
                    .with_condition(TransitionCondition::GracePeriodElapsed),
            )
            .with_transition(StageTransition::new(TransitionEvent::ManualOverride, "removal"))
            .skippable(),
    )
    .with_stage(
        Stage::new("removal", "The dataset is removed from the catalog and storage.")
            .with_assignee_role("platform")
            .with_task(TaskTemplate::new(
                "Remove {{dataset_name}} from the catalog",
                "Unpublish **{{dataset_name}}** and archive its tables.",
            ))
            .with_transition(
                StageTransition::new(TransitionEvent::TaskCompleted, "verification")
                    .with_condition(tasks_done()),
            ),
    )
    .with_stage(
        Stage::new("verification", "Removal is verified before the request is closed.")
            .with_transition(
                StageTransition::complete(TransitionEvent::ValidationPassed).with_action(
                    TransitionAction::PostComment {
                        body: "**{{dataset_name}}** has been fully deprecated. \
                               This issue can be closed."
                            .to_string(),
                    },
                ),
            )
            .with_transition(StageTransition::complete(TransitionEvent::ManualOverride)),
    )
}
