//! Loads and saves the single workflow state attached to an issue.

use std::sync::Arc;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::codec::{self, STATE_MARKER};
use super::state::WorkflowState;
use crate::clock::SharedClock;
use crate::errors::{ErrorContext, IssueOpsError, Result};
use crate::github::{bot_predicate, find_bot_comment, BotPredicate, IssueComment, IssueTracker};

const STATE_COMMENT_HEADER: &str =
    "_This comment holds the workflow state for this issue. Please do not edit it._";

/// Where the state block for an issue is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateLocation {
    #[default]
    IssueBody,
    BotComment,
}

/// The text blob currently holding (or about to hold) the state.
enum Artifact {
    Body(String),
    Comment(Option<IssueComment>),
}

impl Artifact {
    fn text(&self) -> Option<&str> {
        match self {
            Artifact::Body(body) => Some(body),
            Artifact::Comment(comment) => comment.as_ref().map(|c| c.body.as_str()),
        }
    }
}

pub struct StateStore {
    tracker: Arc<dyn IssueTracker>,
    clock: SharedClock,
    location: StateLocation,
    is_bot: BotPredicate,
    conflict_detection: bool,
}

impl StateStore {
    pub fn new(tracker: Arc<dyn IssueTracker>, clock: SharedClock) -> Self {
        Self {
            tracker,
            clock,
            location: StateLocation::IssueBody,
            is_bot: bot_predicate(None),
            conflict_detection: false,
        }
    }

    pub fn with_location(mut self, location: StateLocation) -> Self {
        self.location = location;
        self
    }

    /// Decides which comments the store may treat as its own.
    pub fn with_bot_predicate(mut self, is_bot: BotPredicate) -> Self {
        self.is_bot = is_bot;
        self
    }

    pub fn with_conflict_detection(mut self, enabled: bool) -> Self {
        self.conflict_detection = enabled;
        self
    }

    pub fn location(&self) -> StateLocation {
        self.location
    }

    pub fn tracker(&self) -> &Arc<dyn IssueTracker> {
        &self.tracker
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    async fn read_artifact(&self, issue_number: u64) -> Result<Artifact> {
        match self.location {
            StateLocation::IssueBody => {
                let issue = self.tracker.get_issue(issue_number).await?;
                Ok(Artifact::Body(issue.body))
            }
            StateLocation::BotComment => {
                let comment = find_bot_comment(
                    self.tracker.as_ref(),
                    issue_number,
                    STATE_MARKER,
                    &self.is_bot,
                )
                .await?;
                Ok(Artifact::Comment(comment))
            }
        }
    }

    fn decode_for(issue_number: u64, text: Option<&str>) -> Result<Option<WorkflowState>> {
        let Some(text) = text else {
            return Ok(None);
        };
        let state = codec::decode(text).map_err(|e| e.with_context("issue_number", issue_number))?;
        if let Some(state) = &state {
            if state.issue_number != issue_number {
                return Err(IssueOpsError::invalid_state(format!(
                    "state block belongs to issue #{}",
                    state.issue_number
                ))
                .with_context("issue_number", issue_number));
            }
        }
        Ok(state)
    }

    /// The state stored for `issue_number`, or `None` when the issue carries none.
    pub async fn load(&self, issue_number: u64) -> Result<Option<WorkflowState>> {
        let artifact = self.read_artifact(issue_number).await?;
        let state = Self::decode_for(issue_number, artifact.text())?;
        debug!(
            issue_number,
            found = state.is_some(),
            location = ?self.location,
            "Loaded workflow state"
        );
        Ok(state)
    }

    /// Validate, stamp and write `state`.
    ///
    /// `updatedAt` always moves forward, even when the clock does not. On
    /// success `state` reflects exactly what was written.
    pub async fn save(&self, state: &mut WorkflowState) -> Result<()> {
        state.validate()?;
        let issue_number = state.issue_number;

        let artifact = self.read_artifact(issue_number).await?;

        let mut next = state.clone();
        if self.conflict_detection {
            if let Some(stored) = Self::decode_for(issue_number, artifact.text())? {
                if stored.revision != state.revision {
                    return Err(IssueOpsError::StateConflict {
                        issue_number,
                        expected: state.revision,
                        found: stored.revision,
                        context: ErrorContext::new(),
                    });
                }
            }
            next.revision += 1;
        }

        let floor = state.updated_at + Duration::milliseconds(1);
        next.updated_at = self.clock.utc().max(floor);

        match artifact {
            Artifact::Body(body) => {
                let updated = codec::embed(&body, &next)?;
                self.tracker.update_issue_body(issue_number, &updated).await?;
            }
            Artifact::Comment(Some(comment)) => {
                let updated = codec::embed(&comment.body, &next)?;
                self.tracker.update_comment(comment.id, &updated).await?;
            }
            Artifact::Comment(None) => {
                let body = codec::embed(STATE_COMMENT_HEADER, &next)?;
                let created = self.tracker.create_comment(issue_number, &body).await?;
                debug!(issue_number, comment_id = created.id, "Created state comment");
            }
        }

        info!(
            issue_number,
            stage = %next.current_stage,
            status = %next.status,
            revision = next.revision,
            "Saved workflow state"
        );
        *state = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::github::{InMemoryIssueTracker, MockIssueTracker, TrackerCall};
    use chrono::{DateTime, TimeZone, Utc};
    use std::collections::BTreeMap;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    fn state_for(issue: u64) -> WorkflowState {
        WorkflowState::new(issue, "deprecation", &["review", "approval"], BTreeMap::new(), start())
            .unwrap()
    }

    fn setup() -> (Arc<InMemoryIssueTracker>, Arc<ManualClock>) {
        let tracker = Arc::new(InMemoryIssueTracker::new());
        tracker.add_issue(42, "Deprecate roads", "### Dataset\n\nroads", &["deprecation"]);
        (tracker, Arc::new(ManualClock::new(start())))
    }

    #[tokio::test]
    async fn test_issue_without_state_loads_none() {
        let (tracker, clock) = setup();
        let store = StateStore::new(tracker, clock);
        assert!(store.load(42).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_embeds_state_in_body() {
        let (tracker, clock) = setup();
        let store = StateStore::new(tracker.clone(), clock);

        let mut state = state_for(42);
        store.save(&mut state).await.unwrap();

        let body = tracker.issue(42).unwrap().body;
        assert!(body.starts_with("### Dataset\n\nroads\n\n<!-- issue-ops-state\n"));
        assert_eq!(store.load(42).await.unwrap(), Some(state));
    }

    #[tokio::test]
    async fn test_updated_at_strictly_increases_with_frozen_clock() {
        let (tracker, clock) = setup();
        let store = StateStore::new(tracker, clock);

        let mut state = state_for(42);
        let mut previous = state.updated_at;
        for _ in 0..3 {
            store.save(&mut state).await.unwrap();
            assert!(state.updated_at > previous);
            previous = state.updated_at;
        }
    }

    #[tokio::test]
    async fn test_invalid_state_is_rejected_before_any_write() {
        let (tracker, clock) = setup();
        let store = StateStore::new(tracker.clone(), clock);

        let mut state = state_for(42);
        state.current_stage = "unknown".to_string();
        let err = store.save(&mut state).await.unwrap_err();

        assert!(matches!(err, IssueOpsError::InvalidState { .. }));
        assert!(tracker.calls().is_empty());
    }

    #[tokio::test]
    async fn test_state_from_another_issue_is_rejected() {
        let (tracker, clock) = setup();
        let block = codec::encode(&state_for(7)).unwrap();
        tracker.add_issue(8, "copy", &block, &[]);

        let store = StateStore::new(tracker, clock);
        assert!(store.load(8).await.is_err());
    }

    #[tokio::test]
    async fn test_bot_comment_is_created_once_then_updated() {
        let (tracker, clock) = setup();
        tracker.add_comment(42, "alice", false, "<!-- issue-ops-state\nnot mine\n-->");
        let store = StateStore::new(tracker.clone(), clock.clone())
            .with_location(StateLocation::BotComment);

        let mut state = state_for(42);
        store.save(&mut state).await.unwrap();
        clock.advance(Duration::hours(1));
        state.current_stage = "approval".to_string();
        store.save(&mut state).await.unwrap();

        let bot_comments: Vec<_> = tracker
            .comments(42)
            .into_iter()
            .filter(|c| c.author.is_bot)
            .collect();
        assert_eq!(bot_comments.len(), 1);
        assert!(bot_comments[0].body.starts_with(STATE_COMMENT_HEADER));

        let loaded = store.load(42).await.unwrap().unwrap();
        assert_eq!(loaded.current_stage, "approval");
        assert_eq!(loaded.updated_at, start() + Duration::hours(1));
        assert!(tracker
            .write_calls()
            .iter()
            .any(|call| matches!(call, TrackerCall::UpdateComment { .. })));
    }

    #[tokio::test]
    async fn test_conflicting_revision_is_detected() {
        let (tracker, clock) = setup();
        let store = StateStore::new(tracker.clone(), clock).with_conflict_detection(true);

        let mut state = state_for(42);
        store.save(&mut state).await.unwrap();
        assert_eq!(state.revision, 1);

        let mut first = store.load(42).await.unwrap().unwrap();
        let mut second = first.clone();
        store.save(&mut first).await.unwrap();

        let err = store.save(&mut second).await.unwrap_err();
        assert!(matches!(
            err,
            IssueOpsError::StateConflict {
                expected: 1,
                found: 2,
                ..
            }
        ));
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn test_tracker_failure_leaves_state_untouched() {
        let mut mock = MockIssueTracker::new();
        mock.expect_get_issue().returning(|_| {
            Err(crate::github::GitHubError::Status {
                status: 503,
                message: "unavailable".to_string(),
            })
        });
        let store = StateStore::new(Arc::new(mock), Arc::new(ManualClock::new(start())));

        let mut state = state_for(42);
        let before = state.clone();
        let err = store.save(&mut state).await.unwrap_err();

        assert!(matches!(err, IssueOpsError::IssueTracker { .. }));
        assert_eq!(state, before);
    }
}
