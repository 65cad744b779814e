// In-memory issue tracker - no network side effects
//
// Backs the integration tests and `--dry-run`. Records every call so tests
// can assert on exactly what would have been sent to GitHub.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::errors::GitHubError;
use super::tracker::IssueTracker;
use super::types::{CommentAuthor, IssueComment, IssueDetails, IssueState, NewIssue};

/// Tracker operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackerOperation {
    GetIssue,
    UpdateIssueBody,
    ListComments,
    CreateComment,
    UpdateComment,
    CreateIssue,
    AddLabels,
    RemoveLabel,
}

/// A recorded tracker call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerCall {
    GetIssue { issue: u64 },
    UpdateIssueBody { issue: u64 },
    ListComments { issue: u64 },
    CreateComment { issue: u64, body: String },
    UpdateComment { comment_id: u64 },
    CreateIssue { title: String },
    AddLabels { issue: u64, labels: Vec<String> },
    RemoveLabel { issue: u64, label: String },
}

impl TrackerCall {
    /// Whether the call changes tracker state.
    pub fn is_write(&self) -> bool {
        !matches!(
            self,
            TrackerCall::GetIssue { .. } | TrackerCall::ListComments { .. }
        )
    }
}

#[derive(Debug, Clone)]
struct FailureRule {
    remaining_successes: usize,
    status: u16,
}

#[derive(Debug, Clone)]
struct StoredComment {
    issue: u64,
    comment: IssueComment,
}

#[derive(Debug, Default)]
struct Inner {
    issues: BTreeMap<u64, IssueDetails>,
    comments: Vec<StoredComment>,
    next_issue: u64,
    next_comment: u64,
    failures: HashMap<TrackerOperation, FailureRule>,
    calls: Vec<TrackerCall>,
}

#[derive(Debug)]
pub struct InMemoryIssueTracker {
    inner: Mutex<Inner>,
    bot: CommentAuthor,
    repository: String,
}

impl Default for InMemoryIssueTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryIssueTracker {
    pub fn new() -> Self {
        Self::with_bot_login("issue-ops[bot]")
    }

    /// Comments created through the tracker are authored by `login`.
    pub fn with_bot_login(login: &str) -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_issue: 1,
                next_comment: 1,
                ..Default::default()
            }),
            bot: CommentAuthor {
                login: login.to_string(),
                is_bot: true,
            },
            repository: "example/catalog".to_string(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn url_for(&self, number: u64) -> String {
        format!("https://github.com/{}/issues/{}", self.repository, number)
    }

    /// Seed an issue with the given number.
    pub fn add_issue(&self, number: u64, title: &str, body: &str, labels: &[&str]) {
        let url = self.url_for(number);
        let mut inner = self.lock();
        inner.issues.insert(
            number,
            IssueDetails {
                number,
                title: title.to_string(),
                body: body.to_string(),
                labels: labels.iter().map(|l| l.to_string()).collect(),
                state: IssueState::Open,
                url,
            },
        );
        inner.next_issue = inner.next_issue.max(number + 1);
    }

    /// Seed a comment, e.g. one written by a human.
    pub fn add_comment(&self, issue: u64, login: &str, is_bot: bool, body: &str) -> u64 {
        let mut inner = self.lock();
        let id = inner.next_comment;
        inner.next_comment += 1;
        inner.comments.push(StoredComment {
            issue,
            comment: IssueComment {
                id,
                body: body.to_string(),
                author: CommentAuthor {
                    login: login.to_string(),
                    is_bot,
                },
            },
        });
        id
    }

    pub fn close_issue(&self, number: u64) {
        if let Some(issue) = self.lock().issues.get_mut(&number) {
            issue.state = IssueState::Closed;
        }
    }

    /// Make every call to `operation` fail with `status`.
    pub fn fail(&self, operation: TrackerOperation, status: u16) {
        self.fail_after(operation, 0, status);
    }

    /// Let `successes` calls to `operation` succeed, then fail with `status`.
    pub fn fail_after(&self, operation: TrackerOperation, successes: usize, status: u16) {
        self.lock().failures.insert(
            operation,
            FailureRule {
                remaining_successes: successes,
                status,
            },
        );
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    pub fn issue(&self, number: u64) -> Option<IssueDetails> {
        self.lock().issues.get(&number).cloned()
    }

    pub fn labels(&self, number: u64) -> Vec<String> {
        self.issue(number).map(|i| i.labels).unwrap_or_default()
    }

    pub fn comments(&self, issue: u64) -> Vec<IssueComment> {
        self.lock()
            .comments
            .iter()
            .filter(|c| c.issue == issue)
            .map(|c| c.comment.clone())
            .collect()
    }

    /// Number of issues the tracker holds, seeded or created.
    pub fn issue_count(&self) -> usize {
        self.lock().issues.len()
    }

    pub fn calls(&self) -> Vec<TrackerCall> {
        self.lock().calls.clone()
    }

    pub fn write_calls(&self) -> Vec<TrackerCall> {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.is_write())
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    fn record(&self, call: TrackerCall, operation: TrackerOperation) -> Result<(), GitHubError> {
        let mut inner = self.lock();
        inner.calls.push(call);

        if let Some(rule) = inner.failures.get_mut(&operation) {
            if rule.remaining_successes == 0 {
                return Err(GitHubError::Status {
                    status: rule.status,
                    message: format!("injected failure for {operation:?}"),
                });
            }
            rule.remaining_successes -= 1;
        }
        Ok(())
    }
}

#[async_trait]
impl IssueTracker for InMemoryIssueTracker {
    async fn get_issue(&self, issue_number: u64) -> Result<IssueDetails, GitHubError> {
        self.record(
            TrackerCall::GetIssue {
                issue: issue_number,
            },
            TrackerOperation::GetIssue,
        )?;
        self.issue(issue_number)
            .ok_or(GitHubError::IssueNotFound(issue_number))
    }

    async fn update_issue_body(&self, issue_number: u64, body: &str) -> Result<(), GitHubError> {
        self.record(
            TrackerCall::UpdateIssueBody {
                issue: issue_number,
            },
            TrackerOperation::UpdateIssueBody,
        )?;
        let mut inner = self.lock();
        let issue = inner
            .issues
            .get_mut(&issue_number)
            .ok_or(GitHubError::IssueNotFound(issue_number))?;
        issue.body = body.to_string();
        Ok(())
    }

    async fn list_comments(&self, issue_number: u64) -> Result<Vec<IssueComment>, GitHubError> {
        self.record(
            TrackerCall::ListComments {
                issue: issue_number,
            },
            TrackerOperation::ListComments,
        )?;
        Ok(self.comments(issue_number))
    }

    async fn create_comment(
        &self,
        issue_number: u64,
        body: &str,
    ) -> Result<IssueComment, GitHubError> {
        self.record(
            TrackerCall::CreateComment {
                issue: issue_number,
                body: body.to_string(),
            },
            TrackerOperation::CreateComment,
        )?;
        if self.issue(issue_number).is_none() {
            return Err(GitHubError::IssueNotFound(issue_number));
        }
        let id = self.add_comment(issue_number, &self.bot.login, self.bot.is_bot, body);
        Ok(IssueComment {
            id,
            body: body.to_string(),
            author: self.bot.clone(),
        })
    }

    async fn update_comment(
        &self,
        comment_id: u64,
        body: &str,
    ) -> Result<IssueComment, GitHubError> {
        self.record(
            TrackerCall::UpdateComment { comment_id },
            TrackerOperation::UpdateComment,
        )?;
        let mut inner = self.lock();
        let stored = inner
            .comments
            .iter_mut()
            .find(|c| c.comment.id == comment_id)
            .ok_or(GitHubError::CommentNotFound(comment_id))?;
        stored.comment.body = body.to_string();
        Ok(stored.comment.clone())
    }

    async fn create_issue(&self, issue: &NewIssue) -> Result<IssueDetails, GitHubError> {
        self.record(
            TrackerCall::CreateIssue {
                title: issue.title.clone(),
            },
            TrackerOperation::CreateIssue,
        )?;
        let number = {
            let mut inner = self.lock();
            let number = inner.next_issue;
            inner.next_issue += 1;
            number
        };
        let labels: Vec<&str> = issue.labels.iter().map(String::as_str).collect();
        self.add_issue(number, &issue.title, &issue.body, &labels);
        self.issue(number).ok_or(GitHubError::IssueNotFound(number))
    }

    async fn add_labels(&self, issue_number: u64, labels: &[String]) -> Result<(), GitHubError> {
        self.record(
            TrackerCall::AddLabels {
                issue: issue_number,
                labels: labels.to_vec(),
            },
            TrackerOperation::AddLabels,
        )?;
        let mut inner = self.lock();
        let issue = inner
            .issues
            .get_mut(&issue_number)
            .ok_or(GitHubError::IssueNotFound(issue_number))?;
        for label in labels {
            if !issue.labels.contains(label) {
                issue.labels.push(label.clone());
            }
        }
        Ok(())
    }

    async fn remove_label(&self, issue_number: u64, label: &str) -> Result<(), GitHubError> {
        self.record(
            TrackerCall::RemoveLabel {
                issue: issue_number,
                label: label.to_string(),
            },
            TrackerOperation::RemoveLabel,
        )?;
        let mut inner = self.lock();
        let issue = inner
            .issues
            .get_mut(&issue_number)
            .ok_or(GitHubError::IssueNotFound(issue_number))?;
        issue.labels.retain(|existing| existing != label);
        Ok(())
    }
}
