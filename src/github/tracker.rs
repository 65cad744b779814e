//! Issue tracker port
//!
//! The workflow core only talks to the tracker through [`IssueTracker`], so
//! the octocrab client, the in-memory tracker and `mockall` mocks are
//! interchangeable.

use async_trait::async_trait;

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

use super::errors::GitHubError;
use super::types::{BotPredicate, IssueComment, IssueDetails, NewIssue};

#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Fetch a single issue
    async fn get_issue(&self, issue_number: u64) -> Result<IssueDetails, GitHubError>;

    /// Replace the body of an issue
    async fn update_issue_body(&self, issue_number: u64, body: &str) -> Result<(), GitHubError>;

    /// List every comment on an issue, oldest first
    async fn list_comments(&self, issue_number: u64) -> Result<Vec<IssueComment>, GitHubError>;

    async fn create_comment(
        &self,
        issue_number: u64,
        body: &str,
    ) -> Result<IssueComment, GitHubError>;

    async fn update_comment(&self, comment_id: u64, body: &str)
        -> Result<IssueComment, GitHubError>;

    /// Open a new issue and return it
    async fn create_issue(&self, issue: &NewIssue) -> Result<IssueDetails, GitHubError>;

    async fn add_labels(&self, issue_number: u64, labels: &[String]) -> Result<(), GitHubError>;

    /// Remove a label; removing a label the issue does not carry is not an error
    async fn remove_label(&self, issue_number: u64, label: &str) -> Result<(), GitHubError>;
}

/// Find the first comment on `issue_number` that is owned by the bot and contains `marker`.
pub async fn find_bot_comment(
    tracker: &dyn IssueTracker,
    issue_number: u64,
    marker: &str,
    is_bot: &BotPredicate,
) -> Result<Option<IssueComment>, GitHubError> {
    let comments = tracker.list_comments(issue_number).await?;

    Ok(comments
        .into_iter()
        .find(|comment| is_bot(&comment.author) && comment.body.contains(marker)))
}

/// Comments containing `search_text`, in thread order.
pub async fn search_comments(
    tracker: &dyn IssueTracker,
    issue_number: u64,
    search_text: &str,
) -> Result<Vec<IssueComment>, GitHubError> {
    let comments = tracker.list_comments(issue_number).await?;

    Ok(comments
        .into_iter()
        .filter(|comment| comment.body.contains(search_text))
        .collect())
}
