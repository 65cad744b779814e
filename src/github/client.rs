use async_trait::async_trait;
use octocrab::service::middleware::retry::RetryConfig as OctocrabRetry;
use octocrab::Octocrab;

use super::comments::CommentHandler;
use super::errors::GitHubError;
use super::issues::IssueHandler;
use super::retry::{GitHubRetryHandler, RetryConfig};
use super::tracker::IssueTracker;
use super::types::{IssueComment, IssueDetails, NewIssue};
use crate::config::GitHubConfig;

/// Octocrab-backed [`IssueTracker`] with retry on transient failures.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    issues: IssueHandler,
    comments: CommentHandler,
    retry_handler: GitHubRetryHandler,
    owner: String,
    repo: String,
}

impl GitHubClient {
    pub fn new(config: &GitHubConfig) -> Result<Self, GitHubError> {
        let token = config
            .token
            .as_deref()
            .filter(|token| !token.trim().is_empty())
            .ok_or_else(|| {
                GitHubError::TokenNotFound(
                    "Set GITHUB_TOKEN or ISSUE_OPS__GITHUB__TOKEN to a token with issues:write scope"
                        .to_string(),
                )
            })?;

        if config.owner.is_empty() || config.repo.is_empty() {
            return Err(GitHubError::ConfigNotFound(
                "Set GITHUB_REPOSITORY=owner/repo or github.owner and github.repo in issue-ops.toml"
                    .to_string(),
            ));
        }

        // Retries are decided by `GitHubRetryHandler` alone.
        let mut builder = Octocrab::builder()
            .personal_token(token.to_string())
            .add_retry_config(OctocrabRetry::None);
        if let Some(api_url) = &config.api_url {
            builder = builder.base_uri(api_url.as_str())?;
        }
        let octocrab = builder.build()?;

        Ok(Self::with_octocrab(
            octocrab,
            &config.owner,
            &config.repo,
            config.retry.clone(),
        ))
    }

    /// Build a client around an existing octocrab instance.
    pub fn with_octocrab(octocrab: Octocrab, owner: &str, repo: &str, retry: RetryConfig) -> Self {
        Self {
            issues: IssueHandler::new(octocrab.clone(), owner.to_string(), repo.to_string()),
            comments: CommentHandler::new(octocrab, owner.to_string(), repo.to_string()),
            retry_handler: GitHubRetryHandler::new(retry),
            owner: owner.to_string(),
            repo: repo.to_string(),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }
}

#[async_trait]
impl IssueTracker for GitHubClient {
    async fn get_issue(&self, issue_number: u64) -> Result<IssueDetails, GitHubError> {
        self.retry_handler
            .execute_with_retry("get_issue", || self.issues.fetch_issue(issue_number))
            .await
    }

    async fn update_issue_body(&self, issue_number: u64, body: &str) -> Result<(), GitHubError> {
        self.retry_handler
            .execute_with_retry("update_issue_body", || {
                self.issues.update_body(issue_number, body)
            })
            .await
    }

    async fn list_comments(&self, issue_number: u64) -> Result<Vec<IssueComment>, GitHubError> {
        self.retry_handler
            .execute_with_retry("list_comments", || {
                self.comments.get_issue_comments(issue_number)
            })
            .await
    }

    async fn create_comment(
        &self,
        issue_number: u64,
        body: &str,
    ) -> Result<IssueComment, GitHubError> {
        self.retry_handler
            .execute_create("create_comment", || {
                self.comments.create_issue_comment(issue_number, body)
            })
            .await
    }

    async fn update_comment(
        &self,
        comment_id: u64,
        body: &str,
    ) -> Result<IssueComment, GitHubError> {
        self.retry_handler
            .execute_with_retry("update_comment", || {
                self.comments.update_comment(comment_id, body)
            })
            .await
    }

    async fn create_issue(&self, issue: &NewIssue) -> Result<IssueDetails, GitHubError> {
        self.retry_handler
            .execute_create("create_issue", || self.issues.create_issue(issue))
            .await
    }

    async fn add_labels(&self, issue_number: u64, labels: &[String]) -> Result<(), GitHubError> {
        self.retry_handler
            .execute_with_retry("add_labels", || self.issues.add_labels(issue_number, labels))
            .await
    }

    async fn remove_label(&self, issue_number: u64, label: &str) -> Result<(), GitHubError> {
        self.retry_handler
            .execute_with_retry("remove_label", || {
                self.issues.remove_label(issue_number, label)
            })
            .await
    }
}
