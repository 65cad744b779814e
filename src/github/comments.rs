use octocrab::Octocrab;

use super::errors::GitHubError;
use super::types::{CommentAuthor, IssueComment};

/// Handler for GitHub comment operations
#[derive(Debug, Clone)]
pub struct CommentHandler {
    octocrab: Octocrab,
    owner: String,
    repo: String,
}

impl CommentHandler {
    pub fn new(octocrab: Octocrab, owner: String, repo: String) -> Self {
        Self {
            octocrab,
            owner,
            repo,
        }
    }

    /// Create a comment on an issue
    pub async fn create_issue_comment(
        &self,
        issue_number: u64,
        body: &str,
    ) -> Result<IssueComment, GitHubError> {
        let comment = self
            .octocrab
            .issues(&self.owner, &self.repo)
            .create_comment(issue_number, body)
            .await?;

        tracing::debug!("Created comment on issue #{}", issue_number);
        Ok(to_comment(comment))
    }

    /// Get every comment for an issue, following pagination
    pub async fn get_issue_comments(
        &self,
        issue_number: u64,
    ) -> Result<Vec<IssueComment>, GitHubError> {
        let first_page = self
            .octocrab
            .issues(&self.owner, &self.repo)
            .list_comments(issue_number)
            .per_page(100)
            .send()
            .await?;

        let comments = self.octocrab.all_pages(first_page).await?;
        Ok(comments.into_iter().map(to_comment).collect())
    }

    /// Update an existing comment
    pub async fn update_comment(
        &self,
        comment_id: u64,
        body: &str,
    ) -> Result<IssueComment, GitHubError> {
        let comment = self
            .octocrab
            .issues(&self.owner, &self.repo)
            .update_comment(octocrab::models::CommentId(comment_id), body)
            .await?;

        tracing::debug!("Updated comment #{}", comment_id);
        Ok(to_comment(comment))
    }
}

fn to_comment(comment: octocrab::models::issues::Comment) -> IssueComment {
    IssueComment {
        id: comment.id.0,
        body: comment.body.unwrap_or_default(),
        author: CommentAuthor {
            is_bot: comment.user.r#type.eq_ignore_ascii_case("bot"),
            login: comment.user.login,
        },
    }
}
