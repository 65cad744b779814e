use octocrab::Octocrab;

use super::errors::GitHubError;
use super::types::{IssueDetails, IssueState, NewIssue};

/// Handler for GitHub issue operations
#[derive(Debug, Clone)]
pub struct IssueHandler {
    octocrab: Octocrab,
    owner: String,
    repo: String,
}

impl IssueHandler {
    pub fn new(octocrab: Octocrab, owner: String, repo: String) -> Self {
        Self {
            octocrab,
            owner,
            repo,
        }
    }

    /// Fetch a specific issue by number
    pub async fn fetch_issue(&self, issue_number: u64) -> Result<IssueDetails, GitHubError> {
        let issue = self
            .octocrab
            .issues(&self.owner, &self.repo)
            .get(issue_number)
            .await?;

        Ok(to_details(issue))
    }

    /// Replace the issue body
    pub async fn update_body(&self, issue_number: u64, body: &str) -> Result<(), GitHubError> {
        self.octocrab
            .issues(&self.owner, &self.repo)
            .update(issue_number)
            .body(body)
            .send()
            .await?;

        tracing::debug!("Updated body of issue #{}", issue_number);
        Ok(())
    }

    /// Create a new issue
    pub async fn create_issue(&self, new_issue: &NewIssue) -> Result<IssueDetails, GitHubError> {
        let issue = self
            .octocrab
            .issues(&self.owner, &self.repo)
            .create(&new_issue.title)
            .body(&new_issue.body)
            .labels(new_issue.labels.clone())
            .assignees(new_issue.assignees.clone())
            .send()
            .await?;

        tracing::info!("Created issue #{}: {}", issue.number, new_issue.title);
        Ok(to_details(issue))
    }

    /// Add labels to an issue
    pub async fn add_labels(&self, issue_number: u64, labels: &[String]) -> Result<(), GitHubError> {
        self.octocrab
            .issues(&self.owner, &self.repo)
            .add_labels(issue_number, labels)
            .await?;
        Ok(())
    }

    /// Remove a label from an issue; a missing label is treated as already removed
    pub async fn remove_label(&self, issue_number: u64, label: &str) -> Result<(), GitHubError> {
        match self
            .octocrab
            .issues(&self.owner, &self.repo)
            .remove_label(issue_number, label)
            .await
        {
            Ok(_) => Ok(()),
            Err(err) => {
                let err = GitHubError::from(err);
                if err.is_not_found() {
                    tracing::debug!("Label '{}' was not on issue #{}", label, issue_number);
                    Ok(())
                } else {
                    Err(err)
                }
            }
        }
    }
}

fn to_details(issue: octocrab::models::issues::Issue) -> IssueDetails {
    let state = match issue.state {
        octocrab::models::IssueState::Closed => IssueState::Closed,
        _ => IssueState::Open,
    };

    IssueDetails {
        number: issue.number,
        title: issue.title,
        body: issue.body.unwrap_or_default(),
        labels: issue.labels.into_iter().map(|label| label.name).collect(),
        state,
        url: issue.html_url.to_string(),
    }
}
