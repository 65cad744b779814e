use std::sync::Arc;

/// Open/closed state of a tracked issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueState {
    Open,
    Closed,
}

/// The subset of an issue the workflow core reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueDetails {
    pub number: u64,
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
    pub state: IssueState,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentAuthor {
    pub login: String,
    pub is_bot: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueComment {
    pub id: u64,
    pub body: String,
    pub author: CommentAuthor,
}

/// Request to open a new issue.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NewIssue {
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
    pub assignees: Vec<String>,
}

impl NewIssue {
    pub fn new(title: &str, body: &str) -> Self {
        Self {
            title: title.to_string(),
            body: body.to_string(),
            ..Default::default()
        }
    }

    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.labels = labels;
        self
    }

    pub fn with_assignee(mut self, assignee: Option<&str>) -> Self {
        self.assignees = assignee.map(|a| vec![a.to_string()]).unwrap_or_default();
        self
    }
}

/// Decides whether a comment author is the automation account that owns the state comment.
pub type BotPredicate = Arc<dyn Fn(&CommentAuthor) -> bool + Send + Sync>;

/// Matches the configured bot login, or any bot account when no login is configured.
pub fn bot_predicate(login: Option<&str>) -> BotPredicate {
    match login {
        Some(login) => {
            let login = login.to_string();
            Arc::new(move |author: &CommentAuthor| author.login.eq_ignore_ascii_case(&login))
        }
        None => Arc::new(|author: &CommentAuthor| author.is_bot),
    }
}
