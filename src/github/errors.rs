use octocrab::Error as OctocrabError;
use thiserror::Error;

/// Failures talking to the issue tracker.
#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("GitHub token not found: {0}")]
    TokenNotFound(String),

    #[error("GitHub repository not configured: {0}")]
    ConfigNotFound(String),

    #[error("GitHub API error: {}", describe_api_error(.0))]
    ApiError(#[from] OctocrabError),

    #[error("issue #{0} not found")]
    IssueNotFound(u64),

    #[error("comment {0} not found")]
    CommentNotFound(u64),

    #[error("GitHub rate limit exceeded ({remaining} remaining), resets at {}", reset_time.format("%Y-%m-%d %H:%M:%S UTC"))]
    RateLimit {
        reset_time: chrono::DateTime<chrono::Utc>,
        remaining: u32,
    },

    #[error("GitHub operation '{operation}' timed out after {duration_ms}ms")]
    Timeout { operation: String, duration_ms: u64 },

    #[error("network error: {0}")]
    NetworkError(String),

    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },
}

fn describe_api_error(err: &OctocrabError) -> String {
    match err {
        OctocrabError::GitHub { source, .. } => {
            format!("HTTP {}: {}", source.status_code.as_u16(), source.message)
        }
        other => other.to_string(),
    }
}

impl GitHubError {
    /// HTTP status behind the failure, when there is one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            GitHubError::ApiError(OctocrabError::GitHub { source, .. }) => {
                Some(source.status_code.as_u16())
            }
            GitHubError::IssueNotFound(_) | GitHubError::CommentNotFound(_) => Some(404),
            GitHubError::RateLimit { .. } => Some(429),
            GitHubError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status_code() == Some(404)
    }

    /// Whether the retry layer should try the request again.
    ///
    /// Rate limiting, server errors and transport failures are retryable;
    /// authentication, configuration and other client errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            GitHubError::TokenNotFound(_) | GitHubError::ConfigNotFound(_) => false,
            GitHubError::Timeout { .. } | GitHubError::NetworkError(_) => true,
            GitHubError::RateLimit { .. } => true,
            GitHubError::ApiError(OctocrabError::Http { .. }) => true,
            _ => matches!(self.status_code(), Some(408 | 429 | 500..=599)),
        }
    }

    /// Rejected for rate limiting, so GitHub did not act on the request.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, GitHubError::RateLimit { .. }) || self.status_code() == Some(429)
    }

    /// Whether a caller could reasonably retry the whole invocation later.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            GitHubError::TokenNotFound(_) | GitHubError::ConfigNotFound(_)
        )
    }
}
