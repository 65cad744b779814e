pub mod client;
pub mod comments;
pub mod errors;
pub mod issues;
pub mod memory;
pub mod retry;
pub mod tracker;
pub mod types;

pub use client::GitHubClient;
pub use errors::GitHubError;
pub use memory::{InMemoryIssueTracker, TrackerCall, TrackerOperation};
pub use retry::{GitHubRetryHandler, RetryConfig};
#[cfg(any(test, feature = "testing"))]
pub use tracker::MockIssueTracker;
pub use tracker::{find_bot_comment, search_comments, IssueTracker};
pub use types::{bot_predicate, BotPredicate, CommentAuthor, IssueComment, IssueDetails, IssueState, NewIssue};
