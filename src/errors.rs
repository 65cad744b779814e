use std::collections::BTreeMap;
use thiserror::Error;

use crate::github::GitHubError;

/// Free-form diagnostic context attached to every error.
pub type ErrorContext = BTreeMap<String, String>;

pub type Result<T, E = IssueOpsError> = std::result::Result<T, E>;

/// Errors surfaced by the workflow core.
#[derive(Debug, Error)]
pub enum IssueOpsError {
    /// Persisted state is missing required data, unparseable, or violates an invariant.
    #[error("invalid workflow state: {message}")]
    InvalidState {
        message: String,
        context: ErrorContext,
    },

    /// A strict caller asked for a transition the current stage does not allow.
    #[error("invalid transition: {message}")]
    InvalidTransition {
        message: String,
        context: ErrorContext,
    },

    /// A workflow definition is malformed.
    #[error("configuration error: {message}")]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    /// State and definition disagree, or an operation cannot run on this workflow.
    #[error("workflow error: {message}")]
    Workflow {
        message: String,
        context: ErrorContext,
    },

    #[error("external service '{service}' failed: {message}")]
    ExternalService {
        service: String,
        message: String,
        status: Option<u16>,
        context: ErrorContext,
    },

    #[error("issue tracker request failed: {source}")]
    IssueTracker {
        #[source]
        source: GitHubError,
        context: ErrorContext,
    },

    #[error("{}: {message}", task_label(.task_number))]
    Task {
        task_number: Option<u64>,
        message: String,
        context: ErrorContext,
    },

    #[error("validation failed for '{field}': {message}")]
    Validation {
        field: String,
        message: String,
        context: ErrorContext,
    },

    /// The stored state changed between load and save.
    #[error("state for issue #{issue_number} changed concurrently (expected revision {expected}, found {found})")]
    StateConflict {
        issue_number: u64,
        expected: u64,
        found: u64,
        context: ErrorContext,
    },
}

fn task_label(task_number: &Option<u64>) -> String {
    match task_number {
        Some(number) => format!("task #{number} failed"),
        None => "task failed".to_string(),
    }
}

impl IssueOpsError {
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn invalid_transition(message: impl Into<String>) -> Self {
        Self::InvalidTransition {
            message: message.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn workflow(message: impl Into<String>) -> Self {
        Self::Workflow {
            message: message.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn external_service(
        service: impl Into<String>,
        message: impl Into<String>,
        status: Option<u16>,
    ) -> Self {
        Self::ExternalService {
            service: service.into(),
            message: message.into(),
            status,
            context: ErrorContext::new(),
        }
    }

    pub fn task(task_number: Option<u64>, message: impl Into<String>) -> Self {
        Self::Task {
            task_number,
            message: message.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
            context: ErrorContext::new(),
        }
    }

    /// Attach a diagnostic key/value pair, returning the error for chaining.
    pub fn with_context(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.context_mut().insert(key.into(), value.to_string());
        self
    }

    pub fn context(&self) -> &ErrorContext {
        match self {
            Self::InvalidState { context, .. }
            | Self::InvalidTransition { context, .. }
            | Self::Configuration { context, .. }
            | Self::Workflow { context, .. }
            | Self::ExternalService { context, .. }
            | Self::IssueTracker { context, .. }
            | Self::Task { context, .. }
            | Self::Validation { context, .. }
            | Self::StateConflict { context, .. } => context,
        }
    }

    fn context_mut(&mut self) -> &mut ErrorContext {
        match self {
            Self::InvalidState { context, .. }
            | Self::InvalidTransition { context, .. }
            | Self::Configuration { context, .. }
            | Self::Workflow { context, .. }
            | Self::ExternalService { context, .. }
            | Self::IssueTracker { context, .. }
            | Self::Task { context, .. }
            | Self::Validation { context, .. }
            | Self::StateConflict { context, .. } => context,
        }
    }

    /// Whether a caller-level retry could plausibly succeed.
    ///
    /// Structural errors (bad state, bad definitions, disallowed transitions)
    /// are fatal to the invocation. Collaborator failures are recoverable.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::InvalidState { .. }
            | Self::InvalidTransition { .. }
            | Self::Configuration { .. }
            | Self::Workflow { .. }
            | Self::Task { .. } => false,
            Self::ExternalService { .. } | Self::Validation { .. } | Self::StateConflict { .. } => {
                true
            }
            Self::IssueTracker { source, .. } => source.is_recoverable(),
        }
    }
}

impl From<GitHubError> for IssueOpsError {
    fn from(source: GitHubError) -> Self {
        Self::IssueTracker {
            source,
            context: ErrorContext::new(),
        }
    }
}
