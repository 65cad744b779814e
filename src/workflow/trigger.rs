//! Raw trigger parsing
//!
//! Labels and slash commands arriving from the tracker are turned into a
//! [`TriggerCommand`] the orchestrator can dispatch.

use super::definition::TransitionEvent;
use crate::errors::{IssueOpsError, Result};

const LABEL_PREFIX: &str = "issue-ops:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerCommand {
    Event(TransitionEvent),
    Skip { reason: String },
    Cancel { reason: String },
}

impl TriggerCommand {
    /// Parse a label name (`task-completed`, `issue-ops:manual-override`) or
    /// a comment command (`/skip`, `/cancel`, `/advance`, `/validated`).
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if let Some(command) = trimmed.strip_prefix('/') {
            return Self::parse_command(command);
        }

        let label = trimmed.strip_prefix(LABEL_PREFIX).unwrap_or(trimmed).trim();
        label.parse().map(TriggerCommand::Event)
    }

    /// The command name ends at the first whitespace; everything after it,
    /// including later lines, is the reason.
    fn parse_command(command: &str) -> Result<Self> {
        let (name, rest) = match command.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (command.trim(), ""),
        };

        match name.to_ascii_lowercase().as_str() {
            "skip" => Ok(TriggerCommand::Skip {
                reason: Self::reason_or_default(rest, "Skipped by command"),
            }),
            "cancel" => Ok(TriggerCommand::Cancel {
                reason: Self::reason_or_default(rest, "Cancelled by command"),
            }),
            "advance" => Ok(TriggerCommand::Event(TransitionEvent::ManualOverride)),
            "validated" => Ok(TriggerCommand::Event(TransitionEvent::ValidationPassed)),
            other => Err(IssueOpsError::validation(
                "command",
                format!("unknown command '/{other}'"),
            )),
        }
    }

    fn reason_or_default(reason: &str, fallback: &str) -> String {
        if reason.is_empty() {
            fallback.to_string()
        } else {
            reason.to_string()
        }
    }
}
