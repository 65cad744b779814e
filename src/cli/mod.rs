use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

#[derive(Parser)]
#[command(name = "issue-ops")]
#[command(about = "Issue-driven deprecation workflows for catalog datasets")]
#[command(long_about = "issue-ops runs multi-stage workflows whose state lives inside the GitHub issue \
                       itself. Wire its commands to issue, label and comment events, and run \
                       'issue-ops check-grace' on a schedule.")]
pub struct Cli {
    /// Read and print, but send every write to an in-memory copy of the issues
    #[arg(long, global = true, help = "Preview changes without writing to GitHub")]
    pub dry_run: bool,

    /// Configuration file (defaults to ./issue-ops.toml when present)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start a workflow on an issue
    Init {
        /// Issue number
        issue: u64,
        /// Workflow type (detected from labels and body when omitted)
        #[arg(long, help = "Workflow type to start, e.g. 'deprecation'")]
        workflow: Option<String>,
    },
    /// Handle a raw label name or comment command (e.g. 'task-completed', '/skip reason')
    Trigger {
        /// Issue number
        issue: u64,
        /// Label name or comment body
        input: String,
    },
    /// Fire a transition event
    Transition {
        /// Issue number
        issue: u64,
        /// task-completed, grace-period-expired, manual-override, manual-skip, validation-passed or error
        event: String,
    },
    /// Skip the current stage, when the workflow allows it
    Skip {
        /// Issue number
        issue: u64,
        #[arg(long, help = "Why the stage is skipped; recorded in the workflow state")]
        reason: String,
    },
    /// Cancel the workflow
    Cancel {
        /// Issue number
        issue: u64,
        #[arg(long, help = "Why the workflow is cancelled")]
        reason: String,
    },
    /// Record that a task issue was closed
    TaskClosed {
        /// Task issue number
        task: u64,
    },
    /// Advance workflows whose grace period has ended
    CheckGrace {
        /// Issues to check
        #[arg(required = true)]
        issues: Vec<u64>,
    },
    /// Show workflow status and task progress
    Summary {
        /// Issue number
        issue: u64,
        #[arg(long, help = "Only count tasks of this stage")]
        stage: Option<String>,
        #[arg(long, help = "Print the task summary as JSON")]
        json: bool,
    },
    /// Detect which workflow an issue belongs to
    Detect {
        /// Issue number
        issue: u64,
    },
    /// Print the effective configuration
    ShowConfig,
}
