use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::github::RetryConfig;
use crate::workflow::{OrchestratorSettings, StateLocation, DEFAULT_PAUSED_LABEL};

pub const CONFIG_FILE: &str = "issue-ops.toml";
pub const ENV_PREFIX: &str = "ISSUE_OPS";

/// Main configuration structure for issue-ops
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct IssueOpsConfig {
    /// GitHub configuration
    pub github: GitHubConfig,
    /// Workflow behaviour
    pub workflow: WorkflowConfig,
    /// Logging settings
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// GitHub API token (can be set via env var)
    pub token: Option<String>,
    /// Repository owner
    pub owner: String,
    /// Repository name
    pub repo: String,
    /// API base URL, for GitHub Enterprise
    pub api_url: Option<String>,
    /// Login of the account that owns the state comment
    pub bot_login: Option<String>,
    pub retry: RetryConfig,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None, // Read from GITHUB_TOKEN when unset
            owner: String::new(),
            repo: String::new(),
            api_url: None,
            bot_login: None,
            retry: RetryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Keep state in the issue body or in a dedicated bot comment
    pub state_location: StateLocation,
    /// Label applied while a workflow waits out a grace period
    pub paused_label: String,
    /// Extra label for every task issue
    pub task_label: Option<String>,
    /// Assignee for stages whose role has no mapping
    pub default_assignee: Option<String>,
    pub auto_create_tasks: bool,
    /// Reject saves when the stored state changed since it was loaded
    pub conflict_detection: bool,
    /// Stage role → GitHub login
    pub role_assignees: HashMap<String, String>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            state_location: StateLocation::IssueBody,
            paused_label: DEFAULT_PAUSED_LABEL.to_string(),
            task_label: Some("workflow-task".to_string()),
            default_assignee: None,
            auto_create_tasks: true,
            conflict_detection: false,
            role_assignees: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (overridden by RUST_LOG)
    pub log_level: String,
    /// Emit JSON lines instead of human-readable logs
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl IssueOpsConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. `issue-ops.toml` in the working directory
    /// 3. Environment variables (`ISSUE_OPS__GITHUB__OWNER`, ...)
    /// 4. `GITHUB_TOKEN` / `GITHUB_REPOSITORY` for anything still unset
    pub fn load() -> Result<Self> {
        let path = Path::new(CONFIG_FILE);
        Self::load_from(path.exists().then_some(path), None)
    }

    /// Like [`IssueOpsConfig::load`], with an explicit file and optionally an
    /// explicit environment instead of the process one.
    pub fn load_from(path: Option<&Path>, env: Option<HashMap<String, String>>) -> Result<Self> {
        let defaults = Config::try_from(&IssueOpsConfig::default())
            .context("Failed to build default configuration")?;
        let mut builder = Config::builder().add_source(defaults);

        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        let fallback_token = lookup(&env, "GITHUB_TOKEN");
        let fallback_repository = lookup(&env, "GITHUB_REPOSITORY");

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true)
                .source(env),
        );

        let mut config: IssueOpsConfig = builder
            .build()
            .context("Failed to load configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;

        if config.github.token.is_none() {
            config.github.token = fallback_token;
        }
        if config.github.owner.is_empty() || config.github.repo.is_empty() {
            if let Some((owner, repo)) = fallback_repository
                .as_deref()
                .and_then(|repository| repository.split_once('/'))
            {
                if config.github.owner.is_empty() {
                    config.github.owner = owner.to_string();
                }
                if config.github.repo.is_empty() {
                    config.github.repo = repo.to_string();
                }
            }
        }

        Ok(config)
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }

    /// Effective configuration as TOML, token redacted.
    pub fn to_toml(&self) -> Result<String> {
        let mut shown = self.clone();
        if shown.github.token.is_some() {
            shown.github.token = Some("***".to_string());
        }
        Ok(toml::to_string_pretty(&shown)?)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            paused_label: self.workflow.paused_label.clone(),
            default_assignee: self.workflow.default_assignee.clone(),
            role_assignees: self.workflow.role_assignees.clone(),
            auto_create_tasks: self.workflow.auto_create_tasks,
        }
    }
}

fn lookup(env: &Option<HashMap<String, String>>, key: &str) -> Option<String> {
    let value = match env {
        Some(map) => map.get(key).cloned(),
        None => std::env::var(key).ok(),
    };
    value.filter(|v| !v.trim().is_empty())
}
