//! Deployment models

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::remote::ServerConfig;

/// Explicit per-run task selection: task id -> enabled
pub type TaskSelection = HashMap<String, bool>;

/// A deployment: which branch goes to which path of the target server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    /// Unique deployment ID
    pub id: String,

    /// Human readable name
    #[serde(default)]
    pub name: String,

    /// Branch to deploy
    pub branch: String,

    /// Path below the server root the branch is deployed to
    #[serde(default)]
    pub target_path: String,

    /// Tasks configured for this deployment
    #[serde(default)]
    pub tasks: Vec<TaskConfig>,

    /// Tasks explicitly selected for this run; overrides `run_by_default`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tasks_to_run: Option<TaskSelection>,

    /// Only compute the changeset, never touch the server
    #[serde(skip)]
    pub list_mode: bool,
}

impl Deployment {
    /// Create a deployment without tasks
    pub fn new(id: impl Into<String>, branch: impl Into<String>, target_path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            branch: branch.into(),
            target_path: target_path.into(),
            tasks: Vec::new(),
            tasks_to_run: None,
            list_mode: false,
        }
    }

    /// Set the explicit task selection for the next run
    pub fn set_tasks_to_run(&mut self, selection: TaskSelection) {
        self.tasks_to_run = Some(selection);
    }
}

/// A task configured on a deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Task ID, referenced by [`TaskSelection`]
    pub id: String,

    /// `before`, `after` or `rules`
    #[serde(rename = "type")]
    pub task_type: String,

    /// Display name
    pub name: String,

    /// Remote command for `before`/`after` tasks
    #[serde(default)]
    pub command: String,

    /// YAML rule for `rules` tasks
    #[serde(default)]
    pub arguments: String,

    /// Whether the task runs when no explicit selection is given
    #[serde(default)]
    pub run_by_default: bool,
}

/// Source repository configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Directory name of the working copy below the repositories path
    pub name: String,

    /// Clone URL
    pub url: String,
}

/// Everything needed to run one deployment, as stored on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentFile {
    pub deployment: Deployment,
    pub repository: RepositoryConfig,
    pub server: ServerConfig,
}

/// Log levels of the responder stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Log,
    Info,
    Danger,
    Error,
}

/// A progress message produced during a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentLog {
    /// Message severity
    pub level: LogKind,

    /// Log message
    pub message: String,

    /// When the message was emitted
    pub timestamp: DateTime<Utc>,
}
