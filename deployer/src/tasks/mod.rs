//! Deployment tasks
//!
//! Tasks hook into a run through the lifecycle events of the deployer. Two
//! kinds exist: [`TaskManager`] runs remote commands before and after the
//! transfer, [`TaskRunner`] evaluates `if`/`then` rules against the changeset.

pub mod manager;
pub mod rule;
pub mod runner;

use std::sync::Arc;

use serde::Serialize;

pub use manager::TaskManager;
pub use runner::TaskRunner;

use crate::deploy::context::DeploymentContext;
use crate::errors::DeployError;
use crate::events::EventBus;
use crate::models::deployment::{Deployment, TaskConfig};

/// Remote command run once the local repository is prepared
pub const TYPE_BEFORE: &str = "before";

/// Remote command run once the deployment completed
pub const TYPE_AFTER: &str = "after";

/// Rule evaluated between changeset computation and transfer
pub const TYPE_RULES: &str = "rules";

/// A task kind able to hook into a run
#[derive(Clone)]
pub enum Task {
    SshCommand(Arc<TaskManager>),
    TaskRunner(Arc<TaskRunner>),
}

impl Task {
    pub fn task_type(&self) -> &'static str {
        match self {
            Task::SshCommand(_) => TaskManager::TYPE,
            Task::TaskRunner(_) => TaskRunner::TYPE,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Task::SshCommand(_) => TaskManager::NAME,
            Task::TaskRunner(_) => TaskRunner::NAME,
        }
    }

    /// Register the task's listeners on the bus of a run
    pub fn subscribe_to_events(
        &self,
        bus: &mut EventBus<DeploymentContext>,
    ) -> Result<(), DeployError> {
        match self {
            Task::SshCommand(manager) => manager.subscribe(bus),
            Task::TaskRunner(runner) => runner.subscribe(bus),
        }
    }

    /// The rule runner, which the deployer drives directly after sorting
    pub fn rule_runner(&self) -> Option<Arc<TaskRunner>> {
        match self {
            Task::TaskRunner(runner) => Some(runner.clone()),
            Task::SshCommand(_) => None,
        }
    }
}

/// Type and description of a task kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskInfo {
    #[serde(rename = "type")]
    pub task_type: String,
    pub name: String,
}

/// Builds tasks from the type strings registered in the settings
#[derive(Debug, Clone)]
pub struct TaskFactory {
    registered: Vec<String>,
}

impl TaskFactory {
    pub fn new(registered: Vec<String>) -> Self {
        Self { registered }
    }

    /// Create a fresh task of `task_type`
    pub fn make(&self, task_type: &str) -> Result<Task, DeployError> {
        if !self.registered.iter().any(|t| t == task_type) {
            return Err(DeployError::ConfigError(format!(
                "Task type {} is not registered",
                task_type
            )));
        }

        match task_type {
            TaskManager::TYPE => Ok(Task::SshCommand(Arc::new(TaskManager::new()))),
            TaskRunner::TYPE => Ok(Task::TaskRunner(Arc::new(TaskRunner::new()))),
            other => Err(DeployError::ConfigError(format!(
                "Unknown task type: {}",
                other
            ))),
        }
    }

    /// One fresh instance of every registered task type
    pub fn make_all(&self) -> Vec<Result<Task, DeployError>> {
        self.registered.iter().map(|t| self.make(t)).collect()
    }

    /// Registered task kinds that can actually be built
    pub fn list_available_tasks(&self) -> Vec<TaskInfo> {
        self.registered
            .iter()
            .filter_map(|t| self.make(t).ok())
            .map(|task| TaskInfo {
                task_type: task.task_type().to_string(),
                name: task.name().to_string(),
            })
            .collect()
    }
}

impl Default for TaskFactory {
    fn default() -> Self {
        Self::new(vec![
            TaskManager::TYPE.to_string(),
            TaskRunner::TYPE.to_string(),
        ])
    }
}

/// Tasks of `deployment` that apply to the next run.
///
/// A non-empty explicit selection replaces the `run_by_default` flags
/// entirely: only ids present and enabled in it are kept.
pub fn select_tasks(deployment: &Deployment) -> Vec<TaskConfig> {
    match &deployment.tasks_to_run {
        Some(selection) if !selection.is_empty() => deployment
            .tasks
            .iter()
            .filter(|task| selection.get(&task.id).copied().unwrap_or(false))
            .cloned()
            .collect(),
        _ => deployment
            .tasks
            .iter()
            .filter(|task| task.run_by_default)
            .cloned()
            .collect(),
    }
}
