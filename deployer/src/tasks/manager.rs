//! Remote `before`/`after` commands

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::deploy::context::DeploymentContext;
use crate::errors::DeployError;
use crate::events::{self, EventBus, Listener};
use crate::models::deployment::TaskConfig;
use crate::tasks::{select_tasks, TYPE_AFTER, TYPE_BEFORE};

/// Server type able to execute commands
const COMMAND_SERVER_TYPE: &str = "ssh";

/// Runs the configured shell commands on the target server before and after
/// files are transferred.
pub struct TaskManager {
    selected: RwLock<Vec<TaskConfig>>,
}

impl TaskManager {
    pub const TYPE: &'static str = "ssh_command";
    pub const NAME: &'static str = "Executes a command on the target server.";

    pub fn new() -> Self {
        Self {
            selected: RwLock::new(Vec::new()),
        }
    }

    /// Register for all three lifecycle events
    pub fn subscribe(
        self: &Arc<Self>,
        bus: &mut EventBus<DeploymentContext>,
    ) -> Result<(), DeployError> {
        for event in [
            events::ON_START,
            events::ON_AFTER_LOCAL_REPO_PREPARED,
            events::ON_AFTER_DEPLOYMENT_COMPLETED,
        ] {
            bus.subscribe(event, self.clone())?;
        }
        Ok(())
    }

    /// Tasks picked on the last `deployment.onStart`
    pub async fn selected(&self) -> Vec<TaskConfig> {
        self.selected.read().await.clone()
    }

    async fn on_start(&self, context: &DeploymentContext) {
        let mut selected = self.selected.write().await;
        selected.clear();
        if context.in_list_mode() {
            return;
        }
        selected.extend(select_tasks(context.deployment()));
        debug!("{} task(s) selected for this run", selected.len());
    }

    async fn run_tasks_of_type(&self, task_type: &str, context: &DeploymentContext) {
        if context.in_list_mode() {
            return;
        }

        let tasks: Vec<TaskConfig> = self
            .selected()
            .await
            .into_iter()
            .filter(|task| task.task_type == task_type)
            .collect();
        if tasks.is_empty() {
            return;
        }

        let responder = context.responder();
        responder.log(&format!("Running {} tasks...", task_type));

        let server = context.server();
        if server.server_type() != COMMAND_SERVER_TYPE {
            responder.error("Server not of type SSH. Skipping tasks.");
            return;
        }

        let remote_path = context.remote_path();
        for task in tasks {
            responder.info(&format!("Executing task: {}", task.name));
            let command = format!("cd {} && {}", remote_path, task.command);

            match server.execute_command(&command).await {
                Ok(output) => {
                    info!("Task {} finished", task.id);
                    if !output.trim().is_empty() {
                        responder.log(output.trim());
                    }
                }
                Err(e) => {
                    warn!("Task {} failed: {}", task.id, e);
                    responder.danger("Task failed.");
                }
            }
        }
    }
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Listener<DeploymentContext> for TaskManager {
    async fn on_event(&self, event: &str, context: &mut DeploymentContext) -> Result<(), DeployError> {
        match event {
            events::ON_START => self.on_start(context).await,
            events::ON_AFTER_LOCAL_REPO_PREPARED => {
                self.run_tasks_of_type(TYPE_BEFORE, context).await
            }
            events::ON_AFTER_DEPLOYMENT_COMPLETED => {
                self.run_tasks_of_type(TYPE_AFTER, context).await
            }
            other => debug!("Ignoring event {}", other),
        }
        Ok(())
    }
}
