//! Rule based tasks run against the local working copy

use std::path::{Component, Path};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs;
use tokio::process::Command;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::deploy::context::DeploymentContext;
use crate::errors::DeployError;
use crate::events::{self, EventBus, Listener};
use crate::filesys::dir::Dir;
use crate::models::deployment::TaskConfig;
use crate::tasks::rule::{Consequent, TaskRule, REPO_DIR_PLACEHOLDER};
use crate::tasks::{select_tasks, TYPE_RULES};

/// Evaluates the `rules` tasks of a deployment once the changeset is sorted.
///
/// Selection happens on `deployment.onStart`, evaluation is triggered by the
/// deployer right before files are transferred, since `upload` consequents
/// extend the changeset the transfer works on.
pub struct TaskRunner {
    selected: RwLock<Vec<TaskConfig>>,
}

impl TaskRunner {
    pub const TYPE: &'static str = "task_runner";
    pub const NAME: &'static str = "Runs conditional tasks against the local repository.";

    pub fn new() -> Self {
        Self {
            selected: RwLock::new(Vec::new()),
        }
    }

    /// Register for the events this task reacts to
    pub fn subscribe(
        self: &Arc<Self>,
        bus: &mut EventBus<DeploymentContext>,
    ) -> Result<(), DeployError> {
        bus.subscribe(events::ON_START, self.clone())
    }

    /// Rule tasks picked for the current run
    pub async fn selected(&self) -> Vec<TaskConfig> {
        self.selected.read().await.clone()
    }

    /// Evaluate every selected rule task in configuration order
    pub async fn run_tasks(&self, context: &mut DeploymentContext) {
        if context.in_list_mode() {
            return;
        }

        let tasks = self.selected().await;
        for task in tasks {
            context
                .responder()
                .info(&format!("Executing task: {}", task.name));

            let rule = match TaskRule::parse(&task.arguments) {
                Ok(rule) => rule,
                Err(e) => {
                    warn!("Invalid rule in task {}: {}", task.id, e);
                    context
                        .responder()
                        .danger("Skipping task. Invalid configuration.");
                    continue;
                }
            };

            if rule.conditions_match(context.changeset()) {
                handle_task_consequents(&rule.consequents, context).await;
            } else {
                debug!("Conditions of task {} did not match", task.id);
            }
        }
    }
}

impl Default for TaskRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Listener<DeploymentContext> for TaskRunner {
    async fn on_event(&self, event: &str, context: &mut DeploymentContext) -> Result<(), DeployError> {
        if event != events::ON_START {
            return Ok(());
        }

        let mut selected = self.selected.write().await;
        selected.clear();
        if context.in_list_mode() {
            return Ok(());
        }

        selected.extend(
            select_tasks(context.deployment())
                .into_iter()
                .filter(|task| task.task_type == TYPE_RULES),
        );
        debug!("{} rule task(s) selected", selected.len());
        Ok(())
    }
}

/// Run the consequents of a matched rule in document order
pub async fn handle_task_consequents(consequents: &[Consequent], context: &mut DeploymentContext) {
    for consequent in consequents {
        match consequent {
            Consequent::Exec(commands) => exec(commands, context).await,
            Consequent::Upload(paths) => upload(paths, context).await,
            Consequent::Unknown(kind) => warn!("Invalid task action: {}", kind),
        }
    }
}

/// Run shell commands locally. Failures are reported and the next command runs.
async fn exec(commands: &[String], context: &DeploymentContext) {
    let repo_dir = repo_dir(context.repository().local_path());

    for template in commands {
        let command = template.replace(REPO_DIR_PLACEHOLDER, &repo_dir);
        info!("Running task command: {}", command);

        let output = Command::new("sh")
            .arg("-c")
            .arg(&command)
            .stdin(Stdio::null())
            .output()
            .await;

        match output {
            Ok(output) if output.status.success() => {
                debug!("Command output: {}", String::from_utf8_lossy(&output.stdout).trim());
            }
            Ok(output) => {
                warn!(
                    "Task command exited with {:?}: {}\n{}{}",
                    output.status.code(),
                    command,
                    String::from_utf8_lossy(&output.stdout),
                    String::from_utf8_lossy(&output.stderr)
                );
                context
                    .responder()
                    .danger(&format!("Task command failed: {}", command));
            }
            Err(e) => {
                warn!("Failed to spawn task command {}: {}", command, e);
                context
                    .responder()
                    .danger(&format!("Task command failed: {}", command));
            }
        }
    }
}

/// Append repository files to the upload list.
///
/// Paths are resolved against the working copy; anything that resolves
/// outside of it is treated as missing.
async fn upload(paths: &[String], context: &mut DeploymentContext) {
    let root = match fs::canonicalize(context.repository().local_path()).await {
        Ok(root) => root,
        Err(e) => {
            warn!("Repository directory not accessible: {}", e);
            return;
        }
    };
    let mut files = Vec::new();

    for path in paths {
        let absolute = match fs::canonicalize(root.join(path.trim_start_matches('/'))).await {
            Ok(absolute) if absolute.starts_with(&root) => absolute,
            _ => {
                warn!("File to upload does not exist in repository: {}", path);
                continue;
            }
        };
        let metadata = match fs::metadata(&absolute).await {
            Ok(metadata) => metadata,
            Err(_) => {
                warn!("File to upload does not exist in repository: {}", path);
                continue;
            }
        };

        if metadata.is_file() {
            if let Some(relative) = relative_path(&root, &absolute) {
                files.push(relative);
            }
            continue;
        }

        match Dir::new(&absolute).list_files_recursive().await {
            Ok(found) => files.extend(found.iter().filter_map(|f| relative_path(&root, f))),
            Err(e) => warn!("Failed to list {}: {}", absolute.display(), e),
        }
    }

    debug!("Adding {} file(s) to upload", files.len());
    context.changeset_mut().upload.extend(files);
}

fn repo_dir(path: &Path) -> String {
    let dir = path.to_string_lossy();
    let trimmed = dir.trim_end_matches('/');
    if trimmed.is_empty() {
        dir.to_string()
    } else {
        trimmed.to_string()
    }
}

/// `/`-separated path of `path` below `root`, without `.` segments.
/// Paths with `..` segments are not resolved and yield `None`.
fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let mut parts = Vec::new();
    for component in path.strip_prefix(root).ok()?.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}
