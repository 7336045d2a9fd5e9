//! Running a deployment file

use std::path::Path;
use std::sync::Arc;

use tracing::{error, info};

use crate::app::options::AppOptions;
use crate::deploy::context::DeploymentContext;
use crate::deploy::git::GitRepository;
use crate::deploy::orchestrator::Deployer;
use crate::deploy::responder::{Responder, TracingResponder};
use crate::errors::DeployError;
use crate::filesys::file::File;
use crate::models::changeset::ChangedFile;
use crate::models::deployment::DeploymentFile;
use crate::storage::settings::Settings;
use crate::tasks::TaskFactory;

/// Result of one invocation
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub success: bool,

    /// Changed files with their status and patch, only in list mode
    pub changed_files: Option<Vec<ChangedFile>>,
}

/// Load a deployment file
pub async fn load_deployment(path: &Path) -> Result<DeploymentFile, DeployError> {
    let file = File::new(path);
    if !file.exists().await {
        return Err(DeployError::NotFound(path.display().to_string()));
    }
    file.read_json().await
}

/// Run the deployment described by `options`
pub async fn run(settings: &Settings, options: &AppOptions) -> Result<RunReport, DeployError> {
    let path = options
        .deployment_path
        .as_deref()
        .ok_or_else(|| DeployError::InvalidArgument("--deployment is required".to_string()))?;
    let DeploymentFile {
        mut deployment,
        repository,
        server,
    } = load_deployment(path).await?;

    if let Some(selection) = &options.tasks_to_run {
        deployment.set_tasks_to_run(selection.clone());
    }

    info!(
        "Deploying {} ({}) to {} server",
        deployment.id, deployment.branch, server
    );

    let responder: Arc<dyn Responder> = Arc::new(TracingResponder::new(deployment.id.clone()));
    let repository = GitRepository::new(
        repository.url,
        settings.repository_path(&repository.name),
    );
    let context = DeploymentContext::new(
        deployment,
        Box::new(repository),
        server.connect(),
        responder,
    );

    let factory = TaskFactory::new(settings.deployment_tasks.clone());
    let mut deployer = Deployer::with_tasks(context, &factory);
    let success = deployer.deploy(options.list_mode).await;
    if !success {
        error!("Deployment failed");
    }

    Ok(RunReport {
        success,
        changed_files: options.list_mode.then(|| deployer.changed_files().to_vec()),
    })
}
