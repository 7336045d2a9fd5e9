//! Deployment orchestrator
//!
//! Drives one run from the prerequisite checks to the revision marker update
//! and publishes the lifecycle events tasks hook into.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::deploy::classifier;
use crate::deploy::context::DeploymentContext;
use crate::deploy::fsm::{RunEvent, RunFsm, RunOutcome, RunState};
use crate::deploy::revision::{is_valid_revision, RemoteRevision};
use crate::errors::DeployError;
use crate::events::{self, EventBus};
use crate::models::changeset::{ChangedFile, Changeset};
use crate::tasks::{Task, TaskFactory, TaskRunner};

/// A failed step: what the user is told, and why
struct StepFailure {
    message: &'static str,
    cause: Option<DeployError>,
}

impl StepFailure {
    fn new(message: &'static str) -> Self {
        Self {
            message,
            cause: None,
        }
    }

    fn caused_by(message: &'static str, cause: DeployError) -> Self {
        Self {
            message,
            cause: Some(cause),
        }
    }
}

type StepResult<T> = Result<T, StepFailure>;

/// Runs deployments of one [`DeploymentContext`]
pub struct Deployer {
    context: DeploymentContext,
    events: EventBus<DeploymentContext>,
    tasks: Vec<Task>,
    rule_runner: Option<Arc<TaskRunner>>,
    fsm: RunFsm,
}

impl Deployer {
    /// Deployer without any tasks
    pub fn new(context: DeploymentContext) -> Self {
        Self {
            context,
            events: EventBus::new(),
            tasks: Vec::new(),
            rule_runner: None,
            fsm: RunFsm::new(),
        }
    }

    /// Deployer with one instance of every task registered in `factory`.
    /// Task types that can not be built are logged and skipped.
    pub fn with_tasks(context: DeploymentContext, factory: &TaskFactory) -> Self {
        let mut deployer = Self::new(context);
        for task in factory.make_all() {
            let installed = task.and_then(|task| deployer.install_task(task));
            if let Err(e) = installed {
                warn!("Skipping deployment task: {}", e);
            }
        }
        deployer
    }

    /// Subscribe a task to this deployer's lifecycle events
    pub fn install_task(&mut self, task: Task) -> Result<(), DeployError> {
        task.subscribe_to_events(&mut self.events)?;
        if let Some(runner) = task.rule_runner() {
            self.rule_runner = Some(runner);
        }
        debug!("Installed task {}", task.task_type());
        self.tasks.push(task);
        Ok(())
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Bus of this deployer, for additional listeners
    pub fn events_mut(&mut self) -> &mut EventBus<DeploymentContext> {
        &mut self.events
    }

    pub fn context(&self) -> &DeploymentContext {
        &self.context
    }

    /// Upload/delete lists of the last run
    pub fn changeset(&self) -> &Changeset {
        self.context.changeset()
    }

    pub fn changed_files(&self) -> &[ChangedFile] {
        self.context.changed_files()
    }

    pub fn state(&self) -> &RunState {
        self.fsm.state()
    }

    pub fn outcome(&self) -> Option<RunOutcome> {
        self.fsm.outcome()
    }

    /// Run the deployment. In list mode the changeset is computed and kept for
    /// [`Deployer::changeset`], but neither the server nor any task is touched.
    pub async fn deploy(&mut self, list_mode: bool) -> bool {
        let run_id = Uuid::new_v4();
        let span = info_span!(
            "deploy",
            %run_id,
            deployment = %self.context.deployment().id,
            list_mode
        );
        self.run(list_mode).instrument(span).await
    }

    async fn run(&mut self, list_mode: bool) -> bool {
        self.fsm = RunFsm::new();
        self.context.reset(list_mode);

        match self.run_steps().await {
            Ok(()) => {
                info!("Deployment finished: {:?}", self.fsm.outcome());
                true
            }
            Err(failure) => {
                match &failure.cause {
                    Some(cause) => error!("{}: {}", failure.message, cause),
                    None => error!("{}", failure.message),
                }
                self.context.responder().error(failure.message);
                // A run that already failed can always be marked as such
                let _ = self.fsm.process(RunEvent::Fail(failure.message.to_string()));
                false
            }
        }
    }

    async fn run_steps(&mut self) -> StepResult<()> {
        self.publish(events::ON_START).await?;

        self.log("Checking prerequisites...");
        self.check_prerequisites().await?;
        self.advance(RunEvent::PrerequisitesChecked)?;

        self.log("Switching branch...");
        let branch = self.context.deployment().branch.clone();
        self.context
            .repository_mut()
            .switch_branch(&branch)
            .await
            .map_err(|e| {
                StepFailure::caused_by(
                    "Could not switch to selected branch. Aborting job.",
                    e,
                )
            })?;
        self.advance(RunEvent::BranchSwitched)?;

        self.log("Preparing local repository...");
        self.prepare_repository().await?;
        self.advance(RunEvent::RepositoryPrepared)?;

        self.publish(events::ON_AFTER_LOCAL_REPO_PREPARED).await?;

        self.log("Estimating remote revision...");
        let remote_revision = self.remote_revision().await.ok_or_else(|| {
            StepFailure::new("Could not estimate remote revision. Aborting job.")
        })?;

        self.log("Estimating local revision...");
        let local_revision = self.local_revision().await?;
        self.advance(RunEvent::RevisionsResolved)?;

        if remote_revision.as_str() == local_revision {
            if !self.context.in_list_mode() {
                self.context
                    .responder()
                    .info("Remote server is already up to date.");
            }
            return self.advance(RunEvent::UpToDate);
        }

        self.log("Collecting changed files...");
        let mut files = self
            .changed_files_between(&local_revision, &remote_revision)
            .await?;
        if self.context.in_list_mode() {
            self.attach_diffs(&mut files, &local_revision, &remote_revision)
                .await;
        }
        self.context.set_changed_files(files);
        self.advance(RunEvent::ChangesetComputed)?;

        if self.context.in_list_mode() {
            return self.advance(RunEvent::Listed);
        }

        // The changeset is already partitioned by set_changed_files; rules
        // may still append uploads before the transfer starts.
        self.log("Sorting changed files...");
        if let Some(runner) = self.rule_runner.clone() {
            runner.run_tasks(&mut self.context).await;
        }
        self.advance(RunEvent::ChangesetSorted)?;

        self.log("Processing changed files...");
        self.process_changed_files().await;
        self.advance(RunEvent::FilesProcessed)?;

        self.log("Updating revision file...");
        let marker = self.context.revision_file_path();
        self.context
            .server()
            .put_content(&local_revision, &marker)
            .await
            .map_err(|e| {
                StepFailure::caused_by("Could not update remote revision file. Aborting job.", e)
            })?;
        self.advance(RunEvent::RevisionMarkerUpdated)?;

        self.publish(events::ON_AFTER_DEPLOYMENT_COMPLETED).await?;
        self.advance(RunEvent::Finish)
    }

    async fn check_prerequisites(&self) -> StepResult<()> {
        let responder = self.context.responder();
        let failed = StepFailure::new("Prerequisites check failed. Aborting job.");

        responder.log("Checking git binary...");
        if !self.context.repository().check_git().await {
            responder.danger("Git executable not found.");
            return Err(failed);
        }

        responder.log("Checking connection to repository...");
        if !self.context.repository().check_connectivity().await {
            responder.danger("Connection to repository failed.");
            return Err(failed);
        }

        responder.log("Checking connection to target server...");
        if !self.context.server().check_connectivity().await {
            responder.danger("Connection to remote server failed.");
            return Err(failed);
        }

        Ok(())
    }

    async fn prepare_repository(&self) -> StepResult<()> {
        let repository = self.context.repository();
        let responder = self.context.responder();
        let message = "Preparation of local repository failed. Aborting job.";

        if !repository.exists().await {
            return repository.clone_repository().await.map_err(|e| {
                responder.danger("Error while cloning repository.");
                StepFailure::caused_by(message, e)
            });
        }

        repository.pull().await.map_err(|e| {
            responder.danger("Error while updating repository.");
            StepFailure::caused_by(message, e)
        })?;

        if let Err(e) = repository.prune().await {
            warn!("git remote prune failed: {}", e);
            responder.info("Possible error during git remote prune.");
        }
        Ok(())
    }

    /// Revision recorded on the server, `None` if it can not be determined.
    ///
    /// Transport errors end up here as `None` rather than failing the run
    /// with the raw error.
    async fn remote_revision(&self) -> Option<RemoteRevision> {
        let server = self.context.server();
        let responder = self.context.responder();

        if !server.check_connectivity().await {
            return None;
        }

        let marker = match server
            .get_file_content(&self.context.revision_file_path())
            .await
        {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                debug!("No readable revision marker: {}", e);
                String::new()
            }
        };
        if is_valid_revision(&marker) {
            responder.info(&format!("Remote server is at revision: {}", marker));
            return Some(RemoteRevision::Revision(marker));
        }

        let remote_path = self.context.remote_path();
        let target_dir = match remote_path.trim_end_matches('/') {
            "" => "/",
            trimmed => trimmed,
        };
        match server.list_dir(target_dir).await {
            Ok(entries) if entries.is_empty() => {
                responder.info("Target path is empty. No revision yet.");
                Some(RemoteRevision::Initial)
            }
            Ok(entries) => {
                warn!(
                    "Target path {} holds {} entries but no valid revision",
                    target_dir,
                    entries.len()
                );
                None
            }
            Err(e) => {
                debug!("Listing {} failed: {}", target_dir, e);
                responder.danger("Target path on remote server not found or not accessible.");
                None
            }
        }
    }

    async fn local_revision(&self) -> StepResult<String> {
        let repository = self.context.repository();
        let responder = self.context.responder();
        let failed = "Could not estimate local revision. Aborting job.";

        if !repository.check_connectivity().await {
            responder.danger("Could not connect to remote repository.");
            return Err(StepFailure::new(failed));
        }

        match repository
            .remote_revision(&self.context.deployment().branch)
            .await
        {
            Ok(revision) => {
                let revision = revision.trim().to_string();
                responder.info(&format!("Local repository is at revision: {}", revision));
                Ok(revision)
            }
            Err(e) => {
                responder.danger("Local revision not found.");
                Err(StepFailure::caused_by(failed, e))
            }
        }
    }

    async fn changed_files_between(
        &self,
        local_revision: &str,
        remote_revision: &RemoteRevision,
    ) -> StepResult<Vec<ChangedFile>> {
        let repository = self.context.repository();
        let failed = |e| StepFailure::caused_by("Could not estimate changed files.", e);

        let files = match remote_revision {
            RemoteRevision::Initial => {
                let listing = repository.list_files().await.map_err(failed)?;
                classifier::from_listing(listing.as_slice())
            }
            RemoteRevision::Revision(remote) => repository
                .diff(local_revision, remote)
                .await
                .map_err(failed)?,
        };

        if files.is_empty() {
            debug!("No changed files between {} and {}", remote_revision, local_revision);
        }
        Ok(files)
    }

    /// Fill the per-file patch shown in the list preview. A file whose patch
    /// can not be produced is listed without one.
    async fn attach_diffs(
        &self,
        files: &mut [ChangedFile],
        local_revision: &str,
        remote_revision: &RemoteRevision,
    ) {
        let remote = match remote_revision {
            RemoteRevision::Revision(remote) => Some(remote.as_str()),
            RemoteRevision::Initial => None,
        };
        for file in files.iter_mut() {
            match self
                .context
                .repository()
                .diff_file(local_revision, remote, &file.path)
                .await
            {
                Ok(patch) => file.diff = Some(patch),
                Err(e) => warn!("No diff for {}: {}", file.path, e),
            }
        }
    }

    /// Upload and delete everything in the changeset.
    ///
    /// Failures of single files are reported and the remaining files are still
    /// processed; the run outcome does not change. Only the marker write that
    /// follows can fail the run. This asymmetry is inherited behaviour.
    async fn process_changed_files(&self) {
        let changeset = self.context.changeset();
        let server = self.context.server();
        let responder = self.context.responder();
        let repo_path = self.context.repository().local_path();
        let remote_path = self.context.remote_path();

        if changeset.is_empty() {
            responder.info("Nothing to upload or delete.");
            return;
        }
        responder.info(&format!(
            "Files to upload: {} - Files to delete: {} - processing...",
            changeset.upload.len(),
            changeset.delete.len()
        ));

        for file in &changeset.upload {
            let started = Instant::now();
            let result = server
                .upload(&repo_path.join(file), &format!("{}{}", remote_path, file))
                .await;
            match result {
                Ok(()) => responder.info(&format!(
                    "Uploading {}: success ({:.2}s)",
                    file,
                    started.elapsed().as_secs_f64()
                )),
                Err(e) => {
                    warn!("Upload of {} failed: {}", file, e);
                    responder.danger(&format!("Uploading {}: failed", file));
                }
            }
        }

        if !changeset.delete.is_empty() {
            responder.log("Removing files...");
            for file in &changeset.delete {
                match server.delete(&format!("{}{}", remote_path, file)).await {
                    Ok(()) => responder.info(&format!("Deleting {}: success", file)),
                    Err(e) => {
                        warn!("Delete of {} failed: {}", file, e);
                        responder.danger(&format!("Deleting {}: failed", file));
                    }
                }
            }
        }

        responder.info("Processing files completed.");
    }

    async fn publish(&mut self, event: &str) -> StepResult<()> {
        debug!("Publishing {}", event);
        self.events
            .publish(event, &mut self.context)
            .await
            .map_err(|e| StepFailure::caused_by("Deployment task failed. Aborting job.", e))
    }

    fn advance(&mut self, event: RunEvent) -> StepResult<()> {
        self.fsm
            .process(event)
            .map_err(|e| StepFailure::caused_by("Invalid deployment state. Aborting job.", e))
    }

    fn log(&self, message: &str) {
        self.context.responder().log(message);
    }
}
