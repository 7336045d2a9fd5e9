//! Deployment orchestrator tests

use std::sync::Arc;

use async_trait::async_trait;

use revsync::deploy::context::DeploymentContext;
use revsync::deploy::fsm::{RunOutcome, RunState};
use revsync::deploy::orchestrator::Deployer;
use revsync::errors::DeployError;
use revsync::events::{self, Listener};
use revsync::models::changeset::{ChangedFile, Changeset, FileStatus};
use revsync::models::deployment::LogKind;
use revsync::tasks::{TaskFactory, TYPE_AFTER, TYPE_BEFORE};

use crate::support::*;

/// Records every event it receives; optionally fails on one of them
struct EventRecorder {
    calls: Calls,
    fail_on: Option<&'static str>,
}

#[async_trait]
impl Listener<DeploymentContext> for EventRecorder {
    async fn on_event(&self, event: &str, _context: &mut DeploymentContext) -> Result<(), DeployError> {
        self.calls.push(format!("event:{}", event));
        if self.fail_on == Some(event) {
            return Err(DeployError::TaskError(format!("{} listener failed", event)));
        }
        Ok(())
    }
}

fn record_events(deployer: &mut Deployer, calls: &Calls, fail_on: Option<&'static str>) {
    let recorder: Arc<dyn Listener<DeploymentContext>> = Arc::new(EventRecorder {
        calls: calls.clone(),
        fail_on,
    });
    for event in [
        events::ON_START,
        events::ON_AFTER_LOCAL_REPO_PREPARED,
        events::ON_AFTER_DEPLOYMENT_COMPLETED,
    ] {
        deployer.events_mut().subscribe(event, recorder.clone()).unwrap();
    }
}

fn diff() -> Vec<ChangedFile> {
    vec![
        ChangedFile::new("index.php", FileStatus::Modified),
        ChangedFile::new("css/old.css", FileStatus::Deleted),
        ChangedFile::new("css/new.css", FileStatus::Added),
        ChangedFile::new("weird.bin", FileStatus::Copied),
    ]
}

fn with_tasks(deployment: &mut revsync::models::deployment::Deployment) {
    deployment.tasks = vec![
        task("1", TYPE_BEFORE, "php artisan down", ""),
        task("2", TYPE_AFTER, "php artisan up", ""),
    ];
}

#[tokio::test]
async fn test_deploy_diff() {
    let calls = Calls::default();
    let mut repository = FakeRepository::new(calls.clone());
    repository.diff = diff();
    let (context, responder) = context(deployment(), repository, FakeServer::new(calls.clone()));

    let mut deployer = Deployer::with_tasks(context, &TaskFactory::default());
    assert!(deployer.deploy(false).await);
    assert_eq!(deployer.state(), &RunState::Done);
    assert_eq!(deployer.outcome(), Some(RunOutcome::Deployed));

    let remote = remote_revision();
    assert!(calls.contains(&format!("diff:{}:{}", LOCAL_REVISION, remote)));
    assert!(calls.contains(&format!("get_file_content:{}", MARKER_PATH)));
    assert!(!calls.contains("list_dir"));

    assert_eq!(
        deployer.changeset(),
        &Changeset {
            upload: vec!["index.php".into(), "css/new.css".into(), "weird.bin".into()],
            delete: vec!["css/old.css".into()],
        }
    );
    assert!(calls.contains("upload:/srv/repositories/site/index.php:/var/www/site/index.php"));
    assert!(calls.contains("upload:/srv/repositories/site/css/new.css:/var/www/site/css/new.css"));
    assert!(calls.contains("delete:/var/www/site/css/old.css"));
    assert_eq!(
        calls.all().last().unwrap(),
        &format!("put_content:{}:{}", LOCAL_REVISION, MARKER_PATH)
    );

    assert!(responder.contains("Remote server is at revision: deadbeef"));
    assert!(responder.contains("Files to upload: 3 - Files to delete: 1"));
    assert!(responder.messages(LogKind::Error).is_empty());
}

#[tokio::test]
async fn test_list_mode_never_touches_server() {
    let calls = Calls::default();
    let mut repository = FakeRepository::new(calls.clone());
    repository.diff = diff();
    let mut deployment = deployment();
    with_tasks(&mut deployment);
    let (context, _responder) = context(deployment, repository, FakeServer::new(calls.clone()));

    let mut deployer = Deployer::with_tasks(context, &TaskFactory::default());
    assert!(deployer.deploy(true).await);
    assert_eq!(deployer.outcome(), Some(RunOutcome::Listed));

    assert_eq!(deployer.changeset().upload.len(), 3);
    assert_eq!(deployer.changeset().delete, vec!["css/old.css".to_string()]);
    let remote = remote_revision();
    let expected: Vec<ChangedFile> = diff()
        .into_iter()
        .map(|mut f| {
            f.diff = Some(patch(LOCAL_REVISION, Some(&remote), &f.path));
            f
        })
        .collect();
    assert_eq!(deployer.changed_files(), expected.as_slice());

    for mutation in ["upload", "delete", "put_content", "execute_command"] {
        assert!(!calls.contains(mutation), "{} called in list mode", mutation);
    }
}

#[tokio::test]
async fn test_up_to_date_runs_only_before_tasks() {
    let calls = Calls::default();
    let mut server = FakeServer::new(calls.clone());
    server.marker = Some(format!("{}\n", LOCAL_REVISION));
    let mut deployment = deployment();
    with_tasks(&mut deployment);
    let (context, responder) = context(deployment, FakeRepository::new(calls.clone()), server);

    let mut deployer = Deployer::with_tasks(context, &TaskFactory::default());
    assert!(deployer.deploy(false).await);
    assert_eq!(deployer.outcome(), Some(RunOutcome::UpToDate));
    assert_eq!(deployer.changeset(), &Changeset::default());

    assert!(calls.contains("execute_command:cd /var/www/site/ && php artisan down"));
    assert!(!calls.contains("execute_command:cd /var/www/site/ && php artisan up"));
    assert!(!calls.contains("diff"));
    assert!(!calls.contains("upload"));
    assert!(!calls.contains("put_content"));
    assert!(responder.contains("Remote server is already up to date."));
}

#[tokio::test]
async fn test_empty_target_deploys_full_listing() {
    let calls = Calls::default();
    let mut repository = FakeRepository::new(calls.clone());
    repository.files = vec!["index.php".into(), "css/app.css".into(), "".into()];
    let mut server = FakeServer::new(calls.clone());
    server.marker = None;
    server.entries = Some(Vec::new());
    let (context, responder) = context(deployment(), repository, server);

    let mut deployer = Deployer::new(context);
    assert!(deployer.deploy(false).await);

    assert!(calls.contains("list_dir:/var/www/site"));
    assert!(calls.contains("list_files"));
    assert!(!calls.contains("diff"));
    assert_eq!(
        deployer.changeset(),
        &Changeset {
            upload: vec!["index.php".into(), "css/app.css".into()],
            delete: vec![],
        }
    );
    assert!(deployer
        .changed_files()
        .iter()
        .all(|f| f.status == FileStatus::Added));
    assert!(responder.contains("Target path is empty. No revision yet."));
}

#[tokio::test]
async fn test_invalid_marker_on_populated_target_fails() {
    let calls = Calls::default();
    let mut server = FakeServer::new(calls.clone());
    server.marker = Some("not a revision".to_string());
    let (context, responder) = context(deployment(), FakeRepository::new(calls.clone()), server);

    let mut deployer = Deployer::new(context);
    assert!(!deployer.deploy(false).await);
    assert_eq!(deployer.state(), &RunState::Failed);
    assert_eq!(
        responder.messages(LogKind::Error),
        vec!["Could not estimate remote revision. Aborting job.".to_string()]
    );
    assert!(!calls.contains("remote_revision"));
}

#[tokio::test]
async fn test_unlistable_target_fails() {
    let calls = Calls::default();
    let mut server = FakeServer::new(calls.clone());
    server.marker = None;
    server.entries = None;
    let (context, responder) = context(deployment(), FakeRepository::new(calls.clone()), server);

    let mut deployer = Deployer::new(context);
    assert!(!deployer.deploy(false).await);
    assert!(responder.contains("Target path on remote server not found or not accessible."));
}

#[tokio::test]
async fn test_failed_upload_does_not_abort() {
    let calls = Calls::default();
    let mut repository = FakeRepository::new(calls.clone());
    repository.diff = diff();
    let mut server = FakeServer::new(calls.clone());
    server.failing_uploads = vec!["/var/www/site/index.php".to_string()];
    let (context, responder) = context(deployment(), repository, server);

    let mut deployer = Deployer::new(context);
    assert!(deployer.deploy(false).await);

    assert_eq!(calls.count("upload:"), 3);
    assert!(calls.contains("delete:/var/www/site/css/old.css"));
    assert!(calls.contains("put_content"));
    assert!(responder
        .messages(LogKind::Danger)
        .contains(&"Uploading index.php: failed".to_string()));
    assert!(responder
        .messages(LogKind::Info)
        .iter()
        .any(|m| m.starts_with("Uploading css/new.css: success (")));
}

#[tokio::test]
async fn test_marker_write_failure_fails_run() {
    let calls = Calls::default();
    let mut repository = FakeRepository::new(calls.clone());
    repository.diff = diff();
    let mut server = FakeServer::new(calls.clone());
    server.fail_put = true;
    let mut deployment = deployment();
    with_tasks(&mut deployment);
    let (context, responder) = context(deployment, repository, server);

    let mut deployer = Deployer::with_tasks(context, &TaskFactory::default());
    record_events(&mut deployer, &calls, None);
    assert!(!deployer.deploy(false).await);

    assert_eq!(deployer.state(), &RunState::Failed);
    assert!(calls.contains("upload"));
    assert!(!calls.contains(&format!("event:{}", events::ON_AFTER_DEPLOYMENT_COMPLETED)));
    assert!(!calls.contains("execute_command:cd /var/www/site/ && php artisan up"));
    assert!(responder.contains("Could not update remote revision file. Aborting job."));
}

#[tokio::test]
async fn test_lifecycle_events() {
    let calls = Calls::default();
    let mut repository = FakeRepository::new(calls.clone());
    repository.diff = diff();
    let (context, _) = context(deployment(), repository, FakeServer::new(calls.clone()));

    let mut deployer = Deployer::new(context);
    record_events(&mut deployer, &calls, None);
    assert!(deployer.deploy(false).await);

    let published: Vec<String> = calls
        .all()
        .into_iter()
        .filter(|c| c.starts_with("event:"))
        .collect();
    assert_eq!(
        published,
        vec![
            format!("event:{}", events::ON_START),
            format!("event:{}", events::ON_AFTER_LOCAL_REPO_PREPARED),
            format!("event:{}", events::ON_AFTER_DEPLOYMENT_COMPLETED),
        ]
    );

    // Prepared fires after the repository update and before the marker is read
    let all = calls.all();
    let position = |prefix: &str| all.iter().position(|c| c.starts_with(prefix)).unwrap();
    assert!(position("pull") < position("event:deployment.onAfterLocalRepoPrepared"));
    assert!(position("event:deployment.onAfterLocalRepoPrepared") < position("get_file_content"));
    assert!(position("put_content") < position("event:deployment.onAfterDeploymentCompleted"));
}

#[tokio::test]
async fn test_list_mode_attaches_patches_to_initial_listing() {
    let calls = Calls::default();
    let mut repository = FakeRepository::new(calls.clone());
    repository.files = vec!["index.php".into(), "logo.png".into()];
    repository.failing_patches = vec!["logo.png".into()];
    let mut server = FakeServer::new(calls.clone());
    server.marker = None;
    server.entries = Some(Vec::new());
    let (context, _) = context(deployment(), repository, server);

    let mut deployer = Deployer::new(context);
    assert!(deployer.deploy(true).await);

    let files = deployer.changed_files();
    assert_eq!(files.len(), 2);
    assert_eq!(
        files[0].diff.as_deref(),
        Some(patch(LOCAL_REVISION, None, "index.php").as_str())
    );
    assert_eq!(files[1].path, "logo.png");
    assert_eq!(files[1].diff, None);
}

#[tokio::test]
async fn test_patches_are_only_built_in_list_mode() {
    let calls = Calls::default();
    let mut repository = FakeRepository::new(calls.clone());
    repository.diff = diff();
    let (context, _) = context(deployment(), repository, FakeServer::new(calls.clone()));

    let mut deployer = Deployer::new(context);
    assert!(deployer.deploy(false).await);
    assert!(!calls.contains("patch:"));
    assert!(deployer.changed_files().iter().all(|f| f.diff.is_none()));
}

#[tokio::test]
async fn test_no_completed_event_in_list_mode() {
    let calls = Calls::default();
    let mut repository = FakeRepository::new(calls.clone());
    repository.diff = diff();
    let (context, _) = context(deployment(), repository, FakeServer::new(calls.clone()));

    let mut deployer = Deployer::new(context);
    record_events(&mut deployer, &calls, None);
    assert!(deployer.deploy(true).await);
    assert_eq!(calls.count("event:"), 2);
    assert!(!calls.contains(&format!("event:{}", events::ON_AFTER_DEPLOYMENT_COMPLETED)));
}

#[tokio::test]
async fn test_listener_failure_aborts_run() {
    let calls = Calls::default();
    let (context, responder) = context(
        deployment(),
        FakeRepository::new(calls.clone()),
        FakeServer::new(calls.clone()),
    );

    let mut deployer = Deployer::new(context);
    record_events(&mut deployer, &calls, Some(events::ON_AFTER_LOCAL_REPO_PREPARED));
    assert!(!deployer.deploy(false).await);
    assert!(!calls.contains("get_file_content"));
    assert!(responder.contains("Aborting job."));
}

#[tokio::test]
async fn test_missing_git_fails_prerequisites() {
    let calls = Calls::default();
    let mut repository = FakeRepository::new(calls.clone());
    repository.git_available = false;
    let (context, responder) = context(deployment(), repository, FakeServer::new(calls.clone()));

    let mut deployer = Deployer::new(context);
    assert!(!deployer.deploy(false).await);
    assert_eq!(deployer.state(), &RunState::Failed);
    assert!(!calls.contains("switch_branch"));
    assert_eq!(responder.messages(LogKind::Danger), vec!["Git executable not found.".to_string()]);
    assert_eq!(
        responder.messages(LogKind::Error),
        vec!["Prerequisites check failed. Aborting job.".to_string()]
    );
}

#[tokio::test]
async fn test_unreachable_server_fails_prerequisites() {
    let calls = Calls::default();
    let mut server = FakeServer::new(calls.clone());
    server.reachable = false;
    let (context, responder) = context(deployment(), FakeRepository::new(calls.clone()), server);

    let mut deployer = Deployer::new(context);
    assert!(!deployer.deploy(false).await);
    assert!(responder.contains("Connection to remote server failed."));
}

#[tokio::test]
async fn test_repository_preparation() {
    // Missing working copy is cloned
    let calls = Calls::default();
    let mut repository = FakeRepository::new(calls.clone());
    repository.exists = false;
    repository.diff = diff();
    let (ctx, _) = context(deployment(), repository, FakeServer::new(calls.clone()));
    assert!(Deployer::new(ctx).deploy(false).await);
    assert!(calls.contains("clone"));
    assert!(!calls.contains("pull"));
    assert!(calls.contains("switch_branch:master"));

    // Prune failures are not fatal
    let calls = Calls::default();
    let mut repository = FakeRepository::new(calls.clone());
    repository.fail_prune = true;
    repository.diff = diff();
    let (ctx, responder) = context(deployment(), repository, FakeServer::new(calls.clone()));
    assert!(Deployer::new(ctx).deploy(false).await);
    assert!(responder
        .messages(LogKind::Info)
        .contains(&"Possible error during git remote prune.".to_string()));

    // Pull failures are
    let calls = Calls::default();
    let mut repository = FakeRepository::new(calls.clone());
    repository.fail_pull = true;
    let (ctx, responder) = context(deployment(), repository, FakeServer::new(calls.clone()));
    assert!(!Deployer::new(ctx).deploy(false).await);
    assert!(!calls.contains("prune"));
    assert!(responder.contains("Preparation of local repository failed. Aborting job."));
}

#[tokio::test]
async fn test_empty_diff_is_not_an_error() {
    let calls = Calls::default();
    let (context, responder) = context(
        deployment(),
        FakeRepository::new(calls.clone()),
        FakeServer::new(calls.clone()),
    );

    let mut deployer = Deployer::new(context);
    assert!(deployer.deploy(false).await);
    assert!(deployer.changeset().is_empty());
    assert!(responder.contains("Nothing to upload or delete."));
    assert!(calls.contains("put_content"));
}

#[tokio::test]
async fn test_commands_need_ssh_server() {
    let calls = Calls::default();
    let mut server = FakeServer::new(calls.clone());
    server.server_type = "local".to_string();
    let mut repository = FakeRepository::new(calls.clone());
    repository.diff = diff();
    let mut deployment = deployment();
    with_tasks(&mut deployment);
    let (context, responder) = context(deployment, repository, server);

    let mut deployer = Deployer::with_tasks(context, &TaskFactory::default());
    assert!(deployer.deploy(false).await);
    assert!(!calls.contains("execute_command"));
    assert_eq!(
        responder.messages(LogKind::Error),
        vec![
            "Server not of type SSH. Skipping tasks.".to_string(),
            "Server not of type SSH. Skipping tasks.".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_failing_command_does_not_stop_tasks() {
    let calls = Calls::default();
    let mut server = FakeServer::new(calls.clone());
    server.fail_commands = true;
    let mut repository = FakeRepository::new(calls.clone());
    repository.diff = diff();
    let mut deployment = deployment();
    deployment.tasks = vec![
        task("1", TYPE_BEFORE, "false", ""),
        task("2", TYPE_BEFORE, "php artisan cache:clear", ""),
    ];
    let (context, responder) = context(deployment, repository, server);

    let mut deployer = Deployer::with_tasks(context, &TaskFactory::default());
    assert!(deployer.deploy(false).await);
    assert_eq!(calls.count("execute_command:"), 2);
    assert_eq!(responder.messages(LogKind::Danger), vec!["Task failed.".to_string(); 2]);
}

#[tokio::test]
async fn test_task_selection_overrides_defaults() {
    let calls = Calls::default();
    let mut server = FakeServer::new(calls.clone());
    server.marker = Some(LOCAL_REVISION.to_string());
    let mut deployment = deployment();
    deployment.tasks = vec![
        task("1", TYPE_BEFORE, "echo one", ""),
        task("2", TYPE_BEFORE, "echo two", ""),
    ];
    deployment.tasks[1].run_by_default = false;
    deployment.set_tasks_to_run([("2".to_string(), true)].into_iter().collect());
    let (context, _) = context(deployment, FakeRepository::new(calls.clone()), server);

    let mut deployer = Deployer::with_tasks(context, &TaskFactory::default());
    assert!(deployer.deploy(false).await);
    assert!(!calls.contains("execute_command:cd /var/www/site/ && echo one"));
    assert!(calls.contains("execute_command:cd /var/www/site/ && echo two"));
}

#[tokio::test]
async fn test_unregistered_tasks_are_not_installed() {
    let calls = Calls::default();
    let mut server = FakeServer::new(calls.clone());
    server.marker = Some(LOCAL_REVISION.to_string());
    let mut deployment = deployment();
    with_tasks(&mut deployment);
    let (context, _) = context(deployment, FakeRepository::new(calls.clone()), server);

    let factory = TaskFactory::new(vec!["task_runner".into(), "ftp_upload".into()]);
    let mut deployer = Deployer::with_tasks(context, &factory);
    assert_eq!(deployer.tasks().len(), 1);
    assert!(deployer.deploy(false).await);
    assert!(!calls.contains("execute_command"));
}

#[tokio::test]
async fn test_deployer_can_run_twice() {
    let calls = Calls::default();
    let mut repository = FakeRepository::new(calls.clone());
    repository.diff = diff();
    let (context, _) = context(deployment(), repository, FakeServer::new(calls.clone()));

    let mut deployer = Deployer::new(context);
    assert!(deployer.deploy(true).await);
    assert_eq!(deployer.outcome(), Some(RunOutcome::Listed));
    assert!(deployer.deploy(false).await);
    assert_eq!(deployer.outcome(), Some(RunOutcome::Deployed));
    assert_eq!(calls.count("upload:"), 3);
}
