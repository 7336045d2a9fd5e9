//! Rule task tests

use std::fs;

use revsync::deploy::orchestrator::Deployer;
use revsync::events::{self, Listener};
use revsync::models::changeset::{ChangedFile, Changeset, FileStatus};
use revsync::models::deployment::LogKind;
use revsync::tasks::rule::{Consequent, TaskRule};
use revsync::tasks::runner::handle_task_consequents;
use revsync::tasks::{TaskFactory, TaskRunner, TYPE_RULES};

use crate::support::*;

fn repository_in(dir: &tempfile::TempDir, calls: &Calls) -> FakeRepository {
    let mut repository = FakeRepository::new(calls.clone());
    repository.local_path = dir.path().to_path_buf();
    repository
}

fn build_tree(dir: &tempfile::TempDir) {
    let root = dir.path();
    fs::create_dir_all(root.join("dist/js/vendor")).unwrap();
    fs::create_dir_all(root.join("dist/empty")).unwrap();
    fs::write(root.join("dist/app.css"), "body {}").unwrap();
    fs::write(root.join("dist/js/app.js"), "").unwrap();
    fs::write(root.join("dist/js/vendor/lib.js"), "").unwrap();
    fs::write(root.join("robots.txt"), "").unwrap();
}

#[test]
fn test_changelist_match_on_css() {
    let rule = TaskRule::parse("if:\n  changelist_match: '.*\\.css$'\nthen:\n  exec: [make]\n").unwrap();

    let css = Changeset {
        upload: vec!["a.css".into(), "b.js".into()],
        delete: vec![],
    };
    let js = Changeset {
        upload: vec!["b.js".into()],
        delete: vec![],
    };
    assert!(rule.conditions_match(&css));
    assert!(!rule.conditions_match(&js));
}

#[tokio::test]
async fn test_upload_directory_adds_files_recursively() {
    let dir = tempfile::tempdir().unwrap();
    build_tree(&dir);
    let calls = Calls::default();
    let (mut context, _) = context(deployment(), repository_in(&dir, &calls), FakeServer::new(calls));
    context.changeset_mut().upload.push("index.php".into());

    let consequents = vec![Consequent::Upload(vec![
        "dist/".into(),
        "robots.txt".into(),
        "missing.txt".into(),
    ])];
    handle_task_consequents(&consequents, &mut context).await;

    assert_eq!(
        context.changeset().upload,
        vec![
            "index.php".to_string(),
            "dist/app.css".to_string(),
            "dist/js/app.js".to_string(),
            "dist/js/vendor/lib.js".to_string(),
            "robots.txt".to_string(),
        ]
    );
    assert!(context.changeset().delete.is_empty());
}

#[tokio::test]
async fn test_upload_resolves_parent_segments_inside_repository() {
    let outer = tempfile::tempdir().unwrap();
    fs::write(outer.path().join("secret.txt"), "").unwrap();
    let repo = outer.path().join("repo");
    fs::create_dir_all(repo.join("dist")).unwrap();
    fs::write(repo.join("dist/app.css"), "").unwrap();
    fs::write(repo.join("robots.txt"), "").unwrap();

    let calls = Calls::default();
    let mut repository = FakeRepository::new(calls.clone());
    repository.local_path = repo;
    let (mut context, _) = context(deployment(), repository, FakeServer::new(calls));

    let consequents = vec![Consequent::Upload(vec![
        "dist/../robots.txt".into(),
        "../secret.txt".into(),
        "dist/../../repo/dist/".into(),
    ])];
    handle_task_consequents(&consequents, &mut context).await;

    assert_eq!(
        context.changeset().upload,
        vec!["robots.txt".to_string(), "dist/app.css".to_string()]
    );
}

#[tokio::test]
async fn test_exec_substitutes_repo_dir_and_continues_after_failure() {
    let dir = tempfile::tempdir().unwrap();
    let calls = Calls::default();
    let (mut context, responder) =
        context(deployment(), repository_in(&dir, &calls), FakeServer::new(calls));

    let consequents = vec![
        Consequent::Exec(vec![
            "exit 3".into(),
            "echo built > {$repo_dir}/build.txt".into(),
        ]),
        Consequent::Unknown("notify".into()),
        Consequent::Upload(vec!["build.txt".into()]),
    ];
    handle_task_consequents(&consequents, &mut context).await;

    assert_eq!(fs::read_to_string(dir.path().join("build.txt")).unwrap(), "built\n");
    assert_eq!(context.changeset().upload, vec!["build.txt".to_string()]);
    assert_eq!(responder.messages(LogKind::Danger), vec!["Task command failed: exit 3".to_string()]);
}

#[tokio::test]
async fn test_runner_selects_rule_tasks_on_start() {
    let calls = Calls::default();
    let mut deployment = deployment();
    deployment.tasks = vec![
        task("1", "before", "ls", ""),
        task("2", TYPE_RULES, "", "if: {}\nthen: {}\n"),
    ];
    let (mut context, _) = context(deployment, FakeRepository::new(calls.clone()), FakeServer::new(calls));

    let runner = TaskRunner::new();
    runner.on_event(events::ON_START, &mut context).await.unwrap();
    let selected = runner.selected().await;
    assert_eq!(selected.len(), 1);
    assert_eq!(selected[0].id, "2");
}

#[tokio::test]
async fn test_rules_run_between_sort_and_transfer() {
    let dir = tempfile::tempdir().unwrap();
    build_tree(&dir);
    let calls = Calls::default();
    let mut repository = repository_in(&dir, &calls);
    repository.diff = vec![
        ChangedFile::new("src/app.scss", FileStatus::Modified),
        ChangedFile::new("old.php", FileStatus::Deleted),
    ];

    let mut deployment = deployment();
    deployment.tasks = vec![
        task(
            "css",
            TYPE_RULES,
            "",
            "if:\n  changelist_match: '\\.scss$'\nthen:\n  upload:\n    - dist/js/\n",
        ),
        task(
            "php",
            TYPE_RULES,
            "",
            "if:\n  changelist_match: '\\.php$'\nthen:\n  upload: [robots.txt]\n",
        ),
        task("never", TYPE_RULES, "", "if:\n  changelist_match: '\\.rs$'\nthen:\n  upload: [dist/]\n"),
        task("broken", TYPE_RULES, "", "then:\n  upload: [dist/]\n"),
    ];
    let (context, responder) = context(deployment, repository, FakeServer::new(calls.clone()));

    let mut deployer = Deployer::with_tasks(context, &TaskFactory::default());
    assert!(deployer.deploy(false).await);

    assert_eq!(
        deployer.changeset().upload,
        vec![
            "src/app.scss".to_string(),
            "dist/js/app.js".to_string(),
            "dist/js/vendor/lib.js".to_string(),
            "robots.txt".to_string(),
        ]
    );
    assert_eq!(calls.count("upload:"), 4);
    assert!(calls.contains(&format!(
        "upload:{}:/var/www/site/dist/js/vendor/lib.js",
        dir.path().join("dist/js/vendor/lib.js").display()
    )));
    assert!(responder.contains("Executing task: Task css"));
    assert!(responder
        .messages(LogKind::Danger)
        .contains(&"Skipping task. Invalid configuration.".to_string()));
}

#[tokio::test]
async fn test_rules_do_not_run_in_list_mode() {
    let dir = tempfile::tempdir().unwrap();
    build_tree(&dir);
    let calls = Calls::default();
    let mut repository = repository_in(&dir, &calls);
    repository.diff = vec![ChangedFile::new("a.css", FileStatus::Added)];

    let mut deployment = deployment();
    deployment.tasks = vec![task(
        "always",
        TYPE_RULES,
        "",
        "if: {}\nthen:\n  exec: ['touch {$repo_dir}/touched']\n  upload: [dist/]\n",
    )];
    let (context, _) = context(deployment, repository, FakeServer::new(calls));

    let mut deployer = Deployer::with_tasks(context, &TaskFactory::default());
    assert!(deployer.deploy(true).await);
    assert_eq!(deployer.changeset().upload, vec!["a.css".to_string()]);
    assert!(!dir.path().join("touched").exists());
}
