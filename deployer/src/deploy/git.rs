//! Git working copy backed by the git command line

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::deploy::classifier::{self, SourceKind};
use crate::deploy::repository::Repository;
use crate::errors::DeployError;
use crate::models::changeset::ChangedFile;

/// Object id of the empty tree, the base of every file when nothing is deployed yet
const EMPTY_TREE: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";

/// A git clone of `url` living at `local_path`
#[derive(Debug, Clone)]
pub struct GitRepository {
    url: String,
    local_path: PathBuf,
    branch: Option<String>,
}

impl GitRepository {
    pub fn new(url: impl Into<String>, local_path: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            local_path: local_path.into(),
            branch: None,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Run git inside the working copy and return its stdout.
    ///
    /// Paths are printed verbatim, without quoting or octal escapes.
    async fn git(&self, args: &[&str]) -> Result<String, DeployError> {
        debug!("git {} (in {})", args.join(" "), self.local_path.display());
        let output = Command::new("git")
            .current_dir(&self.local_path)
            .args(["-c", "core.quotePath=false"])
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| DeployError::GitError(format!("Failed to run git {}: {}", args[0], e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DeployError::GitError(format!(
                "git {} failed: {}",
                args[0],
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Local branch name for a configured branch like `origin/master`
fn local_branch(branch: &str) -> &str {
    branch.strip_prefix("origin/").unwrap_or(branch)
}

#[async_trait]
impl Repository for GitRepository {
    fn local_path(&self) -> &Path {
        &self.local_path
    }

    async fn exists(&self) -> bool {
        tokio::fs::metadata(self.local_path.join(".git")).await.is_ok()
    }

    async fn check_git(&self) -> bool {
        Command::new("git")
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    async fn check_connectivity(&self) -> bool {
        Command::new("git")
            .args(["ls-remote", "--heads", self.url.as_str()])
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    async fn clone_repository(&self) -> Result<(), DeployError> {
        if let Some(parent) = self.local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        info!("Cloning {} to {}", self.url, self.local_path.display());
        let target = self.local_path.to_string_lossy().into_owned();
        let mut args = vec!["clone"];
        if let Some(branch) = &self.branch {
            args.extend(["-b", local_branch(branch)]);
        }
        args.extend([self.url.as_str(), target.as_str()]);

        let status = Command::new("git")
            .args(&args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .status()
            .await
            .map_err(|e| DeployError::GitError(format!("Failed to run git clone: {}", e)))?;

        if !status.success() {
            return Err(DeployError::GitError("Git clone failed".to_string()));
        }
        Ok(())
    }

    async fn pull(&self) -> Result<(), DeployError> {
        match &self.branch {
            Some(branch) => self.git(&["pull", "origin", local_branch(branch)]).await?,
            None => self.git(&["pull"]).await?,
        };
        Ok(())
    }

    async fn prune(&self) -> Result<(), DeployError> {
        self.git(&["remote", "prune", "origin"]).await?;
        Ok(())
    }

    async fn switch_branch(&mut self, branch: &str) -> Result<(), DeployError> {
        self.branch = Some(branch.to_string());
        // a missing working copy is cloned with `-b` later on
        if !self.exists().await {
            return Ok(());
        }
        self.git(&["checkout", local_branch(branch)]).await?;
        Ok(())
    }

    async fn remote_revision(&self, branch: &str) -> Result<String, DeployError> {
        let revision = self
            .git(&["rev-parse", "--verify", local_branch(branch)])
            .await?;
        Ok(revision.trim().to_string())
    }

    async fn list_files(&self) -> Result<Vec<String>, DeployError> {
        let listing = self.git(&["ls-files"]).await?;
        Ok(listing
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }

    async fn diff(
        &self,
        local_revision: &str,
        remote_revision: &str,
    ) -> Result<Vec<ChangedFile>, DeployError> {
        // renames are reported as delete + add so every line carries one path
        let raw = self
            .git(&[
                "diff",
                "--name-status",
                "--no-renames",
                remote_revision,
                local_revision,
            ])
            .await?;
        Ok(classifier::parse(&raw, SourceKind::Diff))
    }

    async fn diff_file(
        &self,
        local_revision: &str,
        remote_revision: Option<&str>,
        path: &str,
    ) -> Result<String, DeployError> {
        let base = remote_revision.unwrap_or(EMPTY_TREE);
        self.git(&["diff", base, local_revision, "--", path]).await
    }
}
