//! Source repository abstraction

use std::path::Path;

use async_trait::async_trait;

use crate::errors::DeployError;
use crate::models::changeset::ChangedFile;

/// Capabilities the orchestrator needs from the source repository.
///
/// One instance belongs to exactly one run.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Local working copy directory
    fn local_path(&self) -> &Path;

    /// Whether the working copy has been cloned
    async fn exists(&self) -> bool;

    /// Whether the VCS tooling is available
    async fn check_git(&self) -> bool;

    /// Whether the origin can be reached
    async fn check_connectivity(&self) -> bool;

    /// Clone the origin into [`Repository::local_path`]
    async fn clone_repository(&self) -> Result<(), DeployError>;

    /// Fetch and merge the current branch
    async fn pull(&self) -> Result<(), DeployError>;

    /// Drop stale remote-tracking refs
    async fn prune(&self) -> Result<(), DeployError>;

    /// Check out `branch`
    async fn switch_branch(&mut self, branch: &str) -> Result<(), DeployError>;

    /// Tip revision of `branch` in the working copy
    async fn remote_revision(&self, branch: &str) -> Result<String, DeployError>;

    /// Every tracked file of the working copy
    async fn list_files(&self) -> Result<Vec<String>, DeployError>;

    /// Files changed from `remote_revision` to `local_revision`
    async fn diff(
        &self,
        local_revision: &str,
        remote_revision: &str,
    ) -> Result<Vec<ChangedFile>, DeployError>;

    /// Patch of a single file from `remote_revision` to `local_revision`.
    /// Without a remote revision the whole file shows as added.
    async fn diff_file(
        &self,
        local_revision: &str,
        remote_revision: Option<&str>,
        path: &str,
    ) -> Result<String, DeployError>;
}
