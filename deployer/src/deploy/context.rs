//! State owned by a single deployment run

use std::sync::Arc;

use crate::deploy::repository::Repository;
use crate::deploy::responder::Responder;
use crate::models::changeset::{ChangedFile, Changeset};
use crate::models::deployment::Deployment;
use crate::remote::Server;

/// Name of the marker file holding the deployed revision
pub const REVISION_FILE: &str = "REVISION";

/// Everything a run works on. It is also the payload of every lifecycle event,
/// so task hooks see the same repository, server and changeset as the
/// orchestrator.
pub struct DeploymentContext {
    deployment: Deployment,
    repository: Box<dyn Repository>,
    server: Box<dyn Server>,
    responder: Arc<dyn Responder>,
    changed_files: Vec<ChangedFile>,
    changeset: Changeset,
}

impl DeploymentContext {
    pub fn new(
        deployment: Deployment,
        repository: Box<dyn Repository>,
        server: Box<dyn Server>,
        responder: Arc<dyn Responder>,
    ) -> Self {
        Self {
            deployment,
            repository,
            server,
            responder,
            changed_files: Vec::new(),
            changeset: Changeset::default(),
        }
    }

    pub fn deployment(&self) -> &Deployment {
        &self.deployment
    }

    pub fn deployment_mut(&mut self) -> &mut Deployment {
        &mut self.deployment
    }

    pub fn repository(&self) -> &dyn Repository {
        self.repository.as_ref()
    }

    pub fn repository_mut(&mut self) -> &mut dyn Repository {
        self.repository.as_mut()
    }

    pub fn server(&self) -> &dyn Server {
        self.server.as_ref()
    }

    pub fn responder(&self) -> &dyn Responder {
        self.responder.as_ref()
    }

    pub fn in_list_mode(&self) -> bool {
        self.deployment.list_mode
    }

    /// Changed files as computed from the VCS, before any task ran
    pub fn changed_files(&self) -> &[ChangedFile] {
        &self.changed_files
    }

    pub fn changeset(&self) -> &Changeset {
        &self.changeset
    }

    pub fn changeset_mut(&mut self) -> &mut Changeset {
        &mut self.changeset
    }

    pub(crate) fn set_changed_files(&mut self, files: Vec<ChangedFile>) {
        self.changeset = Changeset::from_files(&files);
        self.changed_files = files;
    }

    pub(crate) fn reset(&mut self, list_mode: bool) {
        self.deployment.list_mode = list_mode;
        self.changed_files.clear();
        self.changeset = Changeset::default();
    }

    /// Deployment directory on the server, always ending with `/`
    pub fn remote_path(&self) -> String {
        remote_path(self.server.root_path(), &self.deployment.target_path)
    }

    /// Location of the REVISION marker on the server
    pub fn revision_file_path(&self) -> String {
        format!("{}{}", self.remote_path(), REVISION_FILE)
    }
}

/// Join a server root and a deployment target path into `root/target/`
pub fn remote_path(root: &str, target_path: &str) -> String {
    let root = root.trim_end_matches('/');
    let target = target_path.trim().trim_matches('/');
    format!("{}/{}/", root, target).replace("//", "/")
}
