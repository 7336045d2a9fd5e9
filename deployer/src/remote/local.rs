//! Target directory on the local machine

use std::path::Path;

use async_trait::async_trait;
use tracing::debug;

use crate::errors::DeployError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::remote::Server;

/// Deploys into a directory of the machine revsync runs on.
///
/// Useful for shared mounts and staging checkouts. Commands can not be
/// executed, so `before`/`after` tasks are skipped for this server type.
#[derive(Debug, Clone)]
pub struct LocalServer {
    root_path: String,
}

impl LocalServer {
    pub fn new(root_path: impl Into<String>) -> Self {
        Self {
            root_path: root_path.into(),
        }
    }
}

#[async_trait]
impl Server for LocalServer {
    fn server_type(&self) -> &str {
        "local"
    }

    fn root_path(&self) -> &str {
        &self.root_path
    }

    async fn check_connectivity(&self) -> bool {
        Dir::new(&self.root_path).exists().await
    }

    async fn get_file_content(&self, path: &str) -> Result<String, DeployError> {
        let file = File::new(path);
        if !file.exists().await {
            return Err(DeployError::NotFound(path.to_string()));
        }
        file.read_string().await
    }

    async fn list_dir(&self, path: &str) -> Result<Vec<String>, DeployError> {
        let dir = Dir::new(path);
        if !dir.exists().await {
            return Err(DeployError::NotFound(path.to_string()));
        }
        dir.list_entries().await
    }

    async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<(), DeployError> {
        let bytes = File::new(remote_path).copy_from(local_path).await?;
        debug!("Copied {} bytes to {}", bytes, remote_path);
        Ok(())
    }

    async fn delete(&self, remote_path: &str) -> Result<(), DeployError> {
        File::new(remote_path).delete().await
    }

    async fn put_content(&self, content: &str, remote_path: &str) -> Result<(), DeployError> {
        File::new(remote_path).write_atomic(content.as_bytes()).await
    }

    async fn execute_command(&self, _command: &str) -> Result<String, DeployError> {
        Err(DeployError::CommandError(
            "Local targets can not execute commands".to_string(),
        ))
    }
}
