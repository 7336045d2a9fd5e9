//! Deployment targets

pub mod local;
pub mod ssh;

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::DeployError;

pub use local::LocalServer;
pub use ssh::SshServer;

/// Capabilities the orchestrator needs from a target server.
///
/// All paths are absolute paths on the target. Transport failures are
/// reported as [`DeployError::ConnectionError`].
#[async_trait]
pub trait Server: Send + Sync {
    /// `ssh` for servers able to run commands
    fn server_type(&self) -> &str;

    /// Directory all deployments of this server live under
    fn root_path(&self) -> &str;

    async fn check_connectivity(&self) -> bool;

    async fn get_file_content(&self, path: &str) -> Result<String, DeployError>;

    /// Names of the entries in `path`
    async fn list_dir(&self, path: &str) -> Result<Vec<String>, DeployError>;

    /// Copy a local file to `remote_path`, creating parent directories
    async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<(), DeployError>;

    async fn delete(&self, remote_path: &str) -> Result<(), DeployError>;

    /// Write `content` to `remote_path`, replacing it
    async fn put_content(&self, content: &str, remote_path: &str) -> Result<(), DeployError>;

    /// Run a shell command on the server and return its output
    async fn execute_command(&self, command: &str) -> Result<String, DeployError>;
}

/// Target server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerConfig {
    /// Remote host reached through the OpenSSH client
    Ssh {
        hostname: String,
        #[serde(default)]
        username: Option<String>,
        #[serde(default = "default_ssh_port")]
        port: u16,
        #[serde(default = "default_root_path")]
        root_path: String,
    },

    /// Directory on this machine
    Local { root_path: String },
}

fn default_ssh_port() -> u16 {
    22
}

fn default_root_path() -> String {
    "/".to_string()
}

impl ServerConfig {
    /// Create the server handle for one run
    pub fn connect(&self) -> Box<dyn Server> {
        match self {
            ServerConfig::Ssh {
                hostname,
                username,
                port,
                root_path,
            } => Box::new(SshServer::new(
                hostname.clone(),
                username.clone(),
                *port,
                root_path.clone(),
            )),
            ServerConfig::Local { root_path } => Box::new(LocalServer::new(root_path.clone())),
        }
    }
}

impl fmt::Display for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerConfig::Ssh {
                hostname,
                username,
                port,
                ..
            } => match username {
                Some(user) => write!(f, "ssh://{}@{}:{}", user, hostname, port),
                None => write!(f, "ssh://{}:{}", hostname, port),
            },
            ServerConfig::Local { root_path } => write!(f, "local:{}", root_path),
        }
    }
}
