//! Settings file management

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::DeployError;
use crate::filesys::file::File;
use crate::logs::{LogLevel, LogOptions};
use crate::tasks::{TaskManager, TaskRunner};

/// revsync settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Logging output
    #[serde(default)]
    pub logging: LogOptions,

    /// Directory holding the local working copies, one per repository
    #[serde(default = "default_repositories_path")]
    pub repositories_path: PathBuf,

    /// Task types deployments may use
    #[serde(default = "default_deployment_tasks")]
    pub deployment_tasks: Vec<String>,
}

fn default_repositories_path() -> PathBuf {
    PathBuf::from("/var/lib/revsync/repositories")
}

fn default_deployment_tasks() -> Vec<String> {
    vec![TaskManager::TYPE.to_string(), TaskRunner::TYPE.to_string()]
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            logging: LogOptions::default(),
            repositories_path: default_repositories_path(),
            deployment_tasks: default_deployment_tasks(),
        }
    }
}

impl Settings {
    /// Load settings from a JSON file; a missing file yields the defaults
    pub async fn load(path: &Path) -> Result<Self, DeployError> {
        let file = File::new(path);
        if !file.exists().await {
            debug!("Settings file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        file.read_json().await
    }

    /// Logging options with the top level `log_level` applied
    pub fn log_options(&self) -> LogOptions {
        LogOptions {
            log_level: self.log_level,
            ..self.logging.clone()
        }
    }

    /// Working copy directory of the repository called `name`
    pub fn repository_path(&self, name: &str) -> PathBuf {
        self.repositories_path.join(name)
    }
}
