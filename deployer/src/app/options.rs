//! Command line options

use std::collections::HashMap;
use std::path::PathBuf;

use crate::errors::DeployError;
use crate::models::deployment::TaskSelection;

/// Default location of the settings file
pub const DEFAULT_SETTINGS_PATH: &str = "/etc/revsync/settings.json";

/// Main application options
#[derive(Debug, Clone, PartialEq)]
pub struct AppOptions {
    /// Settings file
    pub settings_path: PathBuf,

    /// Deployment file to run
    pub deployment_path: Option<PathBuf>,

    /// Only print the changed files
    pub list_mode: bool,

    /// Explicit task selection (`--tasks=id1,id2`)
    pub tasks_to_run: Option<TaskSelection>,

    /// Print the task types that can be used and exit
    pub available_tasks: bool,

    /// Print version information and exit
    pub version: bool,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            settings_path: PathBuf::from(DEFAULT_SETTINGS_PATH),
            deployment_path: None,
            list_mode: false,
            tasks_to_run: None,
            available_tasks: false,
            version: false,
        }
    }
}

impl AppOptions {
    /// Collect `--key=value` and `--flag` arguments
    pub fn parse_args<I, S>(args: I) -> HashMap<String, String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut cli_args = HashMap::new();
        for arg in args {
            let arg = arg.as_ref();
            if let Some((key, value)) = arg.split_once('=') {
                cli_args.insert(key.trim_start_matches('-').to_string(), value.to_string());
            } else if arg.starts_with("--") {
                cli_args.insert(arg.trim_start_matches('-').to_string(), "true".to_string());
            }
        }
        cli_args
    }

    /// Build options from parsed arguments
    pub fn from_cli_args(cli_args: &HashMap<String, String>) -> Result<Self, DeployError> {
        let mut options = Self::default();

        if let Some(path) = cli_args.get("settings") {
            options.settings_path = PathBuf::from(path);
        }
        options.deployment_path = cli_args.get("deployment").map(PathBuf::from);
        options.list_mode = flag(cli_args, "list")?;
        options.available_tasks = flag(cli_args, "available-tasks")?;
        options.version = flag(cli_args, "version")?;

        if let Some(tasks) = cli_args.get("tasks") {
            let selection: TaskSelection = tasks
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(|id| (id.to_string(), true))
                .collect();
            options.tasks_to_run = Some(selection);
        }

        Ok(options)
    }
}

fn flag(cli_args: &HashMap<String, String>, name: &str) -> Result<bool, DeployError> {
    match cli_args.get(name).map(String::as_str) {
        None | Some("false") => Ok(false),
        Some("true") => Ok(true),
        Some(other) => Err(DeployError::InvalidArgument(format!(
            "--{} expects true or false, got {}",
            name, other
        ))),
    }
}
