//! revsync - Entry Point
//!
//! Deploys the files of a git branch that changed since the revision recorded
//! on the target server.

use std::env;
use std::process::ExitCode;

use anyhow::Context;
use tracing::{error, info};

use revsync::app::options::AppOptions;
use revsync::app::run::run;
use revsync::logs::init_logging;
use revsync::storage::settings::Settings;
use revsync::tasks::TaskFactory;
use revsync::utils::version_info;

#[tokio::main]
async fn main() -> ExitCode {
    let cli_args = AppOptions::parse_args(env::args().skip(1));
    let options = match AppOptions::from_cli_args(&cli_args) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    // Print version and exit
    if options.version {
        return print_json(&version_info());
    }

    let settings = match load_settings(&options).await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Unable to read settings file: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    if options.available_tasks {
        let factory = TaskFactory::new(settings.deployment_tasks.clone());
        return print_json(&factory.list_available_tasks());
    }

    // Keep the guard alive so buffered file logs are flushed on exit
    let _log_guard = match init_logging(&settings.log_options()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            None
        }
    };

    info!("Running revsync {}", version_info().version);
    match run(&settings, &options).await {
        Ok(report) => {
            if !report.success {
                return ExitCode::FAILURE;
            }
            match &report.changed_files {
                Some(files) => print_json(files),
                None => ExitCode::SUCCESS,
            }
        }
        Err(e) => {
            error!("Failed to run the deployment: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn load_settings(options: &AppOptions) -> anyhow::Result<Settings> {
    Settings::load(&options.settings_path)
        .await
        .with_context(|| format!("loading {}", options.settings_path.display()))
}

fn print_json<T: serde::Serialize>(value: &T) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Failed to serialize output: {e}");
            ExitCode::FAILURE
        }
    }
}
