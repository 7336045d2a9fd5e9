//! Human readable progress stream of a run

use std::sync::Mutex;

use tracing::{debug, error, info, warn};

use crate::models::deployment::{DeploymentLog, LogKind};

/// Sink for progress messages of a deployment run
pub trait Responder: Send + Sync {
    /// Plain progress message
    fn log(&self, message: &str);

    /// Notable result
    fn info(&self, message: &str);

    /// Something went wrong, the run may continue
    fn danger(&self, message: &str);

    /// The run is aborted
    fn error(&self, message: &str);
}

/// Forwards messages to `tracing`
#[derive(Debug, Clone, Default)]
pub struct TracingResponder {
    deployment: String,
}

impl TracingResponder {
    pub fn new(deployment: impl Into<String>) -> Self {
        Self {
            deployment: deployment.into(),
        }
    }
}

impl Responder for TracingResponder {
    fn log(&self, message: &str) {
        debug!(deployment = %self.deployment, "{}", message);
    }

    fn info(&self, message: &str) {
        info!(deployment = %self.deployment, "{}", message);
    }

    fn danger(&self, message: &str) {
        warn!(deployment = %self.deployment, "{}", message);
    }

    fn error(&self, message: &str) {
        error!(deployment = %self.deployment, "{}", message);
    }
}

/// Buffers messages so callers can present them after the run
#[derive(Debug, Default)]
pub struct MemoryResponder {
    entries: Mutex<Vec<DeploymentLog>>,
}

impl MemoryResponder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything logged so far
    pub fn entries(&self) -> Vec<DeploymentLog> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// Messages of one level, in order
    pub fn messages(&self, level: LogKind) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|e| e.level == level)
            .map(|e| e.message)
            .collect()
    }

    /// Whether any message contains `needle`
    pub fn contains(&self, needle: &str) -> bool {
        self.entries().iter().any(|e| e.message.contains(needle))
    }

    fn push(&self, level: LogKind, message: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(DeploymentLog {
                level,
                message: message.to_string(),
                timestamp: chrono::Utc::now(),
            });
        }
    }
}

impl Responder for MemoryResponder {
    fn log(&self, message: &str) {
        self.push(LogKind::Log, message);
    }

    fn info(&self, message: &str) {
        self.push(LogKind::Info, message);
    }

    fn danger(&self, message: &str) {
        self.push(LogKind::Danger, message);
    }

    fn error(&self, message: &str) {
        self.push(LogKind::Error, message);
    }
}
