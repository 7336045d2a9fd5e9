//! Lifecycle events
//!
//! The orchestrator publishes a small set of named milestones. Tasks subscribe
//! to them through the [`EventBus`] without the orchestrator knowing about them.

pub mod bus;

pub use bus::{EventBus, Listener};

/// Published before any step of a run
pub const ON_START: &str = "deployment.onStart";

/// Published once the local working copy is cloned or updated
pub const ON_AFTER_LOCAL_REPO_PREPARED: &str = "deployment.onAfterLocalRepoPrepared";

/// Published after the remote revision marker was written
pub const ON_AFTER_DEPLOYMENT_COMPLETED: &str = "deployment.onAfterDeploymentCompleted";
