//! Deployment module

pub mod classifier;
pub mod context;
pub mod fsm;
pub mod git;
pub mod orchestrator;
pub mod repository;
pub mod responder;
pub mod revision;

pub use context::DeploymentContext;
pub use orchestrator::Deployer;
