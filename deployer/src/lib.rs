//! revsync library
//!
//! Reconciles a remote directory with a revision of a git repository: the
//! files changed since the revision recorded on the server are uploaded or
//! deleted, and configured tasks run around the transfer.

pub mod app;
pub mod deploy;
pub mod errors;
pub mod events;
pub mod filesys;
pub mod logs;
pub mod models;
pub mod remote;
pub mod storage;
pub mod tasks;
pub mod utils;
