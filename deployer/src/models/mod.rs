//! Data models

pub mod changeset;
pub mod deployment;
