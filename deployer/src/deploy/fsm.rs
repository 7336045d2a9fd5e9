//! Finite State Machine for a single deployment run

use serde::{Deserialize, Serialize};

use crate::errors::DeployError;

/// Run state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Nothing happened yet
    Idle,

    /// Git, repository and server are reachable
    PrerequisitesChecked,

    /// Working copy is on the deployment branch
    BranchSwitched,

    /// Working copy cloned or updated
    RepositoryPrepared,

    /// Local and remote revisions known
    RevisionsResolved,

    /// Changed files collected
    ChangesetComputed,

    /// Changed files split into uploads and deletions
    ChangesetSorted,

    /// Uploads and deletions attempted
    FilesProcessed,

    /// REVISION file on the server written
    RevisionMarkerUpdated,

    /// Run finished successfully
    Done,

    /// Run aborted
    Failed,
}

/// How a successful run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Files were transferred and the marker updated
    Deployed,

    /// Remote already at the local revision
    UpToDate,

    /// Changeset computed for preview only
    Listed,
}

/// Run event
#[derive(Debug, Clone)]
pub enum RunEvent {
    PrerequisitesChecked,
    BranchSwitched,
    RepositoryPrepared,
    RevisionsResolved,
    UpToDate,
    ChangesetComputed,
    Listed,
    ChangesetSorted,
    FilesProcessed,
    RevisionMarkerUpdated,
    Finish,
    Fail(String),
}

/// Run FSM. Steps only move forward; any failure is terminal.
#[derive(Debug, Clone)]
pub struct RunFsm {
    state: RunState,
    outcome: Option<RunOutcome>,
    error: Option<String>,
}

impl RunFsm {
    /// Create a new FSM in idle state
    pub fn new() -> Self {
        Self {
            state: RunState::Idle,
            outcome: None,
            error: None,
        }
    }

    /// Get current state
    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Get outcome once done
    pub fn outcome(&self) -> Option<RunOutcome> {
        self.outcome
    }

    /// Get error message if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Whether no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(self.state, RunState::Done | RunState::Failed)
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: RunEvent) -> Result<(), DeployError> {
        let new_state = match (&self.state, &event) {
            (RunState::Idle, RunEvent::PrerequisitesChecked) => RunState::PrerequisitesChecked,
            (RunState::PrerequisitesChecked, RunEvent::BranchSwitched) => RunState::BranchSwitched,
            (RunState::BranchSwitched, RunEvent::RepositoryPrepared) => RunState::RepositoryPrepared,
            (RunState::RepositoryPrepared, RunEvent::RevisionsResolved) => RunState::RevisionsResolved,

            (RunState::RevisionsResolved, RunEvent::UpToDate) => {
                self.outcome = Some(RunOutcome::UpToDate);
                RunState::Done
            }
            (RunState::RevisionsResolved, RunEvent::ChangesetComputed) => RunState::ChangesetComputed,

            (RunState::ChangesetComputed, RunEvent::Listed) => {
                self.outcome = Some(RunOutcome::Listed);
                RunState::Done
            }
            (RunState::ChangesetComputed, RunEvent::ChangesetSorted) => RunState::ChangesetSorted,
            (RunState::ChangesetSorted, RunEvent::FilesProcessed) => RunState::FilesProcessed,
            (RunState::FilesProcessed, RunEvent::RevisionMarkerUpdated) => {
                RunState::RevisionMarkerUpdated
            }
            (RunState::RevisionMarkerUpdated, RunEvent::Finish) => {
                self.outcome = Some(RunOutcome::Deployed);
                RunState::Done
            }

            (state, RunEvent::Fail(err)) if !matches!(state, RunState::Done | RunState::Failed) => {
                self.error = Some(err.clone());
                RunState::Failed
            }

            // Invalid transitions
            (state, event) => {
                return Err(DeployError::InvalidTransition(format!(
                    "{:?} -> {:?}",
                    state, event
                )));
            }
        };

        self.state = new_state;
        Ok(())
    }
}

impl Default for RunFsm {
    fn default() -> Self {
        Self::new()
    }
}
