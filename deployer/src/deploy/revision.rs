//! Revision identifiers

use std::fmt;

/// Length of a full git object id
pub const REVISION_LENGTH: usize = 40;

/// What the REVISION marker on the server says
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteRevision {
    /// A valid revision identifier
    Revision(String),

    /// The target directory is empty, nothing was deployed yet
    Initial,
}

impl RemoteRevision {
    /// Value used for [`RemoteRevision::Initial`] wherever a string is needed
    pub const INITIAL_SENTINEL: &'static str = "-1";

    pub fn as_str(&self) -> &str {
        match self {
            RemoteRevision::Revision(revision) => revision,
            RemoteRevision::Initial => Self::INITIAL_SENTINEL,
        }
    }

    pub fn is_initial(&self) -> bool {
        matches!(self, RemoteRevision::Initial)
    }
}

impl fmt::Display for RemoteRevision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exactly 40 lowercase hex characters. Not checked against any history.
pub fn is_valid_revision(candidate: &str) -> bool {
    candidate.len() == REVISION_LENGTH
        && candidate
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}
