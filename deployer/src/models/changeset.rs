//! Changeset models

use serde::{Deserialize, Serialize};

/// Status of a file between two revisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileStatus {
    Added,
    Modified,
    Deleted,
    Renamed,
    Copied,
}

impl FileStatus {
    /// Map a git status letter; anything unknown is `None`
    pub fn from_code(code: char) -> Option<Self> {
        match code {
            'A' => Some(FileStatus::Added),
            'M' => Some(FileStatus::Modified),
            'D' => Some(FileStatus::Deleted),
            'R' => Some(FileStatus::Renamed),
            'C' => Some(FileStatus::Copied),
            _ => None,
        }
    }

    pub fn code(&self) -> char {
        match self {
            FileStatus::Added => 'A',
            FileStatus::Modified => 'M',
            FileStatus::Deleted => 'D',
            FileStatus::Renamed => 'R',
            FileStatus::Copied => 'C',
        }
    }

    /// Whether the file has to be transferred to the target
    pub fn is_upload(&self) -> bool {
        !self.is_delete()
    }

    /// Whether the file has to be removed from the target
    pub fn is_delete(&self) -> bool {
        matches!(self, FileStatus::Deleted)
    }
}

/// A file that differs between the deployed and the local revision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedFile {
    pub path: String,
    pub status: FileStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
}

impl ChangedFile {
    pub fn new(path: impl Into<String>, status: FileStatus) -> Self {
        Self {
            path: path.into(),
            status,
            diff: None,
        }
    }
}

/// Paths to upload to and delete from the target
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Changeset {
    pub upload: Vec<String>,
    pub delete: Vec<String>,
}

impl Changeset {
    /// Partition changed files by the operation they require, keeping source order
    pub fn from_files(files: &[ChangedFile]) -> Self {
        let mut changeset = Changeset::default();
        for file in files {
            if file.status.is_delete() {
                changeset.delete.push(file.path.clone());
            } else {
                changeset.upload.push(file.path.clone());
            }
        }
        changeset
    }

    pub fn is_empty(&self) -> bool {
        self.upload.is_empty() && self.delete.is_empty()
    }

    /// All paths, uploads first
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.upload
            .iter()
            .chain(self.delete.iter())
            .map(String::as_str)
    }
}
