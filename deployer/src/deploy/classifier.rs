//! Classification of raw VCS output into changesets

use crate::models::changeset::{ChangedFile, Changeset, FileStatus};

/// How raw VCS output should be read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// `git diff --name-status` output, one status-prefixed entry per line
    Diff,
    /// Plain file listing; the target has no revision yet
    Listing,
}

/// Parse raw output into changed files.
///
/// Lines are trimmed and blank lines skipped. In diff mode, lines whose
/// status code is not known are dropped.
pub fn parse(raw: &str, kind: SourceKind) -> Vec<ChangedFile> {
    lines(raw)
        .filter_map(|line| match kind {
            SourceKind::Listing => Some(ChangedFile::new(line, FileStatus::Added)),
            SourceKind::Diff => parse_diff_line(line),
        })
        .collect()
}

/// Every path of a full listing as an added file
pub fn from_listing<S: AsRef<str>>(paths: &[S]) -> Vec<ChangedFile> {
    paths
        .iter()
        .map(|p| p.as_ref().trim())
        .filter(|p| !p.is_empty())
        .map(|p| ChangedFile::new(p, FileStatus::Added))
        .collect()
}

/// Parse and partition raw output in one go
pub fn classify(raw: &str, kind: SourceKind) -> Changeset {
    Changeset::from_files(&parse(raw, kind))
}

fn lines(raw: &str) -> impl Iterator<Item = &str> {
    raw.lines().map(str::trim).filter(|line| !line.is_empty())
}

fn parse_diff_line(line: &str) -> Option<ChangedFile> {
    let code = line.chars().next()?;
    let status = FileStatus::from_code(code)?;
    let path = line[code.len_utf8()..].trim();
    if path.is_empty() {
        return None;
    }
    Some(ChangedFile::new(path, status))
}
