use crate::error::CommitError;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// What the working tree holds relative to HEAD, as repo-relative paths.
/// Supplied by the change inspector and only ever read by the core.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSummary {
    pub staged_paths: BTreeSet<PathBuf>,
    pub unstaged_paths: BTreeSet<PathBuf>,
    /// Shown by `status`; never consulted when filtering prompts.
    pub untracked_paths: BTreeSet<PathBuf>,
}

impl ChangeSummary {
    /// Staged and unstaged paths together.
    pub fn changed_paths(&self) -> impl Iterator<Item = &Path> {
        self.staged_paths
            .iter()
            .chain(&self.unstaged_paths)
            .map(PathBuf::as_path)
    }

    /// A commit needs something staged.
    pub fn ensure_staged(&self) -> Result<(), CommitError> {
        if self.staged_paths.is_empty() {
            Err(CommitError::NoStagedChanges)
        } else {
            Ok(())
        }
    }
}
