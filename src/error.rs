use std::path::PathBuf;

use thiserror::Error;

/// Failures of the message pipeline. None of these are transient: the same
/// inputs always produce the same error, so nothing here is retried.
#[derive(Debug, Error)]
pub enum CommitError {
    #[error("no AI session detected (no transcripts under {})", .dir.display())]
    NotFound { dir: PathBuf },
    #[error("malformed transcript {}: {reason}", .path.display())]
    MalformedTranscript { path: PathBuf, reason: String },
    #[error("commit summary must not be empty")]
    EmptySummary,
    #[error("no staged changes to commit")]
    NoStagedChanges,
}
