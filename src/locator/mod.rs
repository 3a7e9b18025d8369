use crate::error::CommitError;
use anyhow::{Context, Result};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

const TRANSCRIPT_EXTENSION: &str = "jsonl";

/// Sub-agent transcripts live next to the session they belong to.
const SUBAGENT_PREFIX: &str = "agent-";

/// A transcript file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptHandle {
    pub path: PathBuf,
    pub project_path: PathBuf,
    pub modified: SystemTime,
    pub size: u64,
}

impl TranscriptHandle {
    /// File name without the extension. The host names transcripts after
    /// the session they record.
    pub fn stem(&self) -> &str {
        self.path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
    }
}

/// Encode an absolute project path the way the host names its per-project
/// transcript directories: every character that is not an ASCII letter or
/// digit becomes `-`.
pub fn encode_project_path(path: &Path) -> String {
    let normalized: PathBuf = path.components().collect();
    normalized
        .to_string_lossy()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect()
}

/// Finds session transcripts under the host's `projects` directory.
pub struct TranscriptLocator {
    projects_dir: PathBuf,
}

impl TranscriptLocator {
    pub fn new(projects_dir: impl Into<PathBuf>) -> Self {
        Self {
            projects_dir: projects_dir.into(),
        }
    }

    /// Resolve the projects directory: an explicit override, then
    /// `$CLAUDE_CONFIG_DIR/projects`, then `~/.claude/projects`.
    pub fn from_env(override_dir: Option<&Path>) -> Result<Self> {
        if let Some(dir) = override_dir {
            return Ok(Self::new(dir));
        }
        if let Some(config_dir) = env::var_os("CLAUDE_CONFIG_DIR").filter(|v| !v.is_empty()) {
            return Ok(Self::new(PathBuf::from(config_dir).join("projects")));
        }
        let home = dirs::home_dir().context("cannot determine home directory")?;
        Ok(Self::new(home.join(".claude").join("projects")))
    }

    pub fn projects_dir(&self) -> &Path {
        &self.projects_dir
    }

    pub fn project_dir(&self, project_root: &Path) -> PathBuf {
        self.projects_dir.join(encode_project_path(project_root))
    }

    /// The project's transcript directory, trying the path as given first
    /// and its canonical form second (symlinked checkouts).
    fn existing_project_dir(&self, project_root: &Path) -> Option<PathBuf> {
        let raw = self.project_dir(project_root);
        if raw.is_dir() {
            return Some(raw);
        }
        let canonical = fs::canonicalize(project_root).ok()?;
        let dir = self.project_dir(&canonical);
        dir.is_dir().then_some(dir)
    }

    /// All session transcripts for the project, newest first. Ties on
    /// modification time are broken by file name so the order is stable.
    pub fn list(&self, project_root: &Path) -> Result<Vec<TranscriptHandle>, CommitError> {
        let not_found = || CommitError::NotFound {
            dir: self.project_dir(project_root),
        };
        let dir = self.existing_project_dir(project_root).ok_or_else(not_found)?;
        let entries = fs::read_dir(&dir).map_err(|e| {
            debug!(dir = %dir.display(), "cannot list transcripts: {e}");
            not_found()
        })?;

        let mut handles: Vec<TranscriptHandle> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| is_session_transcript(path))
            .filter_map(|path| {
                let meta = fs::metadata(&path).ok()?;
                Some(TranscriptHandle {
                    modified: meta.modified().ok()?,
                    size: meta.len(),
                    project_path: project_root.to_path_buf(),
                    path,
                })
            })
            .collect();

        if handles.is_empty() {
            return Err(not_found());
        }
        handles.sort_by(|a, b| {
            b.modified
                .cmp(&a.modified)
                .then_with(|| b.path.file_name().cmp(&a.path.file_name()))
        });
        Ok(handles)
    }

    /// The active session: the most recently modified transcript.
    pub fn locate(&self, project_root: &Path) -> Result<TranscriptHandle, CommitError> {
        let handle = self
            .list(project_root)?
            .into_iter()
            .next()
            .ok_or_else(|| CommitError::NotFound {
                dir: self.project_dir(project_root),
            })?;
        debug!(transcript = %handle.path.display(), "active session transcript");
        Ok(handle)
    }

    /// Find the transcript recording `session_id`: in the project's own
    /// directory first, then in any project directory.
    pub fn find_session(&self, session_id: &str, project_root: &Path) -> Option<PathBuf> {
        let file_name = format!("{session_id}.{TRANSCRIPT_EXTENSION}");
        if let Some(dir) = self.existing_project_dir(project_root) {
            let candidate = dir.join(&file_name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        fs::read_dir(&self.projects_dir)
            .ok()?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path().join(&file_name))
            .find(|candidate| candidate.is_file())
    }
}

fn is_session_transcript(path: &Path) -> bool {
    path.is_file()
        && path.extension().and_then(|e| e.to_str()) == Some(TRANSCRIPT_EXTENSION)
        && !path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(SUBAGENT_PREFIX))
}
