use crate::git::FileStat;
use crate::prompts::PromptFilter;
use crate::transcript::{Role, SideEffectKind, Transcript, Turn};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// How long before a commit a prompt may have been sent and still be taken
/// as its cause when no transcript reported the commit id.
pub const MATCH_WINDOW_SECS: i64 = 300;

/// `git commit` reports `[<branch> <abbreviated id>] <summary>`, with
/// `(root-commit)` before the id on a repository's first commit.
static COMMIT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[[\w\-/.]+ (?:\(root-commit\) )?([0-9a-f]{7,40})\]")
        .expect("commit line pattern is valid")
});

/// Commit ids reported by `git commit` in a tool's output.
pub fn reported_commit_ids(output: &str) -> impl Iterator<Item = &str> {
    COMMIT_LINE
        .captures_iter(output)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
}

fn push_unique<T: PartialEq>(items: &mut Vec<T>, item: T) {
    if !items.contains(&item) {
        items.push(item);
    }
}

/// `path` relative to `root`. Relative paths are taken as already relative;
/// absolute paths outside `root` have no relative form.
fn relative_to(path: &Path, root: &Path) -> Option<PathBuf> {
    if path.is_absolute() {
        path.strip_prefix(root).ok().map(Path::to_path_buf)
    } else {
        Some(path.to_path_buf())
    }
}

// ===================================================================
// Exchanges: a prompt and everything the agent did in answer
// ===================================================================

/// A human prompt together with what happened before the next one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Exchange {
    pub timestamp: Option<DateTime<Utc>>,
    pub prompt: String,
    /// Files the agent edited or wrote, as the transcript names them.
    pub edited: Vec<PathBuf>,
    pub replies: Vec<String>,
    /// Commit ids `git commit` reported while answering.
    pub commit_ids: Vec<String>,
}

/// An exchange as shown against one commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlamePrompt {
    pub timestamp: Option<DateTime<Utc>>,
    pub text: String,
    /// Edited files the commit changed, with the commit's line counts.
    pub files: Vec<FileStat>,
    /// Empty unless replies were asked for.
    pub replies: Vec<String>,
}

impl Exchange {
    fn opened_by(turn: Turn) -> Self {
        Self {
            timestamp: turn.timestamp,
            prompt: turn.text,
            ..Self::default()
        }
    }

    fn absorb(&mut self, turn: &Turn) {
        for effect in &turn.side_effects {
            if !matches!(effect.kind, SideEffectKind::Edit | SideEffectKind::Write) {
                continue;
            }
            if let Some(path) = &effect.path {
                push_unique(&mut self.edited, path.clone());
            }
        }
        if turn.role == Role::Agent && !turn.text.is_empty() {
            self.replies.push(turn.text.clone());
        }
    }

    /// Sent in `(after, until]`. Commit times have second precision, so the
    /// prompt time is compared at that precision. Unstamped prompts fall in
    /// no window.
    pub fn within(&self, after: Option<DateTime<Utc>>, until: DateTime<Utc>) -> bool {
        self.timestamp.is_some_and(|ts| {
            let secs = ts.timestamp();
            after.is_none_or(|a| secs > a.timestamp()) && secs <= until.timestamp()
        })
    }

    pub fn for_commit(&self, root: &Path, stats: &[FileStat], replies: bool) -> BlamePrompt {
        let mut files = Vec::new();
        for rel in self.edited.iter().filter_map(|p| relative_to(p, root)) {
            if let Some(stat) = stats.iter().find(|s| s.path == rel) {
                push_unique(&mut files, stat.clone());
            }
        }
        BlamePrompt {
            timestamp: self.timestamp,
            text: self.prompt.clone(),
            files,
            replies: if replies {
                self.replies.clone()
            } else {
                Vec::new()
            },
        }
    }
}

/// Split a transcript into exchanges, one per human prompt. Trigger phrases
/// open none: what follows them, usually the `git commit` itself, belongs
/// to the request before. Records ahead of the first prompt are dropped.
pub fn exchanges(transcript: &Transcript, filter: &PromptFilter) -> Vec<Exchange> {
    let mut out: Vec<Exchange> = Vec::new();
    for record in transcript.records() {
        if let Some(turn) = record.turn() {
            let role = turn.role;
            match role {
                Role::Human if filter.is_trigger(&turn.text) => {}
                Role::Human => out.push(Exchange::opened_by(turn)),
                Role::Agent | Role::Tool => {
                    if let Some(current) = out.last_mut() {
                        current.absorb(&turn);
                    }
                }
            }
        }
        if let Some(current) = out.last_mut() {
            for output in record.tool_output() {
                for id in reported_commit_ids(output) {
                    push_unique(&mut current.commit_ids, id.to_string());
                }
            }
        }
    }
    out
}

// ===================================================================
// SessionIndex: tying commits without trailers to their prompt
// ===================================================================

/// How a commit was tied to a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMethod {
    /// A transcript reported the commit's id.
    Hash,
    /// The prompt came shortly before the commit.
    Time,
}

impl fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Hash => "hash",
            Self::Time => "time",
        })
    }
}

#[derive(Debug, Clone)]
pub struct Interaction {
    pub session_id: String,
    pub exchange: Exchange,
}

/// The stamped exchanges of every session of a project.
#[derive(Debug, Default)]
pub struct SessionIndex {
    interactions: Vec<Interaction>,
}

impl SessionIndex {
    /// Add one session's exchanges. When two sessions report the same
    /// commit, or send prompts at the same instant, the one added last wins.
    pub fn add_session(&mut self, session_id: &str, exchanges: Vec<Exchange>) {
        self.interactions.extend(
            exchanges
                .into_iter()
                .filter(|e| e.timestamp.is_some())
                .map(|exchange| Interaction {
                    session_id: session_id.to_string(),
                    exchange,
                }),
        );
    }

    pub fn len(&self) -> usize {
        self.interactions.len()
    }

    /// The prompt behind a commit: the one whose answer reported the
    /// commit id, else the last prompt sent at most
    /// [`MATCH_WINDOW_SECS`] before the commit.
    pub fn resolve(
        &self,
        commit_id: &str,
        commit_time: Option<DateTime<Utc>>,
    ) -> Option<(MatchMethod, &Interaction)> {
        if let Some(hit) = self.by_commit_id(commit_id) {
            return Some((MatchMethod::Hash, hit));
        }
        let hit = self.by_time(commit_time?)?;
        Some((MatchMethod::Time, hit))
    }

    fn by_commit_id(&self, commit_id: &str) -> Option<&Interaction> {
        self.interactions.iter().rev().find(|i| {
            i.exchange
                .commit_ids
                .iter()
                .any(|id| commit_id.starts_with(id.as_str()))
        })
    }

    fn by_time(&self, commit_time: DateTime<Utc>) -> Option<&Interaction> {
        let until = commit_time.timestamp();
        let (sent, latest) = self
            .interactions
            .iter()
            .filter_map(|i| Some((i.exchange.timestamp?, i)))
            .filter(|(ts, _)| ts.timestamp() <= until)
            .max_by_key(|(ts, _)| *ts)?;
        (until - sent.timestamp() <= MATCH_WINDOW_SECS).then_some(latest)
    }
}
