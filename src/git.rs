use crate::changes::ChangeSummary;
use crate::message::CommitMessage;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use git2::{Patch, Repository, Status, StatusOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Reports what the working tree holds relative to HEAD.
pub trait ChangeInspector {
    fn status(&self) -> Result<ChangeSummary>;
}

/// Outcome of a commit attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitResult {
    Success { oid: git2::Oid },
    Failure { reason: String },
}

/// Records staged changes as a commit carrying a composed message.
pub trait CommitExecutor {
    fn commit(&self, message: &CommitMessage) -> CommitResult;
}

/// A commit as read back for `blame`.
#[derive(Debug, Clone)]
pub struct CommitInfo {
    /// Full hex object id.
    pub id: String,
    pub short_id: String,
    pub summary: String,
    pub author: String,
    pub time: Option<DateTime<Utc>>,
    /// Commit time of the first parent, if any.
    pub parent_time: Option<DateTime<Utc>>,
    pub message: String,
}

/// Lines a commit added and deleted in one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    pub path: PathBuf,
    pub added: usize,
    pub deleted: usize,
}

const STAGED: Status = Status::INDEX_NEW
    .union(Status::INDEX_MODIFIED)
    .union(Status::INDEX_DELETED)
    .union(Status::INDEX_RENAMED)
    .union(Status::INDEX_TYPECHANGE);

const UNSTAGED: Status = Status::WT_MODIFIED
    .union(Status::WT_DELETED)
    .union(Status::WT_RENAMED)
    .union(Status::WT_TYPECHANGE);

fn to_utc(time: git2::Time) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(time.seconds(), 0)
}

pub struct GitRepo {
    repo: Repository,
    root: PathBuf,
}

impl GitRepo {
    /// Open the repository containing `dir`.
    pub fn discover(dir: &Path) -> Result<Self> {
        let repo = Repository::discover(dir)
            .with_context(|| format!("finding git repo from {}", dir.display()))?;
        let root = repo
            .workdir()
            .context("git repo is bare, no working directory")?
            .components()
            .collect();
        Ok(Self { repo, root })
    }

    /// The working directory, without a trailing separator.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stage modifications and deletions of tracked files, as `git commit -a`
    /// does. Untracked files are left alone.
    pub fn stage_tracked(&self) -> Result<()> {
        let mut index = self.repo.index().context("opening index")?;
        index
            .update_all(["*"].iter(), None)
            .context("staging tracked changes")?;
        index.write().context("writing index")?;
        Ok(())
    }

    /// Commit time of HEAD, or `None` on an unborn branch.
    pub fn head_time(&self) -> Option<DateTime<Utc>> {
        self.repo
            .head()
            .ok()
            .and_then(|h| h.peel_to_commit().ok())
            .and_then(|c| to_utc(c.time()))
    }

    fn find_commit(&self, rev: &str) -> Result<git2::Commit<'_>> {
        self.repo
            .revparse_single(rev)
            .and_then(|obj| obj.peel_to_commit())
            .with_context(|| format!("resolving commit {rev}"))
    }

    pub fn commit_info(&self, rev: &str) -> Result<CommitInfo> {
        let commit = self.find_commit(rev)?;
        let short_id = commit
            .as_object()
            .short_id()
            .context("abbreviating commit id")?
            .as_str()
            .unwrap_or_default()
            .to_string();
        Ok(CommitInfo {
            id: commit.id().to_string(),
            short_id,
            summary: commit.summary().unwrap_or_default().to_string(),
            author: commit.author().name().unwrap_or_default().to_string(),
            time: to_utc(commit.time()),
            parent_time: commit.parent(0).ok().and_then(|p| to_utc(p.time())),
            message: commit.message().unwrap_or_default().to_string(),
        })
    }

    /// Per-file line counts of `rev` against its first parent, or against
    /// the empty tree for a root commit. Ordered by path. Binary files
    /// count as no lines.
    pub fn commit_stats(&self, rev: &str) -> Result<Vec<FileStat>> {
        let commit = self.find_commit(rev)?;
        let tree = commit.tree().context("reading commit tree")?;
        let parent_tree = match commit.parent(0) {
            Ok(parent) => Some(parent.tree().context("reading parent tree")?),
            Err(_) => None,
        };
        let diff = self
            .repo
            .diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), None)
            .with_context(|| format!("diffing {rev} against its parent"))?;

        let mut stats = Vec::new();
        for idx in 0..diff.deltas().len() {
            let Some(patch) = Patch::from_diff(&diff, idx).context("reading patch")? else {
                continue;
            };
            let delta = patch.delta();
            let Some(path) = delta.new_file().path().or_else(|| delta.old_file().path()) else {
                continue;
            };
            let (_, added, deleted) = patch.line_stats().context("counting changed lines")?;
            stats.push(FileStat {
                path: path.to_path_buf(),
                added,
                deleted,
            });
        }
        stats.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(stats)
    }

    fn write_commit(&self, message: &str) -> Result<git2::Oid> {
        let mut index = self.repo.index().context("opening index")?;
        let tree_oid = index.write_tree().context("writing tree")?;
        let tree = self.repo.find_tree(tree_oid).context("finding tree")?;
        let sig = self
            .repo
            .signature()
            .context("reading git signature (user.name / user.email)")?;
        let parent = self.repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<&git2::Commit> = parent.iter().collect();
        self.repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .context("creating commit")
    }
}

impl ChangeInspector for GitRepo {
    fn status(&self) -> Result<ChangeSummary> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false);
        let statuses = self
            .repo
            .statuses(Some(&mut opts))
            .context("checking git status")?;

        let mut summary = ChangeSummary::default();
        for entry in statuses.iter() {
            let Some(path) = entry.path() else { continue };
            let path = PathBuf::from(path);
            let status = entry.status();
            if status.intersects(STAGED) {
                summary.staged_paths.insert(path.clone());
            }
            if status.intersects(UNSTAGED) {
                summary.unstaged_paths.insert(path.clone());
            }
            if status.contains(Status::WT_NEW) {
                summary.untracked_paths.insert(path);
            }
        }
        debug!(
            staged = summary.staged_paths.len(),
            unstaged = summary.unstaged_paths.len(),
            untracked = summary.untracked_paths.len(),
            "working tree status"
        );
        Ok(summary)
    }
}

impl CommitExecutor for GitRepo {
    fn commit(&self, message: &CommitMessage) -> CommitResult {
        match self.write_commit(&message.render()) {
            Ok(oid) => CommitResult::Success { oid },
            Err(err) => CommitResult::Failure {
                reason: format!("{err:#}"),
            },
        }
    }
}
