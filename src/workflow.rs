use crate::blame::{BlamePrompt, MatchMethod, SessionIndex, exchanges};
use crate::changes::ChangeSummary;
use crate::error::CommitError;
use crate::git::{ChangeInspector, CommitExecutor, CommitInfo, CommitResult, FileStat, GitRepo};
use crate::locator::{TranscriptHandle, TranscriptLocator};
use crate::message::{CommitMessage, Provenance, metadata, render_metadata};
use crate::preferences::Preferences;
use crate::prompts::PromptFilter;
use crate::session::Session;
use crate::transcript::Transcript;
use anyhow::{Context, Result};
use minijinja::{Environment, context};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Placeholder values rendered by `format-message` when no session exists.
const NO_SESSION: &str = "<session id>";

#[derive(Debug, Clone, Default)]
pub struct CommitOptions {
    pub summary: String,
    pub dry_run: bool,
    /// Stage modifications of tracked files first.
    pub all: bool,
    /// Commit without attribution when no session transcript exists.
    pub allow_no_session: bool,
    /// Ignore prompts recorded before the current HEAD commit.
    pub since_head: bool,
}

#[derive(Debug)]
pub struct CommitOutcome {
    pub message: CommitMessage,
    /// `None` for a dry run.
    pub result: Option<CommitResult>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BlameOptions {
    /// Include the agent's replies under each prompt.
    pub responses: bool,
    /// List every prompt of the recorded session, not only those sent
    /// since the parent commit.
    pub all: bool,
}

/// The prompt a commit was tied to through the session index.
#[derive(Debug)]
pub struct MatchedPrompt {
    pub method: MatchMethod,
    pub session_id: String,
    pub prompt: BlamePrompt,
}

#[derive(Debug)]
pub struct BlameReport {
    pub commit: CommitInfo,
    pub provenance: Provenance,
    pub stats: Vec<FileStat>,
    pub matched: Option<MatchedPrompt>,
    /// Where the recorded session's transcript lives, if it still exists.
    pub transcript: Option<PathBuf>,
    /// Prompts of the recorded session sent after the parent commit and up
    /// to this one, or all of them.
    pub session_prompts: Vec<BlamePrompt>,
}

impl BlameReport {
    /// Whether anything ties the commit to an AI session.
    pub fn has_context(&self) -> bool {
        self.provenance.is_attributed() || self.matched.is_some()
    }
}

fn is_not_found(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<CommitError>(),
        Some(CommitError::NotFound { .. })
    )
}

/// Everything a command needs: the repository, its preferences and the
/// transcript locator.
pub struct Workflow {
    git: GitRepo,
    prefs: Preferences,
    locator: TranscriptLocator,
}

impl Workflow {
    /// Open the git repo containing `project` and load its preferences.
    pub fn open(project: &Path) -> Result<Self> {
        let git = GitRepo::discover(project)?;
        let prefs = Preferences::load(git.root())?;
        let transcripts_dir = prefs
            .transcripts_dir
            .as_ref()
            .map(|dir| git.root().join(dir));
        let locator = TranscriptLocator::from_env(transcripts_dir.as_deref())?;
        debug!(
            root = %git.root().display(),
            projects = %locator.projects_dir().display(),
            "opened workflow"
        );
        Ok(Self {
            git,
            prefs,
            locator,
        })
    }

    pub fn root(&self) -> &Path {
        self.git.root()
    }

    /// Locate the active session transcript and extract its metadata.
    pub fn resolve_session(&self) -> Result<(Session, Transcript)> {
        let handle = self.locator.locate(self.root())?;
        let transcript = Transcript::read(&handle.path)?;
        let session = self.prefs.extractor().extract_from(&handle, &transcript)?;
        Ok((session, transcript))
    }

    pub fn status(&self) -> Result<ChangeSummary> {
        self.git.status()
    }

    /// The metadata block of the active session.
    pub fn session_info(&self) -> Result<String> {
        let (session, _) = self.resolve_session()?;
        Ok(render_metadata(&metadata(&session, &self.prefs.contact)))
    }

    /// The project's `limit` newest transcripts, newest first.
    pub fn sessions(&self, limit: usize) -> Result<Vec<TranscriptHandle>> {
        let mut handles = self.locator.list(self.root())?;
        handles.truncate(limit);
        Ok(handles)
    }

    /// Render the configured message template for the active session.
    pub fn format_message(&self) -> Result<String> {
        let (session_id, agent, model) = match self.resolve_session() {
            Ok((session, _)) => (
                session.session_id.clone(),
                session.agent_line(&self.prefs.contact),
                session.model_id.clone(),
            ),
            Err(err) if is_not_found(&err) => {
                debug!("no session for template: {err:#}");
                (
                    NO_SESSION.to_string(),
                    format!("{} <{}>", self.prefs.agent_name, self.prefs.contact),
                    NO_SESSION.to_string(),
                )
            }
            Err(err) => return Err(err),
        };
        let template = self.prefs.load_template(self.root())?;
        let env = Environment::new();
        let tmpl = env
            .template_from_str(&template)
            .context("parsing message template")?;
        tmpl.render(context! {
            summary_max => self.prefs.summary_max_chars,
            session_id,
            agent,
            model,
        })
        .context("rendering message template")
    }

    /// Compose the attributed message for the staged changes and, unless
    /// this is a dry run, commit it.
    pub fn commit(&self, opts: &CommitOptions) -> Result<CommitOutcome> {
        if opts.all {
            self.git.stage_tracked()?;
        }
        let changes = self.git.status()?;
        changes.ensure_staged()?;

        let resolved = match self.resolve_session() {
            Ok(resolved) => Some(resolved),
            Err(err) if opts.allow_no_session && is_not_found(&err) => {
                warn!("committing without attribution: {err:#}");
                None
            }
            Err(err) => return Err(err),
        };

        let composer = self.prefs.composer();
        let message = match resolved {
            Some((session, transcript)) => {
                let mut turns = transcript.turns();
                if opts.since_head {
                    if let Some(head) = self.git.head_time() {
                        turns.retain(|t| t.timestamp.is_none_or(|ts| ts > head));
                    }
                }
                let prompts = self
                    .prefs
                    .prompt_filter()
                    .with_root(self.root())
                    .filter(&turns, &changes);
                composer.compose(&opts.summary, &prompts, &session, &changes)?
            }
            None => composer.compose_unattributed(&opts.summary, &changes)?,
        };

        debug!(
            prompts = message.prompt_lines().len(),
            attributed = !message.metadata().is_empty(),
            dry_run = opts.dry_run,
            "composed commit message"
        );
        let result = if opts.dry_run {
            None
        } else {
            Some(self.git.commit(&message))
        };
        Ok(CommitOutcome { message, result })
    }

    /// Read back the attribution recorded in `rev`, tie the commit to the
    /// prompt behind it through the project's sessions, and list the
    /// recorded session's prompts.
    pub fn blame(&self, rev: &str, opts: &BlameOptions) -> Result<BlameReport> {
        let commit = self.git.commit_info(rev)?;
        let stats = self.git.commit_stats(rev)?;
        let provenance = Provenance::parse(&commit.message);
        let filter = self.prefs.prompt_filter();

        let matched = self
            .session_index(&filter)?
            .resolve(&commit.id, commit.time)
            .map(|(method, hit)| MatchedPrompt {
                method,
                session_id: hit.session_id.clone(),
                prompt: hit.exchange.for_commit(self.root(), &stats, opts.responses),
            });

        let transcript = provenance
            .session_id
            .as_deref()
            .and_then(|id| self.locator.find_session(id, self.root()));
        let session_prompts = match &transcript {
            Some(path) => match Transcript::read(path) {
                Ok(t) => exchanges(&t, &filter)
                    .iter()
                    .filter(|e| {
                        opts.all
                            || commit
                                .time
                                .is_some_and(|until| e.within(commit.parent_time, until))
                    })
                    .map(|e| e.for_commit(self.root(), &stats, opts.responses))
                    .collect(),
                Err(err) => {
                    warn!("{err}");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        debug!(
            commit = %commit.short_id,
            files = stats.len(),
            matched = ?matched.as_ref().map(|m| m.method),
            session_prompts = session_prompts.len(),
            "blame"
        );
        Ok(BlameReport {
            commit,
            provenance,
            stats,
            matched,
            transcript,
            session_prompts,
        })
    }

    /// Index every session of the project, oldest first so that newer
    /// sessions win ties. No transcripts at all gives an empty index.
    fn session_index(&self, filter: &PromptFilter) -> Result<SessionIndex> {
        let mut index = SessionIndex::default();
        let handles = match self.locator.list(self.root()) {
            Ok(handles) => handles,
            Err(CommitError::NotFound { dir }) => {
                debug!(dir = %dir.display(), "no sessions to index");
                return Ok(index);
            }
            Err(err) => return Err(err.into()),
        };
        for handle in handles.iter().rev() {
            match Transcript::read(&handle.path) {
                Ok(t) => index.add_session(handle.stem(), exchanges(&t, filter)),
                Err(err) => warn!("{err}"),
            }
        }
        debug!(sessions = handles.len(), prompts = index.len(), "indexed sessions");
        Ok(index)
    }
}
