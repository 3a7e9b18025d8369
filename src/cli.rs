use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Commit staged changes with the AI session that produced them recorded
/// in the message.
#[derive(Debug, Parser)]
#[command(name = "claudecommit", version)]
pub struct Cli {
    /// Directory inside the git repository to work on.
    #[arg(long, global = true, default_value = ".")]
    pub project: PathBuf,

    /// Log pipeline decisions to stderr.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Compose the attributed message and commit the staged changes.
    Commit(CommitArgs),
    /// Show staged, unstaged and untracked files.
    Status,
    /// Print the metadata trailers of the active session.
    SessionInfo,
    /// List the project's session transcripts, newest first.
    Sessions {
        /// Show at most this many sessions.
        #[arg(short = 'n', long, default_value_t = 10)]
        limit: usize,
    },
    /// Render the commit message template.
    FormatMessage,
    /// Show the session and prompts behind a commit.
    Blame(BlameArgs),
}

#[derive(Debug, Args)]
pub struct BlameArgs {
    #[arg(default_value = "HEAD")]
    pub commit: String,

    /// Include the agent's replies.
    #[arg(short, long)]
    pub responses: bool,

    /// List every prompt of the recorded session, not only those sent
    /// since the parent commit.
    #[arg(short, long)]
    pub all: bool,
}

#[derive(Debug, Args)]
pub struct CommitArgs {
    /// One-line summary of the change.
    #[arg(short, long)]
    pub message: String,

    /// Print the message without committing.
    #[arg(long)]
    pub dry_run: bool,

    /// Stage modifications of tracked files first, like `git commit -a`.
    #[arg(short, long)]
    pub all: bool,

    /// Commit with a summary-only message when no session is found.
    #[arg(long)]
    pub allow_no_session: bool,

    /// Ignore prompts recorded before the current HEAD commit.
    #[arg(long)]
    pub since_head: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn commit_flags_parse() {
        let cli = Cli::parse_from([
            "claudecommit",
            "-v",
            "commit",
            "-m",
            "Add login form",
            "--dry-run",
            "--since-head",
        ]);
        assert!(cli.verbose);
        let Commands::Commit(args) = cli.command else {
            panic!("expected commit");
        };
        assert_eq!(args.message, "Add login form");
        assert!(args.dry_run && args.since_head);
        assert!(!args.all && !args.allow_no_session);
    }

    #[test]
    fn blame_defaults_to_head() {
        let cli = Cli::parse_from(["claudecommit", "blame"]);
        let Commands::Blame(args) = cli.command else {
            panic!("expected blame");
        };
        assert_eq!(args.commit, "HEAD");
        assert!(!args.responses && !args.all);

        let cli = Cli::parse_from(["claudecommit", "blame", "-r", "--all", "HEAD~1"]);
        let Commands::Blame(args) = cli.command else {
            panic!("expected blame");
        };
        assert_eq!(args.commit, "HEAD~1");
        assert!(args.responses && args.all);
    }

    #[test]
    fn sessions_lists_ten_by_default() {
        let cli = Cli::parse_from(["claudecommit", "sessions"]);
        assert!(matches!(cli.command, Commands::Sessions { limit: 10 }));
        let cli = Cli::parse_from(["claudecommit", "sessions", "-n", "3"]);
        assert!(matches!(cli.command, Commands::Sessions { limit: 3 }));
    }

    #[test]
    fn verbose_and_quiet_conflict() {
        assert!(Cli::try_parse_from(["claudecommit", "-v", "-q", "status"]).is_err());
    }
}
