mod blame;
mod changes;
mod cli;
mod error;
mod git;
mod locator;
mod message;
mod preferences;
mod prompts;
mod session;
mod transcript;
mod workflow;

use anyhow::Result;
use chrono::{DateTime, Local, Utc};
use clap::Parser;
use cli::{Cli, Commands};
use git::CommitResult;
use std::process;
use blame::BlamePrompt;
use workflow::{BlameOptions, BlameReport, CommitOptions, Workflow};

fn init_tracing(quiet: bool, verbose: bool) -> Result<()> {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "warn"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_env("CLAUDECOMMIT_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!("failed to initialize tracing subscriber: {err}"))
}

fn print_status(workflow: &Workflow) -> Result<()> {
    let changes = workflow.status()?;
    if changes.staged_paths.is_empty() {
        println!("No staged changes.");
    } else {
        println!("Staged files:");
        for path in &changes.staged_paths {
            println!("  + {}", path.display());
        }
    }
    if !changes.unstaged_paths.is_empty() {
        println!("\nUnstaged changes:");
        for path in &changes.unstaged_paths {
            println!("  ~ {}", path.display());
        }
    }
    if !changes.untracked_paths.is_empty() {
        println!("\nUntracked files:");
        for path in &changes.untracked_paths {
            println!("  ? {}", path.display());
        }
    }
    Ok(())
}

fn print_sessions(workflow: &Workflow, limit: usize) -> Result<()> {
    for handle in workflow.sessions(limit)? {
        let modified: DateTime<Local> = handle.modified.into();
        println!(
            "{}  {}  {:.1} KB",
            handle.stem(),
            modified.format("%Y-%m-%d %H:%M"),
            handle.size as f64 / 1024.0
        );
    }
    Ok(())
}

fn clock(ts: Option<DateTime<Utc>>) -> String {
    ts.map(|ts| DateTime::<Local>::from(ts).format("%H:%M:%S").to_string())
        .unwrap_or_default()
}

fn print_prompt(prompt: &BlamePrompt) {
    println!("  [{}] {}", clock(prompt.timestamp), message::single_line(&prompt.text));
    for file in &prompt.files {
        println!("    -> {} +{} -{}", file.path.display(), file.added, file.deleted);
    }
    for reply in &prompt.replies {
        println!("    AI: {}", message::single_line(reply));
    }
}

/// Print what ties a commit to an AI session. Returns the exit code: 1
/// when nothing does.
fn print_blame(report: &BlameReport, opts: &BlameOptions) -> i32 {
    let commit = &report.commit;
    println!("commit {} {}", commit.short_id, commit.summary);
    match commit.time {
        Some(time) => println!(
            "Author: {}  Date: {}",
            commit.author,
            DateTime::<Local>::from(time).format("%Y-%m-%d %H:%M:%S")
        ),
        None => println!("Author: {}", commit.author),
    }
    println!();

    if !report.has_context() {
        println!("No AI context found for commit {}.", commit.short_id);
        return 1;
    }

    let provenance = &report.provenance;
    for (label, value) in [
        ("Session", &provenance.session_id),
        ("Agent", &provenance.agent),
        ("Model", &provenance.model),
    ] {
        if let Some(value) = value {
            println!("{label}: {value}");
        }
    }
    if !provenance.prompts.is_empty() {
        println!("\nPrompts:");
        for prompt in &provenance.prompts {
            println!("- {prompt}");
        }
    }

    if !report.stats.is_empty() {
        println!("\nFiles:");
        let paths: Vec<String> = report
            .stats
            .iter()
            .map(|s| s.path.display().to_string())
            .collect();
        let width = paths.iter().map(|p| p.chars().count()).max().unwrap_or(0);
        for (path, stat) in paths.iter().zip(&report.stats) {
            println!("  {path:<width$}  +{} -{}", stat.added, stat.deleted);
        }
        let added: usize = report.stats.iter().map(|s| s.added).sum();
        let deleted: usize = report.stats.iter().map(|s| s.deleted).sum();
        println!("Total: +{added} -{deleted}");
    }

    if let Some(matched) = &report.matched {
        println!(
            "\nMatched by {} in session {}:",
            matched.method, matched.session_id
        );
        print_prompt(&matched.prompt);
    }

    if provenance.is_attributed() {
        match &report.transcript {
            Some(path) => println!("\nTranscript: {}", path.display()),
            None => println!("\nTranscript: not found"),
        }
    }
    if !report.session_prompts.is_empty() {
        if opts.all {
            println!("\nPrompts in the session:");
        } else {
            println!("\nPrompts since the previous commit:");
        }
        for prompt in &report.session_prompts {
            print_prompt(prompt);
        }
    }
    0
}

/// Run the selected command and return the process exit code.
fn run(cli: Cli) -> Result<i32> {
    let workflow = Workflow::open(&cli.project)?;
    match cli.command {
        Commands::Commit(args) => {
            let outcome = workflow.commit(&CommitOptions {
                summary: args.message,
                dry_run: args.dry_run,
                all: args.all,
                allow_no_session: args.allow_no_session,
                since_head: args.since_head,
            })?;
            println!("{}", outcome.message);
            match outcome.result {
                None => {}
                Some(CommitResult::Success { oid }) => {
                    let oid = oid.to_string();
                    println!("\n[{}] {}", &oid[..7], outcome.message.summary_line());
                }
                Some(CommitResult::Failure { reason }) => {
                    eprintln!("claudecommit: commit failed: {reason}");
                    return Ok(1);
                }
            }
        }
        Commands::Status => print_status(&workflow)?,
        Commands::SessionInfo => println!("{}", workflow.session_info()?),
        Commands::Sessions { limit } => print_sessions(&workflow, limit)?,
        Commands::FormatMessage => println!("{}", workflow.format_message()?),
        Commands::Blame(args) => {
            let opts = BlameOptions {
                responses: args.responses,
                all: args.all,
            };
            let report = workflow.blame(&args.commit, &opts)?;
            return Ok(print_blame(&report, &opts));
        }
    }
    Ok(0)
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = init_tracing(cli.quiet, cli.verbose) {
        eprintln!("claudecommit: {err:#}");
        process::exit(2);
    }
    match run(cli) {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("claudecommit: {err:#}");
            process::exit(2);
        }
    }
}
