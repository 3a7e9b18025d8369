#![allow(dead_code)]

use serde_json::{Value, json};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

pub const MODEL: &str = "claude-opus-4-5-20251101";
pub const VERSION: &str = "2.0.14";

/// A git repository with an initial commit plus an isolated Claude config
/// directory. Both `TempDir`s must be kept alive for the duration of the test.
pub struct Fixture {
    repo: tempfile::TempDir,
    claude: tempfile::TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        let repo = tempfile::tempdir().unwrap();
        let git = git2::Repository::init(repo.path()).unwrap();

        let mut config = git.config().unwrap();
        config.set_str("user.name", "Test").unwrap();
        config.set_str("user.email", "test@test.com").unwrap();

        // Create an initial commit so HEAD exists.
        let sig = git.signature().unwrap();
        let tree_oid = git.index().unwrap().write_tree().unwrap();
        let tree = git.find_tree(tree_oid).unwrap();
        git.commit(Some("HEAD"), &sig, &sig, "initial", &tree, &[])
            .unwrap();

        Self {
            repo,
            claude: tempfile::tempdir().unwrap(),
        }
    }

    /// Canonical repository root, as the binary sees it.
    pub fn root(&self) -> PathBuf {
        fs::canonicalize(self.repo.path()).unwrap()
    }

    /// Run the binary inside the repository with the isolated config dir.
    pub fn run(&self, args: &[&str]) -> (i32, String, String) {
        let output = Command::new(env!("CARGO_BIN_EXE_claudecommit"))
            .args(args)
            .current_dir(self.repo.path())
            .env("CLAUDE_CONFIG_DIR", self.claude.path())
            .env_remove("CLAUDECOMMIT_LOG")
            .output()
            .expect("failed to spawn binary");
        (
            output.status.code().unwrap_or(-1),
            String::from_utf8_lossy(&output.stdout).to_string(),
            String::from_utf8_lossy(&output.stderr).to_string(),
        )
    }

    /// The directory the host would store this project's transcripts in.
    pub fn transcript_dir(&self) -> PathBuf {
        let encoded: String = self
            .root()
            .to_string_lossy()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect();
        self.claude.path().join("projects").join(encoded)
    }

    pub fn write_transcript(&self, session_id: &str, records: &[Value]) -> PathBuf {
        let contents: String = records.iter().map(|r| format!("{r}\n")).collect();
        self.write_raw_transcript(&format!("{session_id}.jsonl"), &contents)
    }

    pub fn write_raw_transcript(&self, file_name: &str, contents: &str) -> PathBuf {
        let dir = self.transcript_dir();
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(file_name);
        fs::write(&path, contents).unwrap();
        path
    }

    pub fn write_file(&self, rel: &str, contents: &str) {
        let path = self.repo.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }

    pub fn stage(&self, rel: &str) {
        let git = git2::Repository::open(self.repo.path()).unwrap();
        let mut index = git.index().unwrap();
        index.add_path(Path::new(rel)).unwrap();
        index.write().unwrap();
    }

    /// Write, stage and commit `rel` with the commit time set to `secs`
    /// since the epoch, as a commit made outside the tool. Returns the full
    /// commit id.
    pub fn commit_at(&self, rel: &str, contents: &str, message: &str, secs: i64) -> String {
        self.write_file(rel, contents);
        self.stage(rel);
        let git = git2::Repository::open(self.repo.path()).unwrap();
        let sig = git2::Signature::new("Test", "test@test.com", &git2::Time::new(secs, 0)).unwrap();
        let tree_oid = git.index().unwrap().write_tree().unwrap();
        let tree = git.find_tree(tree_oid).unwrap();
        let parent = git.head().unwrap().peel_to_commit().unwrap();
        git.commit(Some("HEAD"), &sig, &sig, message, &tree, &[&parent])
            .unwrap()
            .to_string()
    }

    pub fn head_message(&self) -> String {
        let git = git2::Repository::open(self.repo.path()).unwrap();
        let head = git.head().unwrap().peel_to_commit().unwrap();
        head.message().unwrap().to_string()
    }

    pub fn commit_count(&self) -> usize {
        let git = git2::Repository::open(self.repo.path()).unwrap();
        let mut walk = git.revwalk().unwrap();
        walk.push_head().unwrap();
        walk.count()
    }
}

pub fn session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub fn user(session: &str, ts: &str, text: &str) -> Value {
    json!({
        "type": "user",
        "sessionId": session,
        "version": VERSION,
        "userType": "external",
        "timestamp": ts,
        "message": { "role": "user", "content": text }
    })
}

pub fn assistant(session: &str, ts: &str, text: &str) -> Value {
    json!({
        "type": "assistant",
        "sessionId": session,
        "version": VERSION,
        "timestamp": ts,
        "message": {
            "role": "assistant",
            "model": MODEL,
            "content": [{ "type": "text", "text": text }]
        }
    })
}

/// An assistant turn invoking `tool` (`Edit` or `Write`) on `file`.
pub fn tool_call(session: &str, ts: &str, tool: &str, file: &Path) -> Value {
    json!({
        "type": "assistant",
        "sessionId": session,
        "version": VERSION,
        "timestamp": ts,
        "message": {
            "role": "assistant",
            "model": MODEL,
            "content": [{
                "type": "tool_use",
                "id": "toolu_01",
                "name": tool,
                "input": { "file_path": file.to_string_lossy() }
            }]
        }
    })
}

/// The result of a Bash tool call that ran `git commit`.
pub fn commit_output(session: &str, ts: &str, stdout: &str) -> Value {
    json!({
        "type": "user",
        "sessionId": session,
        "version": VERSION,
        "userType": "external",
        "timestamp": ts,
        "message": {
            "role": "user",
            "content": [{ "type": "tool_result", "tool_use_id": "toolu_02", "content": stdout }]
        },
        "toolUseResult": { "stdout": stdout, "stderr": "", "interrupted": false }
    })
}

/// How the host records a slash command typed by the human.
pub fn slash_command(session: &str, ts: &str, name: &str) -> Value {
    user(
        session,
        ts,
        &format!(
            "<command-message>{}</command-message>\n<command-name>{name}</command-name>",
            name.trim_start_matches('/')
        ),
    )
}
