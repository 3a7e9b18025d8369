use super::*;
use std::collections::BTreeSet;
use std::path::PathBuf;

fn session() -> Session {
    Session {
        session_id: "7c1f0a4e-5b2d-4c1e-9f3a-2d8e6b4a1c90".into(),
        project_path: PathBuf::from("/work/app"),
        transcript_path: PathBuf::from("/home/me/.claude/projects/-work-app/7c1f.jsonl"),
        agent_name: "Claude Code".into(),
        agent_version: "2.0.14".into(),
        model_id: "claude-opus-4-5-20251101".into(),
    }
}

fn staged() -> ChangeSummary {
    ChangeSummary {
        staged_paths: BTreeSet::from([PathBuf::from("src/login.rs")]),
        ..Default::default()
    }
}

fn prompt(text: &str) -> PromptRecord {
    PromptRecord {
        text: text.into(),
        caused_change: true,
        confidence: 1.0,
        ambiguous: false,
        context: None,
    }
}

fn composer() -> Composer {
    Composer::new(50, 200, "noreply@anthropic.com")
}

#[test]
fn renders_the_full_message() {
    let msg = composer()
        .compose(
            "Add login form",
            &[
                prompt("Add a login form to the app"),
                prompt("Make sure it validates email format"),
            ],
            &session(),
            &staged(),
        )
        .unwrap();
    assert_eq!(
        msg.render(),
        "Add login form\n\
         \n\
         User prompts:\n\
         - \"Add a login form to the app\"\n\
         - \"Make sure it validates email format\"\n\
         \n\
         AI-Session-ID: 7c1f0a4e-5b2d-4c1e-9f3a-2d8e6b4a1c90\n\
         AI Agent: Claude Code 2.0.14 <noreply@anthropic.com>\n\
         Model: claude-opus-4-5-20251101"
    );
    assert_eq!(msg.to_string(), msg.render());
}

#[test]
fn no_prompts_omits_the_prompt_block() {
    let msg = composer()
        .compose("Bump version", &[], &session(), &staged())
        .unwrap();
    let text = msg.render();
    assert!(!text.contains("User prompts:"));
    assert_eq!(
        text,
        "Bump version\n\nAI-Session-ID: 7c1f0a4e-5b2d-4c1e-9f3a-2d8e6b4a1c90\n\
         AI Agent: Claude Code 2.0.14 <noreply@anthropic.com>\n\
         Model: claude-opus-4-5-20251101"
    );
}

#[test]
fn metadata_keys_are_fixed_and_last() {
    let msg = composer()
        .compose("x", &[prompt("a b c")], &session(), &staged())
        .unwrap();
    let keys: Vec<&str> = msg.metadata().iter().map(|(k, _)| *k).collect();
    assert_eq!(keys, vec!["AI-Session-ID", "AI Agent", "Model"]);
    assert!(msg.render().ends_with("Model: claude-opus-4-5-20251101"));
}

#[test]
fn compose_is_deterministic() {
    let prompts = [prompt("Add a login form"), prompt("fix it")];
    let a = composer().compose("Login", &prompts, &session(), &staged()).unwrap();
    let b = composer().compose("Login", &prompts, &session(), &staged()).unwrap();
    assert_eq!(a.render().as_bytes(), b.render().as_bytes());
}

#[test]
fn long_summary_is_truncated_with_ellipsis() {
    let summary = "a".repeat(80);
    let msg = composer().compose(&summary, &[], &session(), &staged()).unwrap();
    let line = msg.summary_line();
    assert!(line.chars().count() <= 50, "{} chars", line.chars().count());
    assert!(line.ends_with(ELLIPSIS));
}

#[test]
fn empty_summary_is_rejected() {
    for summary in ["", "   ", "\n"] {
        let err = composer()
            .compose(summary, &[], &session(), &staged())
            .unwrap_err();
        assert!(matches!(err, CommitError::EmptySummary), "{summary:?}");
    }
}

#[test]
fn nothing_staged_is_rejected() {
    let changes = ChangeSummary {
        unstaged_paths: BTreeSet::from([PathBuf::from("a.rs")]),
        ..Default::default()
    };
    let err = composer()
        .compose("Fix", &[], &session(), &changes)
        .unwrap_err();
    assert!(matches!(err, CommitError::NoStagedChanges));
}

#[test]
fn multi_line_prompts_become_one_line() {
    let msg = composer()
        .compose("x", &[prompt("first line\nsecond line\r\nthird")], &session(), &staged())
        .unwrap();
    assert_eq!(msg.prompt_lines(), ["\"first line second line third\""]);
}

#[test]
fn long_prompts_are_truncated_not_split() {
    let composer = Composer::new(50, 20, "c");
    let msg = composer
        .compose("x", &[prompt("please rename every handler in the module")], &session(), &staged())
        .unwrap();
    assert_eq!(msg.prompt_lines(), ["\"please rename eve...\""]);
}

#[test]
fn ambiguous_prompt_renders_its_context() {
    let yes = PromptRecord {
        text: "Yes".into(),
        caused_change: true,
        confidence: 0.1,
        ambiguous: true,
        context: Some("to add .DS_Store to .gitignore".into()),
    };
    let bare_ok = PromptRecord {
        text: "ok".into(),
        context: None,
        ..yes.clone()
    };
    let msg = composer()
        .compose("Ignore .DS_Store", &[yes, bare_ok], &session(), &staged())
        .unwrap();
    assert_eq!(
        msg.prompt_lines(),
        ["\"Yes\" (to add .DS_Store to .gitignore)", "\"ok\""]
    );
}

#[test]
fn unattributed_message_is_summary_only() {
    let msg = composer().compose_unattributed("Fix typo", &staged()).unwrap();
    assert_eq!(msg.render(), "Fix typo");
}

#[test]
fn truncation_boundaries() {
    assert_eq!(truncate_with_ellipsis("short", 50), "short");
    assert_eq!(truncate_with_ellipsis("exactly ten", 11), "exactly ten");
    assert_eq!(truncate_with_ellipsis("abcdefghij", 8), "abcde...");
    assert_eq!(truncate_with_ellipsis("word word word", 8), "word...");
    assert_eq!(truncate_with_ellipsis("abcdef", 2), "ab");
    assert_eq!(truncate_with_ellipsis("héllo wörld", 8), "héllo...");
}

#[test]
fn provenance_reads_back_a_composed_message() {
    let yes = PromptRecord {
        text: "Yes".into(),
        caused_change: true,
        confidence: 0.1,
        ambiguous: true,
        context: Some("to add .DS_Store to .gitignore".into()),
    };
    let msg = composer()
        .compose("Ignore junk", &[prompt("clean up the root"), yes], &session(), &staged())
        .unwrap();
    let provenance = Provenance::parse(&msg.render());
    assert!(provenance.is_attributed());
    assert_eq!(
        provenance.session_id.as_deref(),
        Some("7c1f0a4e-5b2d-4c1e-9f3a-2d8e6b4a1c90")
    );
    assert_eq!(
        provenance.agent.as_deref(),
        Some("Claude Code 2.0.14 <noreply@anthropic.com>")
    );
    assert_eq!(provenance.model.as_deref(), Some("claude-opus-4-5-20251101"));
    assert_eq!(provenance.prompts, msg.prompt_lines());
}

#[test]
fn provenance_of_plain_message_is_empty() {
    let provenance = Provenance::parse("Fix typo\n\nSigned-off-by: Someone <s@example.com>");
    assert!(!provenance.is_attributed());
    assert!(provenance.prompts.is_empty());
}
