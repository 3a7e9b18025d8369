use crate::changes::ChangeSummary;
use crate::transcript::{Role, Turn};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Replies that only approve whatever the agent proposed last.
const AFFIRMATIONS: &[&str] = &[
    "y", "yes", "yep", "yeah", "yup", "ok", "okay", "k", "sure", "go", "go ahead", "do it",
    "ok do it", "yes please", "please do", "sounds good", "looks good", "lgtm", "proceed",
    "continue", "approved", "agreed", "correct", "right",
];

/// Openers stripped from a proposal question before it becomes a clause.
const QUESTION_OPENERS: &[&str] = &[
    "do you want me to ",
    "would you like me to ",
    "want me to ",
    "should i ",
    "shall i ",
    "can i ",
    "may i ",
];

/// A human prompt and how it relates to the change being committed.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptRecord {
    pub text: String,
    /// Some agent or tool action in this prompt's window mutated a changed
    /// file. Never set for trigger phrases.
    pub caused_change: bool,
    /// Causal-link score in `[0, 1]`.
    pub confidence: f32,
    pub ambiguous: bool,
    /// What an ambiguous prompt was agreeing to, e.g. `to add X to Y`.
    pub context: Option<String>,
}

/// Case-folded, whitespace-collapsed form used for phrase comparison.
fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Score how clearly a prompt states what it asks for. Bare approvals
/// score lowest; the score rises with the number of words.
pub fn causal_confidence(text: &str) -> f32 {
    let normalized = normalize(text);
    let bare = normalized.trim_end_matches(|c: char| c.is_ascii_punctuation());
    if AFFIRMATIONS.contains(&bare) {
        return 0.1;
    }
    match bare.split_whitespace().count() {
        0 => 0.0,
        1 => 0.4,
        2 => 0.7,
        _ => 1.0,
    }
}

/// Lowercase the first letter unless it begins an acronym.
fn lower_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) if !chars.clone().next().is_some_and(char::is_uppercase) => {
            first.to_lowercase().chain(chars).collect()
        }
        _ => s.to_string(),
    }
}

/// Derive `to <action>` from the last question in an agent message, e.g.
/// `Should I add .DS_Store to .gitignore?` gives
/// `to add .DS_Store to .gitignore`.
pub fn affirmation_context(proposal: &str) -> Option<String> {
    let end = proposal.rfind('?')?;
    let question = &proposal[..end];
    let start = [". ", "! ", "? ", ": ", "\n"]
        .iter()
        .filter_map(|sep| question.rfind(sep).map(|i| i + sep.len()))
        .max()
        .unwrap_or(0);
    let mut phrase = question[start..]
        .trim()
        .trim_start_matches(['-', '*', '>'])
        .trim_matches(['*', '_', '`'])
        .trim();
    for opener in QUESTION_OPENERS {
        let matched = phrase
            .get(..opener.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(opener));
        if matched {
            phrase = phrase[opener.len()..].trim_start();
            break;
        }
    }
    (!phrase.is_empty()).then(|| format!("to {}", lower_first(phrase)))
}

/// The turns after a human turn, up to (not including) the next one.
fn window_after(turns: &[Turn], human: usize) -> &[Turn] {
    let rest = &turns[human + 1..];
    let end = rest
        .iter()
        .position(|t| t.role == Role::Human)
        .unwrap_or(rest.len());
    &rest[..end]
}

/// Whether `effect` names the same file as the repo-relative `changed`.
/// Absolute effects only match under `root`.
fn touches(effect: &Path, changed: &Path, root: Option<&Path>) -> bool {
    if effect.is_absolute() {
        root.is_some_and(|r| effect == r.join(changed))
    } else {
        effect == changed
    }
}

/// A window is effective when one of its actions mutated a changed file.
/// When paths are unknown on either side, any mutating action counts.
fn is_effective(window: &[Turn], changed: &[&Path], root: Option<&Path>) -> bool {
    let mutations: Vec<_> = window
        .iter()
        .filter(|t| t.role != Role::Human)
        .flat_map(|t| &t.side_effects)
        .filter(|e| e.kind.mutates())
        .collect();
    if mutations.is_empty() {
        return false;
    }
    let paths: Vec<&Path> = mutations.iter().filter_map(|e| e.path.as_deref()).collect();
    if paths.is_empty() || changed.is_empty() {
        return true;
    }
    paths
        .iter()
        .any(|p| changed.iter().any(|c| touches(p, c, root)))
}

/// Selects the human prompts that caused the change being committed.
pub struct PromptFilter {
    triggers: Vec<String>,
    threshold: f32,
    /// Repository root that absolute edit paths are resolved against.
    root: Option<PathBuf>,
}

impl PromptFilter {
    /// `trigger_phrases` invoke the commit workflow itself; `threshold` is
    /// the confidence below which a prompt counts as ambiguous.
    pub fn new<I, S>(trigger_phrases: I, threshold: f32) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let triggers = trigger_phrases
            .into_iter()
            .map(|t| trigger_key(t.as_ref()))
            .filter(|t| !t.is_empty())
            .collect();
        Self {
            triggers,
            threshold,
            root: None,
        }
    }

    /// Match absolute edit paths against changed files under `root`.
    /// Without a root only relative edit paths can match.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Exact or near-exact match against a trigger phrase. Slash commands
    /// also match with arguments (`/commit -m wip`).
    pub fn is_trigger(&self, text: &str) -> bool {
        let key = trigger_key(text);
        self.triggers.iter().any(|t| {
            key == *t
                || (t.starts_with('/')
                    && key
                        .strip_prefix(t.as_str())
                        .is_some_and(|rest| rest.starts_with(' ')))
        })
    }

    /// Every human prompt, in order, with its causal classification.
    pub fn classify(&self, turns: &[Turn], changes: &ChangeSummary) -> Vec<PromptRecord> {
        let changed: Vec<&Path> = changes.changed_paths().collect();
        let mut records = Vec::new();
        let mut proposal: Option<&str> = None;

        for (idx, turn) in turns.iter().enumerate() {
            match turn.role {
                Role::Agent if !turn.text.trim().is_empty() => proposal = Some(turn.text.as_str()),
                Role::Agent | Role::Tool => {}
                Role::Human => {
                    let trigger = self.is_trigger(&turn.text);
                    let window = window_after(turns, idx);
                    let effective = is_effective(window, &changed, self.root.as_deref());
                    let confidence = causal_confidence(&turn.text);
                    let ambiguous = confidence < self.threshold;
                    records.push(PromptRecord {
                        text: turn.text.clone(),
                        caused_change: effective && !trigger,
                        confidence,
                        ambiguous,
                        context: if ambiguous {
                            proposal.and_then(affirmation_context)
                        } else {
                            None
                        },
                    });
                    proposal = None;
                }
            }
        }
        records
    }

    /// The prompts that caused the change: effective, not triggers, with
    /// consecutive repeats collapsed.
    pub fn filter(&self, turns: &[Turn], changes: &ChangeSummary) -> Vec<PromptRecord> {
        let all = self.classify(turns, changes);
        let total = all.len();
        let mut kept: Vec<PromptRecord> = all.into_iter().filter(|p| p.caused_change).collect();
        kept.dedup_by(|later, earlier| later.text == earlier.text);
        debug!(total, kept = kept.len(), "filtered prompt history");
        kept
    }
}

/// Trigger comparison key: normalized, trailing `.`/`!` dropped.
fn trigger_key(text: &str) -> String {
    normalize(text)
        .trim_end_matches(['.', '!'])
        .trim_end()
        .to_string()
}
