use crate::changes::ChangeSummary;
use crate::error::CommitError;
use crate::prompts::PromptRecord;
use crate::session::Session;
use std::fmt;

pub const ELLIPSIS: &str = "...";

pub const SESSION_KEY: &str = "AI-Session-ID";
pub const AGENT_KEY: &str = "AI Agent";
pub const MODEL_KEY: &str = "Model";

const PROMPTS_HEADER: &str = "User prompts:";

// ===================================================================
// Pure string transforms
// ===================================================================

/// Shorten `text` to at most `max_chars` characters (Unicode scalar
/// values), ending in `...` when anything was cut.
pub fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(ELLIPSIS.len());
    if keep == 0 {
        return text.chars().take(max_chars).collect();
    }
    let end = text
        .char_indices()
        .nth(keep)
        .map_or(text.len(), |(i, _)| i);
    format!("{}{ELLIPSIS}", text[..end].trim_end())
}

/// Replace line breaks with spaces so the text fits on one line.
pub fn single_line(text: &str) -> String {
    text.replace("\r\n", " ").replace(['\n', '\r'], " ")
}

/// The metadata trailers for `session`, in their fixed order.
pub fn metadata(session: &Session, contact: &str) -> Vec<(&'static str, String)> {
    vec![
        (SESSION_KEY, session.session_id.clone()),
        (AGENT_KEY, session.agent_line(contact)),
        (MODEL_KEY, session.model_id.clone()),
    ]
}

pub fn render_metadata(metadata: &[(&'static str, String)]) -> String {
    metadata
        .iter()
        .map(|(key, value)| format!("{key}: {value}"))
        .collect::<Vec<_>>()
        .join("\n")
}

// ===================================================================
// CommitMessage
// ===================================================================

/// A composed commit message. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitMessage {
    summary_line: String,
    prompt_lines: Vec<String>,
    metadata: Vec<(&'static str, String)>,
}

impl CommitMessage {
    pub fn summary_line(&self) -> &str {
        &self.summary_line
    }

    /// Rendered prompt lines, without the leading `- `.
    pub fn prompt_lines(&self) -> &[String] {
        &self.prompt_lines
    }

    pub fn metadata(&self) -> &[(&'static str, String)] {
        &self.metadata
    }

    /// The commit text: summary, prompt block (if any) and metadata block
    /// (if any), separated by exactly one blank line.
    pub fn render(&self) -> String {
        let mut out = self.summary_line.clone();
        if !self.prompt_lines.is_empty() {
            out.push_str("\n\n");
            out.push_str(PROMPTS_HEADER);
            for line in &self.prompt_lines {
                out.push_str("\n- ");
                out.push_str(line);
            }
        }
        if !self.metadata.is_empty() {
            out.push_str("\n\n");
            out.push_str(&render_metadata(&self.metadata));
        }
        out
    }
}

impl fmt::Display for CommitMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

// ===================================================================
// Composer
// ===================================================================

/// Renders summary, prompts and session metadata into a `CommitMessage`.
pub struct Composer {
    summary_max: usize,
    prompt_max: usize,
    contact: String,
}

impl Composer {
    pub fn new(summary_max: usize, prompt_max: usize, contact: impl Into<String>) -> Self {
        Self {
            summary_max,
            prompt_max,
            contact: contact.into(),
        }
    }

    pub fn compose(
        &self,
        summary: &str,
        prompts: &[PromptRecord],
        session: &Session,
        changes: &ChangeSummary,
    ) -> Result<CommitMessage, CommitError> {
        changes.ensure_staged()?;
        Ok(CommitMessage {
            summary_line: self.summary_line(summary)?,
            prompt_lines: prompts.iter().map(|p| self.prompt_line(p)).collect(),
            metadata: metadata(session, &self.contact),
        })
    }

    /// Summary-only message for when the operator chose to commit without
    /// a detected session.
    pub fn compose_unattributed(
        &self,
        summary: &str,
        changes: &ChangeSummary,
    ) -> Result<CommitMessage, CommitError> {
        changes.ensure_staged()?;
        Ok(CommitMessage {
            summary_line: self.summary_line(summary)?,
            prompt_lines: Vec::new(),
            metadata: Vec::new(),
        })
    }

    fn summary_line(&self, summary: &str) -> Result<String, CommitError> {
        let line = single_line(summary);
        let line = line.trim();
        if line.is_empty() {
            return Err(CommitError::EmptySummary);
        }
        Ok(truncate_with_ellipsis(line, self.summary_max))
    }

    /// `"prompt"`, followed by ` (context)` for ambiguous prompts when a
    /// context clause could be derived.
    fn prompt_line(&self, prompt: &PromptRecord) -> String {
        let text = single_line(&prompt.text);
        let quoted = format!("\"{}\"", truncate_with_ellipsis(text.trim(), self.prompt_max));
        match &prompt.context {
            Some(context) if prompt.ambiguous => format!("{quoted} ({context})"),
            _ => quoted,
        }
    }
}

// ===================================================================
// Provenance: reading a composed message back
// ===================================================================

/// The attribution recorded in an existing commit message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Provenance {
    pub session_id: Option<String>,
    pub agent: Option<String>,
    pub model: Option<String>,
    /// Prompt lines as rendered, without the leading `- `.
    pub prompts: Vec<String>,
}

impl Provenance {
    pub fn parse(message: &str) -> Self {
        let mut provenance = Self::default();
        let mut in_prompts = false;
        for line in message.lines() {
            if line.trim_end() == PROMPTS_HEADER {
                in_prompts = true;
                continue;
            }
            if in_prompts {
                if let Some(prompt) = line.strip_prefix("- ") {
                    provenance.prompts.push(prompt.to_string());
                    continue;
                }
                in_prompts = false;
            }
            let Some((key, value)) = line.split_once(": ") else {
                continue;
            };
            let value = Some(value.trim().to_string());
            match key {
                SESSION_KEY => provenance.session_id = value,
                AGENT_KEY => provenance.agent = value,
                MODEL_KEY => provenance.model = value,
                _ => {}
            }
        }
        provenance
    }

    pub fn is_attributed(&self) -> bool {
        self.session_id.is_some()
    }
}

#[cfg(test)]
mod tests;
