use crate::error::CommitError;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Model name the host writes on locally generated (non-model) replies.
const SYNTHETIC_MODEL: &str = "<synthetic>";

// ===================================================================
// Turns: the conversation as the prompt filter sees it
// ===================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Human,
    Agent,
    Tool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffectKind {
    Edit,
    Write,
    /// Shell command. Its effect on files is unknown.
    Command,
    /// Path listed in a record's `tool_side_effects` field.
    Recorded,
}

impl SideEffectKind {
    /// Whether this kind of action rewrites files on disk.
    pub fn mutates(self) -> bool {
        !matches!(self, Self::Command)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SideEffect {
    pub kind: SideEffectKind,
    pub path: Option<PathBuf>,
}

impl SideEffect {
    pub fn new(kind: SideEffectKind, path: Option<PathBuf>) -> Self {
        Self { kind, path }
    }
}

/// One message of the conversation, attributed to the human, the agent or
/// a tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    pub side_effects: Vec<SideEffect>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl Turn {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            side_effects: Vec::new(),
            timestamp: None,
        }
    }

    pub fn with_side_effect(mut self, effect: SideEffect) -> Self {
        self.side_effects.push(effect);
        self
    }

    pub fn at(mut self, timestamp: Option<DateTime<Utc>>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

// ===================================================================
// Record: one JSONL line, read field by field
// ===================================================================

/// A single transcript line.
///
/// The on-disk schema belongs to the host runtime and changes between
/// versions, so nothing here is required: every accessor looks the field up
/// in the raw JSON and yields `None` when it is missing or has an
/// unexpected type.
#[derive(Debug, Clone)]
pub struct Record {
    value: Value,
}

impl Record {
    pub fn new(value: Value) -> Self {
        Self { value }
    }

    /// First non-empty string among `keys` at the top level.
    fn str_field(&self, keys: &[&str]) -> Option<&str> {
        keys.iter()
            .find_map(|k| self.value.get(*k).and_then(Value::as_str))
            .filter(|s| !s.is_empty())
    }

    fn message(&self) -> Option<&Value> {
        self.value.get("message").filter(|m| m.is_object())
    }

    pub fn session_id(&self) -> Option<&str> {
        self.str_field(&["sessionId", "session_id"])
    }

    pub fn agent_name(&self) -> Option<&str> {
        self.str_field(&["agentName", "agent_name"])
    }

    pub fn agent_version(&self) -> Option<&str> {
        self.str_field(&["agentVersion", "agent_version", "version"])
    }

    pub fn model_id(&self) -> Option<&str> {
        self.str_field(&["modelId", "model_id", "model"])
            .or_else(|| {
                self.message()
                    .and_then(|m| m.get("model"))
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
            })
            .filter(|m| *m != SYNTHETIC_MODEL)
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        let raw = self.str_field(&["timestamp"])?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|ts| ts.with_timezone(&Utc))
    }

    /// `message.content` for host-runtime records, top-level `content`
    /// otherwise.
    pub fn content(&self) -> Option<&Value> {
        self.message()
            .and_then(|m| m.get("content"))
            .or_else(|| self.value.get("content"))
            .filter(|c| !c.is_null())
    }

    pub fn role(&self) -> Option<Role> {
        if let Some(role) = self.str_field(&["role"]) {
            return role_from_name(role);
        }
        match self.str_field(&["type"]) {
            Some("user") if self.carries_tool_result() => Some(Role::Tool),
            Some("user") => Some(Role::Human),
            Some("assistant") => Some(Role::Agent),
            Some(_) => None,
            None => self
                .message()
                .and_then(|m| m.get("role"))
                .and_then(Value::as_str)
                .and_then(role_from_name),
        }
    }

    pub fn has_session_fields(&self) -> bool {
        self.session_id().is_some()
    }

    pub fn has_role(&self) -> bool {
        self.role().is_some()
    }

    pub fn has_content(&self) -> bool {
        self.content().is_some()
    }

    fn flag(&self, key: &str) -> bool {
        self.value.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    fn carries_tool_result(&self) -> bool {
        self.value.get("toolUseResult").is_some()
            || content_blocks(self.content()).any(|b| block_type(b) == Some("tool_result"))
    }

    /// Prompt text typed by the human, or `None` for records the runtime
    /// injected on its own (meta records, sidechains, internal users,
    /// interruption markers, system reminders).
    fn human_text(&self) -> Option<String> {
        if self.flag("isMeta") || self.flag("isSidechain") {
            return None;
        }
        if self
            .str_field(&["userType"])
            .is_some_and(|t| t != "external")
        {
            return None;
        }
        match self.content()? {
            Value::String(s) => prompt_from_markup(s),
            Value::Array(blocks) => {
                let texts: Vec<&str> = blocks
                    .iter()
                    .filter(|b| block_type(b) == Some("text"))
                    .filter_map(|b| b.get("text").and_then(Value::as_str))
                    .filter(|t| !t.starts_with('#') && !is_runtime_text(t))
                    .collect();
                let joined = texts.join("\n");
                let trimmed = joined.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            _ => None,
        }
    }

    /// Text blocks of an agent record, joined.
    fn agent_text(&self) -> String {
        match self.content() {
            Some(Value::String(s)) => s.trim().to_string(),
            content => content_blocks(content)
                .filter(|b| block_type(b) == Some("text"))
                .filter_map(|b| b.get("text").and_then(Value::as_str))
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join("\n\n"),
        }
    }

    /// Side effects from `tool_use` blocks, tool results and any explicit
    /// `tool_side_effects` list.
    fn side_effects(&self) -> Vec<SideEffect> {
        let mut effects: Vec<SideEffect> = content_blocks(self.content())
            .filter(|b| block_type(b) == Some("tool_use"))
            .filter_map(tool_use_effect)
            .collect();

        if let Some(result) = self.value.get("toolUseResult") {
            if let Some(path) = result.get("filePath").and_then(Value::as_str) {
                let kind = match result.get("type").and_then(Value::as_str) {
                    Some("create") | Some("update") => Some(SideEffectKind::Write),
                    _ if result.get("oldString").is_some() => Some(SideEffectKind::Edit),
                    _ => None,
                };
                if let Some(kind) = kind {
                    effects.push(SideEffect::new(kind, Some(PathBuf::from(path))));
                }
            }
        }

        let recorded = self
            .value
            .get("tool_side_effects")
            .or_else(|| self.value.get("toolSideEffects"));
        if let Some(Value::Array(items)) = recorded {
            for item in items {
                let path = item
                    .as_str()
                    .or_else(|| item.get("path").and_then(Value::as_str));
                effects.push(SideEffect::new(
                    SideEffectKind::Recorded,
                    path.map(PathBuf::from),
                ));
            }
        }

        effects
    }

    /// Text printed by tools: `toolUseResult` stdout and the string content
    /// of `tool_result` blocks.
    pub fn tool_output(&self) -> Vec<&str> {
        let mut output = Vec::new();
        match self.value.get("toolUseResult") {
            Some(Value::String(s)) => output.push(s.as_str()),
            Some(result) => output.extend(result.get("stdout").and_then(Value::as_str)),
            None => {}
        }
        let results = content_blocks(self.content()).filter(|b| block_type(b) == Some("tool_result"));
        for block in results {
            match block.get("content") {
                Some(Value::String(s)) => output.push(s.as_str()),
                Some(Value::Array(parts)) => output.extend(
                    parts
                        .iter()
                        .filter(|p| block_type(p) == Some("text"))
                        .filter_map(|p| p.get("text").and_then(Value::as_str)),
                ),
                _ => {}
            }
        }
        output
    }

    /// Reconstruct the conversational turn this record represents, if any.
    pub fn turn(&self) -> Option<Turn> {
        let turn = match self.role()? {
            Role::Human => Turn::new(Role::Human, self.human_text()?),
            Role::Agent => Turn::new(Role::Agent, self.agent_text()),
            Role::Tool => Turn::new(Role::Tool, String::new()),
        };
        let effects = self.side_effects();
        Some(
            effects
                .into_iter()
                .fold(turn, Turn::with_side_effect)
                .at(self.timestamp()),
        )
    }
}

fn role_from_name(name: &str) -> Option<Role> {
    match name {
        "human" | "user" => Some(Role::Human),
        "agent" | "assistant" => Some(Role::Agent),
        "tool" => Some(Role::Tool),
        _ => None,
    }
}

fn block_type(block: &Value) -> Option<&str> {
    block.get("type").and_then(Value::as_str)
}

fn content_blocks(content: Option<&Value>) -> impl Iterator<Item = &Value> {
    content
        .and_then(Value::as_array)
        .map(|a| a.as_slice())
        .unwrap_or(&[])
        .iter()
}

/// Classify a `tool_use` block by the tool it invokes.
fn tool_use_effect(block: &Value) -> Option<SideEffect> {
    let name = block.get("name").and_then(Value::as_str)?;
    let input = block.get("input").unwrap_or(&Value::Null);
    let path = |field: &str| input[field].as_str().map(PathBuf::from);
    match name {
        "Edit" | "MultiEdit" => Some(SideEffect::new(SideEffectKind::Edit, path("file_path"))),
        "NotebookEdit" => Some(SideEffect::new(SideEffectKind::Edit, path("notebook_path"))),
        "Write" => Some(SideEffect::new(SideEffectKind::Write, path("file_path"))),
        "Bash" => Some(SideEffect::new(SideEffectKind::Command, None)),
        _ => None,
    }
}

/// Text between `<tag>` and `</tag>`, if both are present.
fn tag_body<'a>(text: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = text.find(&open)? + open.len();
    let end = text[start..].find(&close)? + start;
    Some(text[start..end].trim())
}

/// Turn a plain-string user message into prompt text. Slash commands are
/// stored as markup and come back as `/name args`.
fn prompt_from_markup(text: &str) -> Option<String> {
    let text = text.trim();
    if let Some(name) = tag_body(text, "command-name") {
        let args = tag_body(text, "command-args").unwrap_or("");
        return Some(if args.is_empty() {
            name.to_string()
        } else {
            format!("{name} {args}")
        });
    }
    if text.is_empty() || is_runtime_text(text) {
        return None;
    }
    Some(text.to_string())
}

/// Markup and interruption notices the runtime writes into user records.
fn is_runtime_text(text: &str) -> bool {
    let text = text.trim_start();
    text.starts_with('<') || text.starts_with("[Request interrupted")
}

// ===================================================================
// Transcript: the parsed JSONL file
// ===================================================================

/// A parsed transcript: every line that was a JSON object, in file order.
pub struct Transcript {
    records: Vec<Record>,
}

impl Transcript {
    /// Parse a JSONL transcript string. Returns the transcript and any
    /// lines that failed to parse (with 1-based line number and error).
    pub fn parse(contents: &str) -> (Self, Vec<(usize, String)>) {
        let mut records = Vec::new();
        let mut errors = Vec::new();

        for (i, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(line) {
                Ok(val) if val.is_object() => records.push(Record::new(val)),
                Ok(_) => errors.push((i + 1, "expected a JSON object".to_string())),
                Err(e) => errors.push((i + 1, format!("{e}"))),
            }
        }

        (Self { records }, errors)
    }

    /// Read and parse a transcript file. Unparseable lines are logged and
    /// skipped; an unreadable file is a malformed transcript.
    pub fn read(path: &Path) -> Result<Self, CommitError> {
        let contents = fs::read_to_string(path).map_err(|e| CommitError::MalformedTranscript {
            path: path.to_path_buf(),
            reason: format!("reading transcript: {e}"),
        })?;
        let (transcript, errors) = Self::parse(&contents);
        for (line, err) in &errors {
            warn!(path = %path.display(), line, "skipping transcript line: {err}");
        }
        let records = transcript.records();
        debug!(
            path = %path.display(),
            records = records.len(),
            with_session = records.iter().filter(|r| r.has_session_fields()).count(),
            conversational = records.iter().filter(|r| r.has_role() && r.has_content()).count(),
            "read transcript"
        );
        Ok(transcript)
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// The conversation in file order.
    pub fn turns(&self) -> Vec<Turn> {
        self.records.iter().filter_map(Record::turn).collect()
    }
}
