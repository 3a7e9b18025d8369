use crate::message::Composer;
use crate::prompts::PromptFilter;
use crate::session::MetadataExtractor;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const FILENAME: &str = ".claudecommit.toml";

const DEFAULT_TRIGGER_PHRASES: &[&str] = &[
    "/commit",
    "commit",
    "commit this",
    "commit it",
    "commit changes",
    "commit the changes",
    "please commit",
    "commit please",
    "make a commit",
];

const DEFAULT_TEMPLATE: &str = r#"<brief summary under {{ summary_max }} chars>

User prompts:
- "<first user prompt>"
- "<add more as needed>"

AI-Session-ID: {{ session_id }}
AI Agent: {{ agent }}
Model: {{ model }}"#;

/// Template shown by `format-message`: either an inline Jinja2 string or a
/// path to a template file (relative to the repository root).
///
/// ```toml
/// [message_template]
/// inline = "{{ summary_max }} chars max"
///
/// # or
///
/// [message_template]
/// file = ".github/commit-template.j2"
/// ```
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum MessageTemplate {
    Inline(String),
    File(String),
}

impl Default for MessageTemplate {
    fn default() -> Self {
        MessageTemplate::Inline(DEFAULT_TEMPLATE.into())
    }
}

/// Settings read from `.claudecommit.toml` at the repository root.
#[derive(Debug, Deserialize)]
pub struct Preferences {
    /// Prompts that only invoke the commit workflow. Never attributed.
    #[serde(default = "default_trigger_phrases")]
    pub trigger_phrases: Vec<String>,

    #[serde(default = "default_summary_max_chars")]
    pub summary_max_chars: usize,

    #[serde(default = "default_prompt_max_chars")]
    pub prompt_max_chars: usize,

    /// Prompts scoring below this are marked ambiguous.
    #[serde(default = "default_ambiguity_threshold")]
    pub ambiguity_threshold: f32,

    /// Used when no transcript record names the agent.
    #[serde(default = "default_agent_name")]
    pub agent_name: String,

    /// Address shown in the `AI Agent` trailer.
    #[serde(default = "default_contact")]
    pub contact: String,

    /// Overrides the host's `projects` directory.
    #[serde(default)]
    pub transcripts_dir: Option<PathBuf>,

    #[serde(default)]
    pub message_template: MessageTemplate,
}

fn default_trigger_phrases() -> Vec<String> {
    DEFAULT_TRIGGER_PHRASES.iter().map(|s| s.to_string()).collect()
}

fn default_summary_max_chars() -> usize {
    50
}

fn default_prompt_max_chars() -> usize {
    200
}

fn default_ambiguity_threshold() -> f32 {
    0.5
}

fn default_agent_name() -> String {
    "Claude Code".into()
}

fn default_contact() -> String {
    "noreply@anthropic.com".into()
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            trigger_phrases: default_trigger_phrases(),
            summary_max_chars: default_summary_max_chars(),
            prompt_max_chars: default_prompt_max_chars(),
            ambiguity_threshold: default_ambiguity_threshold(),
            agent_name: default_agent_name(),
            contact: default_contact(),
            transcripts_dir: None,
            message_template: MessageTemplate::default(),
        }
    }
}

impl Preferences {
    /// Load `.claudecommit.toml` from the repository root.
    ///
    /// A missing file yields the defaults and is not created. Missing keys
    /// in an existing file are filled in with defaults via serde.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(FILENAME);
        match fs::read_to_string(&path) {
            Ok(contents) => toml::from_str(&contents)
                .with_context(|| format!("parsing {}", path.display())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }

    pub fn composer(&self) -> Composer {
        Composer::new(self.summary_max_chars, self.prompt_max_chars, &self.contact)
    }

    pub fn prompt_filter(&self) -> PromptFilter {
        PromptFilter::new(&self.trigger_phrases, self.ambiguity_threshold)
    }

    pub fn extractor(&self) -> MetadataExtractor {
        MetadataExtractor::new(&self.agent_name)
    }

    /// Resolve the message template to a string.
    pub fn load_template(&self, root: &Path) -> Result<String> {
        match &self.message_template {
            MessageTemplate::Inline(s) => Ok(s.clone()),
            MessageTemplate::File(filename) => {
                let path = root.join(filename);
                fs::read_to_string(&path)
                    .with_context(|| format!("reading template {}", path.display()))
            }
        }
    }
}
