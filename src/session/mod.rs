use crate::error::CommitError;
use crate::locator::TranscriptHandle;
use crate::transcript::Transcript;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tracing::debug;

/// Reported when no record names the agent version or the model.
pub const UNKNOWN: &str = "unknown";

/// The AI session a transcript records. Discovered, never created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub session_id: String,
    pub project_path: PathBuf,
    pub transcript_path: PathBuf,
    pub agent_name: String,
    pub agent_version: String,
    pub model_id: String,
}

impl Session {
    /// `"{agent_name} {agent_version} <{contact}>"`
    pub fn agent_line(&self, contact: &str) -> String {
        format!("{} {} <{contact}>", self.agent_name, self.agent_version)
    }
}

/// The most recent value seen for one field.
#[derive(Default)]
struct Latest<'a> {
    value: Option<&'a str>,
    at: Option<DateTime<Utc>>,
}

impl<'a> Latest<'a> {
    /// Take `value` unless it is stamped strictly earlier than the current
    /// one. Records without a timestamp fall back to file order.
    fn offer(&mut self, value: Option<&'a str>, at: Option<DateTime<Utc>>) {
        let Some(value) = value else { return };
        let newer = match (at, self.at) {
            (Some(new), Some(current)) => new >= current,
            _ => true,
        };
        if newer {
            self.value = Some(value);
            self.at = at.or(self.at);
        }
    }
}

/// Recovers session id, agent name/version and model from a transcript.
pub struct MetadataExtractor {
    default_agent_name: String,
}

impl MetadataExtractor {
    pub fn new(default_agent_name: impl Into<String>) -> Self {
        Self {
            default_agent_name: default_agent_name.into(),
        }
    }

    /// Read the transcript behind `handle` and extract its session.
    pub fn extract(&self, handle: &TranscriptHandle) -> Result<Session, CommitError> {
        let transcript = Transcript::read(&handle.path)?;
        self.extract_from(handle, &transcript)
    }

    /// Extract from an already-parsed transcript. Every field takes the
    /// value of the most recent record carrying it, so a mid-session model
    /// switch reports the model in use now.
    pub fn extract_from(
        &self,
        handle: &TranscriptHandle,
        transcript: &Transcript,
    ) -> Result<Session, CommitError> {
        let mut session_id = Latest::default();
        let mut agent_name = Latest::default();
        let mut agent_version = Latest::default();
        let mut model_id = Latest::default();

        for record in transcript.records() {
            let at = record.timestamp();
            session_id.offer(record.session_id(), at);
            agent_name.offer(record.agent_name(), at);
            agent_version.offer(record.agent_version(), at);
            model_id.offer(record.model_id(), at);
        }

        let session_id = session_id
            .value
            .ok_or_else(|| CommitError::MalformedTranscript {
                path: handle.path.clone(),
                reason: format!(
                    "none of its {} records carries a session id",
                    transcript.records().len()
                ),
            })?;

        let session = Session {
            session_id: session_id.to_string(),
            project_path: handle.project_path.clone(),
            transcript_path: handle.path.clone(),
            agent_name: agent_name
                .value
                .unwrap_or(&self.default_agent_name)
                .to_string(),
            agent_version: agent_version.value.unwrap_or(UNKNOWN).to_string(),
            model_id: model_id.value.unwrap_or(UNKNOWN).to_string(),
        };
        debug!(
            session = %session.session_id,
            model = %session.model_id,
            version = %session.agent_version,
            "extracted session metadata"
        );
        Ok(session)
    }
}
