//! Types exchanged with the remote processing service.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier the remote service assigns to a submitted job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct RemoteJobId(pub String);

impl RemoteJobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemoteJobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which success marker the remote service reported.
///
/// The service has been observed to use both words for the same terminal
/// success state. Both are accepted; the one seen is kept so it can be
/// logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SuccessAlias {
    Completed,
    Finished,
}

impl SuccessAlias {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuccessAlias::Completed => "COMPLETED",
            SuccessAlias::Finished => "FINISHED",
        }
    }
}

/// Classified state of a remote job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteState {
    /// Terminal success
    Succeeded(SuccessAlias),
    /// Terminal failure
    Failed,
    /// Anything else (e.g. `ONGOING`, `QUEUEING`); holds the raw value
    Running(String),
}

impl RemoteState {
    /// Classify a raw status string. Matching is case-insensitive.
    pub fn parse(raw: &str) -> Self {
        let normalized = raw.trim().to_ascii_uppercase();
        match normalized.as_str() {
            "COMPLETED" => RemoteState::Succeeded(SuccessAlias::Completed),
            "FINISHED" => RemoteState::Succeeded(SuccessAlias::Finished),
            "FAILED" => RemoteState::Failed,
            _ => RemoteState::Running(raw.trim().to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RemoteState::Running(_))
    }
}

/// One response of the remote status endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollResponse {
    /// Raw status string as returned by the service
    pub status: String,
    /// Result payload (meaningful once the job succeeded)
    #[serde(default)]
    pub result: serde_json::Value,
    /// Error message reported for a failed job
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Error embedded in an otherwise successful transport response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_error: Option<String>,
}

impl PollResponse {
    /// Create a response carrying only a status.
    pub fn status(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            result: serde_json::Value::Null,
            error_message: None,
            api_error: None,
        }
    }

    pub fn with_result(mut self, result: serde_json::Value) -> Self {
        self.result = result;
        self
    }

    pub fn with_error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    /// Response whose envelope reports an error code.
    pub fn api_error(message: impl Into<String>) -> Self {
        Self {
            status: String::new(),
            result: serde_json::Value::Null,
            error_message: None,
            api_error: Some(message.into()),
        }
    }

    pub fn state(&self) -> RemoteState {
        RemoteState::parse(&self.status)
    }

    pub fn is_api_error(&self) -> bool {
        self.api_error.is_some()
    }
}

/// Feature switches sent with each remote job submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SubmitOptions {
    /// Source language, `auto` for detection
    pub source_language: String,
    pub enable_summary: bool,
    pub enable_timestamps: bool,
    /// Speaker separation
    pub enable_diarization: bool,
    pub speaker_count: u32,
    /// Target languages; translation is off when empty
    pub translation_targets: Vec<String>,
    pub enable_chapters: bool,
    pub enable_meeting_notes: bool,
    pub enable_slide_extraction: bool,
    pub enable_text_polish: bool,
}

impl Default for SubmitOptions {
    fn default() -> Self {
        Self {
            source_language: "auto".to_string(),
            enable_summary: true,
            enable_timestamps: true,
            enable_diarization: true,
            speaker_count: 2,
            translation_targets: Vec::new(),
            enable_chapters: true,
            enable_meeting_notes: true,
            enable_slide_extraction: false,
            enable_text_polish: true,
        }
    }
}

impl SubmitOptions {
    pub fn translation_enabled(&self) -> bool {
        !self.translation_targets.is_empty()
    }
}
