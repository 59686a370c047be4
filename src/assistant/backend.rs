//! Assistant backend contract and wire types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Errors from the assistant backend.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    #[error("HTTP request failed: {0}")]
    Http(String),
    #[error("API returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("invalid API key: {0}")]
    InvalidApiKey(String),
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),
}

/// Status of an assistant run.
///
/// `completed`, `failed`, `cancelled` and `expired` are terminal; anything
/// the backend reports outside the known vocabulary lands in `Unknown` and
/// is treated as non-terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    Cancelling,
    Completed,
    Failed,
    Cancelled,
    Expired,
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    /// Whether no further status transition will occur.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Cancelled | Self::Expired
        )
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::Cancelling => "cancelling",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
            Self::Unknown => "unknown",
        };
        write!(f, "{name}")
    }
}

/// Error detail attached to a terminally failed run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Snapshot of one assistant run, fetched per poll. Transient; never
/// persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    pub id: String,
    pub status: RunStatus,
    #[serde(default)]
    pub last_error: Option<RunError>,
}

impl RunState {
    /// Human-readable error detail, if the backend reported one.
    pub fn error_detail(&self) -> Option<String> {
        let err = self.last_error.as_ref()?;
        match (&err.code, &err.message) {
            (Some(code), Some(message)) => Some(format!("{code}: {message}")),
            (None, Some(message)) => Some(message.clone()),
            (Some(code), None) => Some(code.clone()),
            (None, None) => None,
        }
    }
}

/// Role of a thread message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    #[serde(other)]
    Other,
}

/// One content block of a thread message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageContent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<MessageText>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageText {
    pub value: String,
}

/// A message in an assistant thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub id: String,
    pub role: MessageRole,
    #[serde(default)]
    pub content: Vec<MessageContent>,
}

impl ThreadMessage {
    /// First text payload of the message, if any.
    pub fn first_text(&self) -> Option<&str> {
        self.content
            .iter()
            .find_map(|block| block.text.as_ref())
            .map(|text| text.value.as_str())
    }

    /// Build an assistant-authored text message (used by simulated
    /// backends in tests).
    pub fn assistant_text(id: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: MessageRole::Assistant,
            content: vec![MessageContent {
                kind: "text".to_string(),
                text: Some(MessageText {
                    value: value.into(),
                }),
            }],
        }
    }
}

/// Operations the relay needs from a conversational assistant backend.
///
/// `list_messages` must return messages newest first, matching the
/// Assistants API default ordering.
#[async_trait]
pub trait AssistantBackend: Send + Sync {
    /// Create a new conversation thread and return its identifier.
    async fn create_thread(&self) -> Result<String, BackendError>;

    /// Append a user message to a thread.
    async fn add_message(&self, thread_id: &str, text: &str) -> Result<(), BackendError>;

    /// Start a run against a thread and return the run identifier.
    async fn start_run(&self, thread_id: &str) -> Result<String, BackendError>;

    /// Fetch the current state of a run.
    async fn run_status(&self, thread_id: &str, run_id: &str) -> Result<RunState, BackendError>;

    /// List the messages of a thread, newest first.
    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_status_deserializes_snake_case() {
        let status: RunStatus = serde_json::from_str("\"in_progress\"").unwrap();
        assert_eq!(status, RunStatus::InProgress);
        let status: RunStatus = serde_json::from_str("\"completed\"").unwrap();
        assert_eq!(status, RunStatus::Completed);
    }

    #[test]
    fn test_run_status_unknown_catch_all() {
        let status: RunStatus = serde_json::from_str("\"requires_action\"").unwrap();
        assert_eq!(status, RunStatus::Unknown);
        assert!(!status.is_terminal());
    }

    #[test]
    fn test_terminal_states() {
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::Cancelled.is_terminal());
        assert!(RunStatus::Expired.is_terminal());
        assert!(!RunStatus::Queued.is_terminal());
        assert!(!RunStatus::InProgress.is_terminal());
        assert!(!RunStatus::Cancelling.is_terminal());
    }

    #[test]
    fn test_run_state_error_detail() {
        let run: RunState = serde_json::from_str(
            r#"{
                "id": "run_1",
                "status": "failed",
                "last_error": { "code": "rate_limit_exceeded", "message": "slow down" }
            }"#,
        )
        .unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(
            run.error_detail().unwrap(),
            "rate_limit_exceeded: slow down"
        );
    }

    #[test]
    fn test_run_state_no_error_detail() {
        let run: RunState = serde_json::from_str(r#"{ "id": "run_1", "status": "queued" }"#).unwrap();
        assert!(run.error_detail().is_none());
    }

    #[test]
    fn test_thread_message_first_text() {
        let message: ThreadMessage = serde_json::from_str(
            r#"{
                "id": "msg_1",
                "role": "assistant",
                "content": [
                    { "type": "image_file" },
                    { "type": "text", "text": { "value": "hello" } }
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(message.first_text(), Some("hello"));
    }

    #[test]
    fn test_thread_message_no_text() {
        let message = ThreadMessage {
            id: "msg_2".to_string(),
            role: MessageRole::Assistant,
            content: vec![],
        };
        assert!(message.first_text().is_none());
    }

    #[test]
    fn test_message_role_other_catch_all() {
        let role: MessageRole = serde_json::from_str("\"system\"").unwrap();
        assert_eq!(role, MessageRole::Other);
    }
}
