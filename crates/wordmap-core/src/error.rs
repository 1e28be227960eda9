//! Error types for the chat core
//!
//! Component errors (`StorageError`, `ExtractionError`, `ProviderError`) are raised by
//! the document store, the PDF extractor and the LLM client. `ChatError` is what the
//! session surfaces to a renderer; it serializes to `{"code": "...", "message": "..."}`.

use serde::ser::SerializeStruct;
use serde::Serialize;

/// Failures while persisting, reading or deleting uploaded documents
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Invalid file name: {0:?}")]
    InvalidName(String),
    #[error("Storage I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to delete {failed} of {total} documents")]
    Partial { failed: usize, total: usize },
}

impl StorageError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Failures while turning a stored PDF into text
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("Failed to parse PDF {filename}: {message}")]
    Parse { filename: String, message: String },
    #[error("Failed to extract page {page} of {filename}: {message}")]
    Page {
        filename: String,
        page: u32,
        message: String,
    },
    #[error("Extraction task failed: {0}")]
    Join(String),
}

/// Failures talking to the chat-completion endpoint
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Missing API key: environment variable {0} is not set")]
    MissingCredential(String),
    #[error("Authentication failed ({status}): {message}")]
    Auth { status: u16, message: String },
    #[error("Rate limited by provider: {0}")]
    RateLimited(String),
    #[error("Provider request timed out")]
    Timeout,
    #[error("Network error: {0}")]
    Network(String),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::MalformedResponse(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Errors surfaced by a chat session to its renderer
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("A question is already being answered")]
    Busy,
    #[error("Question is empty")]
    EmptyQuestion,
    #[error("Invalid model id: {0:?}")]
    InvalidModel(String),
    #[error("Unknown prompt template: {0}")]
    UnknownTemplate(String),
    #[error("Turn was cancelled")]
    Cancelled,
    #[error("Session not found: {0}")]
    SessionNotFound(String),
}

impl ChatError {
    /// Stable snake_case code for renderer-side matching
    pub fn code(&self) -> &'static str {
        match self {
            Self::Storage(_) => "storage_error",
            Self::Extraction(_) => "extraction_error",
            Self::Provider(ProviderError::MissingCredential(_) | ProviderError::Auth { .. }) => {
                "provider_auth"
            }
            Self::Provider(ProviderError::RateLimited(_)) => "provider_rate_limited",
            Self::Provider(ProviderError::Timeout) => "provider_timeout",
            Self::Provider(_) => "provider_error",
            Self::Busy => "busy",
            Self::EmptyQuestion => "empty_question",
            Self::InvalidModel(_) => "invalid_model",
            Self::UnknownTemplate(_) => "unknown_template",
            Self::Cancelled => "cancelled",
            Self::SessionNotFound(_) => "session_not_found",
        }
    }

    /// Snapshot of this error for `SessionState`
    pub fn to_info(&self) -> ErrorInfo {
        ErrorInfo {
            code: self.code().to_string(),
            message: self.to_string(),
        }
    }
}

impl Serialize for ChatError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut s = serializer.serialize_struct("ChatError", 2)?;
        s.serialize_field("code", self.code())?;
        s.serialize_field("message", &self.to_string())?;
        s.end()
    }
}

/// Cloneable error record kept in session snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, serde::Deserialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

pub type ChatResult<T> = Result<T, ChatError>;
