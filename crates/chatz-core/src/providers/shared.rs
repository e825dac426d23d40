//! Provider-agnostic types shared by the HTTP client and the stream assembler.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Standard User-Agent header for chatz API requests.
pub const USER_AGENT: &str = concat!("chatz/", env!("CARGO_PKG_VERSION"));

/// Categories of provider errors for consistent error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    /// Request could not be sent, or the connection dropped before any delta arrived
    Transport,
    /// Connection timeout or request timeout
    Timeout,
    /// HTTP status error (4xx, 5xx)
    HttpStatus,
    /// Failed to parse a non-streaming response body
    Parse,
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderErrorKind::Transport => write!(f, "transport"),
            ProviderErrorKind::Timeout => write!(f, "timeout"),
            ProviderErrorKind::HttpStatus => write!(f, "http_status"),
            ProviderErrorKind::Parse => write!(f, "parse"),
        }
    }
}

/// Structured error from the provider with kind and details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderError {
    /// Error category
    pub kind: ProviderErrorKind,
    /// One-line summary suitable for display
    pub message: String,
    /// Optional additional details (e.g., raw error body)
    pub details: Option<String>,
    /// HTTP status, when the server answered
    pub status: Option<u16>,
}

impl ProviderError {
    /// Creates a new provider error.
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
            status: None,
        }
    }

    /// Creates an HTTP status error, keeping the response body as diagnostic text.
    pub fn http_status(status: u16, body: &str) -> Self {
        let body = body.trim();
        if body.is_empty() {
            return Self {
                kind: ProviderErrorKind::HttpStatus,
                message: format!("API Error: {status}"),
                details: None,
                status: Some(status),
            };
        }

        // Prefer the provider's own message when the body is an OpenAI-style error object
        if let Ok(json) = serde_json::from_str::<Value>(body)
            && let Some(msg) = json
                .get("error")
                .and_then(|error| error.get("message"))
                .and_then(Value::as_str)
        {
            return Self {
                kind: ProviderErrorKind::HttpStatus,
                message: format!("API Error: {status} - {msg}"),
                details: Some(body.to_string()),
                status: Some(status),
            };
        }

        Self {
            kind: ProviderErrorKind::HttpStatus,
            message: format!("API Error: {status} - {body}"),
            details: Some(body.to_string()),
            status: Some(status),
        }
    }

    /// Creates a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Transport, message)
    }

    /// Creates a timeout error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Timeout, message)
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ProviderError {}

/// Result type for provider operations.
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Maps a reqwest failure onto the provider error taxonomy.
pub fn classify_reqwest_error(e: &reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::timeout(format!("Network error: request timed out: {e}"))
    } else if e.is_connect() {
        ProviderError::transport(format!("Network error: connection failed: {e}"))
    } else {
        ProviderError::transport(format!("Network error: {e}"))
    }
}
