//! Error types for Tern.

use thiserror::Error;

/// Primary error type for all Tern operations.
#[derive(Error, Debug)]
pub enum TernError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Rate limited: retry after {retry_after_ms:?}ms")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Tool execution error: {tool_name}: {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("interrupted")]
    Interrupted,

    #[error("failed after {retries} retries: {source}")]
    RetriesExhausted {
        retries: u32,
        #[source]
        source: Box<TernError>,
    },
}

impl TernError {
    /// Create an API error from a status code and message.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create a tool execution error.
    pub fn tool(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool_name: tool_name.into(),
            message: message.into(),
        }
    }

    /// Whether this error is a user-initiated interruption rather than a
    /// hard failure. Retry exhaustion preserves the interruption flag of
    /// the wrapped error.
    pub fn is_interruption(&self) -> bool {
        match self {
            Self::Interrupted => true,
            Self::RetriesExhausted { source, .. } => source.is_interruption(),
            _ => false,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, TernError>;
