use thiserror::Error;

/// The process-wide error taxonomy. Each variant is one behavior class;
/// `.code()` gives the short string sent to clients in `error`/`media_error`
/// wire events.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("LLM provider unavailable: {0}")]
    LlmUnavailable(String),

    #[error("TTS provider unavailable: {0}")]
    TtsUnavailable(String),

    #[error("ASR provider unavailable: {0}")]
    AsrUnavailable(String),

    #[error("MCP server unavailable: {0}")]
    McpUnavailable(String),

    /// Recorded as a `tool` role message, not surfaced as a channel-closing error.
    #[error("tool error: {0}")]
    ToolError(String),

    #[error("cancelled")]
    Cancelled,

    #[error("timed out after {ms}ms")]
    Timeout { ms: u64 },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Short wire code, stable across releases — clients may match on it.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Unauthenticated(_) => "UNAUTHENTICATED",
            CoreError::NotFound(_) => "NOT_FOUND",
            CoreError::Conflict(_) => "CONFLICT",
            CoreError::StorageUnavailable(_) => "STORAGE_UNAVAILABLE",
            CoreError::LlmUnavailable(_) => "LLM_UNAVAILABLE",
            CoreError::TtsUnavailable(_) => "TTS_UNAVAILABLE",
            CoreError::AsrUnavailable(_) => "ASR_UNAVAILABLE",
            CoreError::McpUnavailable(_) => "MCP_UNAVAILABLE",
            CoreError::ToolError(_) => "TOOL_ERROR",
            CoreError::Cancelled => "CANCELLED",
            CoreError::Timeout { .. } => "TIMEOUT",
            CoreError::Config(_) => "CONFIG_ERROR",
            CoreError::Serialization(_) => "SERIALIZATION_ERROR",
            CoreError::Io(_) => "IO_ERROR",
            CoreError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the kind is eligible for the one-retry-with-backoff policy.
    /// Only storage hiccups get this; everything else is surfaced immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::StorageUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_unavailable_is_retryable_only() {
        assert!(CoreError::StorageUnavailable("x".into()).is_retryable());
        assert!(!CoreError::NotFound("x".into()).is_retryable());
        assert!(!CoreError::Cancelled.is_retryable());
    }

    #[test]
    fn codes_are_stable_strings() {
        assert_eq!(CoreError::Unauthenticated("x".into()).code(), "UNAUTHENTICATED");
        assert_eq!(CoreError::ToolError("x".into()).code(), "TOOL_ERROR");
    }
}
