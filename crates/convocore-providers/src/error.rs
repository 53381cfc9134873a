use thiserror::Error;

/// Shared failure type across every provider sub-interface. Each
/// variant names the remote collaborator that failed, matching the
/// `*-unavailable` kinds in `CoreError` so callers convert with one `?`.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("llm unavailable: {0}")]
    LlmUnavailable(String),

    #[error("tts unavailable: {0}")]
    TtsUnavailable(String),

    #[error("asr unavailable: {0}")]
    AsrUnavailable(String),

    #[error("mcp unavailable: {0}")]
    McpUnavailable(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("timed out after {0}s")]
    Timeout(u64),
}

impl From<ProviderError> for convocore_core::CoreError {
    fn from(err: ProviderError) -> Self {
        use convocore_core::CoreError;
        match err {
            ProviderError::Http(e) => CoreError::LlmUnavailable(e.to_string()),
            ProviderError::Api { status, message } => {
                CoreError::LlmUnavailable(format!("{status}: {message}"))
            }
            ProviderError::Parse(m) => CoreError::LlmUnavailable(m),
            ProviderError::LlmUnavailable(m) => CoreError::LlmUnavailable(m),
            ProviderError::TtsUnavailable(m) => CoreError::TtsUnavailable(m),
            ProviderError::AsrUnavailable(m) => CoreError::AsrUnavailable(m),
            ProviderError::McpUnavailable(m) => CoreError::McpUnavailable(m),
            ProviderError::Cancelled => CoreError::Cancelled,
            ProviderError::Timeout(ms) => CoreError::Timeout { ms: ms * 1000 },
        }
    }
}

pub type Result<T> = std::result::Result<T, ProviderError>;
