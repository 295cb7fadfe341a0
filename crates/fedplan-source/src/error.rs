use thiserror::Error;

pub type SourceResult<T> = std::result::Result<T, SourceError>;

/// Failures talking to a remote source. `Clone` so a failed shared result can
/// be replayed to every consumer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("transport error from '{endpoint}': {message}")]
    Transport { endpoint: String, message: String },

    #[error("'{endpoint}' is throttling requests")]
    Throttled { endpoint: String },

    #[error("'{endpoint}' is temporarily unavailable")]
    Unavailable { endpoint: String },

    #[error("paging error: {0}")]
    Paging(String),

    #[error("invalid source configuration: {0}")]
    Config(String),
}

impl SourceError {
    pub fn transport(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        SourceError::Transport {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Whether a gate may retry the request after backing off.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SourceError::Throttled { .. } | SourceError::Unavailable { .. }
        )
    }
}
