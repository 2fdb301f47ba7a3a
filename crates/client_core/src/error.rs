use thiserror::Error;

/// Failure of a remote fetch or of a controller cycle.
///
/// Causes are captured as rendered messages so the error can live inside
/// cloned state snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("transport failure for {endpoint}: {message}")]
    Transport { endpoint: String, message: String },
    #[error("failed to decode response from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },
    #[error("group '{group}' has no usable events locator")]
    InvalidLocator { group: String },
    #[error("sync failed: {0}")]
    Unknown(String),
}

impl FetchError {
    pub(crate) fn transport(endpoint: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Transport {
            endpoint: endpoint.into(),
            message: err.to_string(),
        }
    }

    pub(crate) fn decode(endpoint: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Decode {
            endpoint: endpoint.into(),
            message: err.to_string(),
        }
    }

    /// Only transport failures are retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}
