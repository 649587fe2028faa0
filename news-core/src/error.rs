use thiserror::Error;

/// Failure of a single transport call.
///
/// `Clone` because one coalesced fetch result is handed to every caller
/// waiting on the same feed key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),
    #[error("API error: {0}")]
    Status(u16),
    #[error("request timed out")]
    Timeout,
    #[error("request cancelled")]
    Cancelled,
    #[error("malformed response: {0}")]
    Validation(String),
    #[error("fetch task failed: {0}")]
    Task(String),
}

impl FetchError {
    /// Cancellation is intentional and must never be shown to the user.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled)
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = err.status() {
            FetchError::Status(status.as_u16())
        } else if err.is_decode() {
            FetchError::Validation(err.to_string())
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

impl From<tokio::task::JoinError> for FetchError {
    fn from(err: tokio::task::JoinError) -> Self {
        FetchError::Task(err.to_string())
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::Validation(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactionError {
    #[error("a reaction is already being submitted")]
    Busy,
    #[error(transparent)]
    Transport(#[from] FetchError),
}

impl ReactionError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ReactionError::Transport(err) if err.is_cancelled())
    }
}
