use reqwest::StatusCode;
use thiserror::Error;

/// Failure taxonomy shared by the local store, the remote client, and the
/// sync service. `recoverable` tells callers whether a retry can help.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FavoritesError {
    #[error("network failure: {0}")]
    Network(String),

    #[error("authentication failure: {0}")]
    Auth(String),

    #[error("request rejected: {0}")]
    Validation(String),

    #[error("server failure: {0}")]
    Server(String),

    #[error("local storage failure: {0}")]
    Storage(String),

    #[error("unexpected failure: {0}")]
    Unknown(String),
}

impl FavoritesError {
    /// Transport and server-side trouble may clear up on a retry; rejected,
    /// unauthenticated, and storage-degraded requests will not.
    pub fn recoverable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Server(_))
    }
}

impl From<reqwest::Error> for FavoritesError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            Self::Network(err.to_string())
        } else if err.is_decode() {
            Self::Server(format!("unreadable response body: {err}"))
        } else {
            Self::Unknown(err.to_string())
        }
    }
}

/// Maps a non-success HTTP status to the taxonomy.
pub fn classify_status(status: StatusCode, body: &str) -> FavoritesError {
    let detail = if body.trim().is_empty() {
        status.to_string()
    } else {
        format!("{status}: {}", body.trim())
    };

    if status == StatusCode::UNAUTHORIZED {
        FavoritesError::Auth(detail)
    } else if status.is_client_error() {
        FavoritesError::Validation(detail)
    } else if status.is_server_error() {
        FavoritesError::Server(detail)
    } else {
        FavoritesError::Unknown(detail)
    }
}
