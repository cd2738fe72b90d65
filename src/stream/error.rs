use crate::api::ApiError;
use thiserror::Error;

/// Failure that ends a chat turn
///
/// Delivered once through [`ChatEvent::Error`](super::ChatEvent::Error);
/// the session itself stays usable for the next turn.
#[derive(Debug, Error)]
pub enum TurnError {
    /// `error` event sent by the server
    #[error("{0}")]
    Server(String),

    /// Plain-text `[ERROR] ...` frame, verbatim
    #[error("{0}")]
    ErrorLine(String),

    /// The stream could not be opened
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Reading the body failed or stalled mid-turn
    #[error("Stream interrupted: {0}")]
    Network(String),
}

impl TurnError {
    /// True when the login is gone and the consumer should re-authenticate
    pub fn is_session_expired(&self) -> bool {
        matches!(self, TurnError::Api(e) if e.is_session_expired())
    }
}
