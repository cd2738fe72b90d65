//! Typed errors for back-office API operations
//!
//! Lets callers tell an expired login apart from ordinary HTTP or network
//! failures without string matching.

use thiserror::Error;

/// API operation errors with typed variants
///
/// - `Unauthorized` (401) - rejected and not recoverable by refresh (public
///   endpoint, or already replayed once)
/// - `SessionExpired` - refresh failed or no refresh token; tokens were cleared
///   and the consumer should send the user back to login
/// - `RateLimited` (429) / `Service` (5xx) / `Network` - can retry
/// - `BadRequest`, `Forbidden`, `NotFound` - caller error, do not retry
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP 401 that the gateway did not (or could not) recover from
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The login session is gone; all stored tokens have been cleared
    #[error("Session expired: {0}")]
    SessionExpired(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limit exceeded (HTTP 429)
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Server-side error (HTTP 5xx)
    #[error("Service error: {0}")]
    Service(String),

    /// Any other non-success status
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Connection refused, timeout, reset while reading
    #[error("Network error: {0}")]
    Network(String),

    /// Response body did not match the expected shape
    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl ApiError {
    /// Check if this error is worth retrying after a delay
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiError::RateLimited(_) | ApiError::Service(_) | ApiError::Network(_)
        )
    }

    /// True when the consumer must re-authenticate (redirect to login)
    pub fn is_session_expired(&self) -> bool {
        matches!(self, ApiError::SessionExpired(_))
    }

    /// Convert HTTP status code and error text into typed ApiError
    pub fn from_http_status(status: reqwest::StatusCode, error_text: String) -> Self {
        match status.as_u16() {
            400 => ApiError::BadRequest(error_text),
            401 => ApiError::Unauthorized(error_text),
            403 => ApiError::Forbidden(error_text),
            404 => ApiError::NotFound(error_text),
            429 => ApiError::RateLimited(error_text),
            500..=599 => ApiError::Service(error_text),
            code => ApiError::Status {
                status: code,
                body: error_text,
            },
        }
    }

    /// Convert network/connection errors into typed ApiError
    pub fn from_network_error(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ApiError::Network(format!("Request timeout: {}", e))
        } else if e.is_connect() {
            ApiError::Network(format!("Connection failed: {}", e))
        } else if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            Self::from_http_status(status, e.to_string())
        } else {
            ApiError::Network(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_http_status() {
        let err =
            ApiError::from_http_status(reqwest::StatusCode::UNAUTHORIZED, "no token".to_string());
        assert!(matches!(err, ApiError::Unauthorized(_)));

        let err = ApiError::from_http_status(
            reqwest::StatusCode::TOO_MANY_REQUESTS,
            "slow down".to_string(),
        );
        assert!(matches!(err, ApiError::RateLimited(_)));

        let err = ApiError::from_http_status(reqwest::StatusCode::BAD_GATEWAY, "down".to_string());
        assert!(matches!(err, ApiError::Service(_)));

        let err = ApiError::from_http_status(reqwest::StatusCode::IM_A_TEAPOT, "tea".to_string());
        assert!(matches!(err, ApiError::Status { status: 418, .. }));
    }

    #[test]
    fn test_retryable() {
        assert!(ApiError::Service("x".into()).is_retryable());
        assert!(ApiError::Network("x".into()).is_retryable());
        assert!(!ApiError::Unauthorized("x".into()).is_retryable());
        assert!(!ApiError::SessionExpired("x".into()).is_retryable());
    }

    #[test]
    fn test_session_expired_is_distinct_from_network() {
        assert!(ApiError::SessionExpired("refresh failed".into()).is_session_expired());
        assert!(!ApiError::Network("reset".into()).is_session_expired());
        assert!(!ApiError::Unauthorized("401".into()).is_session_expired());
    }

    #[test]
    fn test_error_display() {
        let err = ApiError::Status {
            status: 409,
            body: "conflict".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 409: conflict");
        assert_eq!(
            ApiError::SessionExpired("refresh rejected".into()).to_string(),
            "Session expired: refresh rejected"
        );
    }
}
