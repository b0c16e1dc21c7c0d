use reqwest::StatusCode;
use thiserror::Error;

use crate::models::ErrorEnvelope;

/// Errors surfaced by the API client and the session layer.
///
/// `Clone` so a single refresh outcome can be handed to every request
/// waiting on it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("{0}")]
    AuthenticationFailed(String),

    #[error("Unauthorized - token may be expired")]
    Unauthorized,

    #[error("Session expired - please log in again")]
    SessionExpired,

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Failed to persist session: {0}")]
    Storage(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::Network(err.to_string())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Storage(format!("{:#}", err))
    }
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Message to show for a failed response: the envelope's message when
    /// there is one, otherwise the (truncated) raw body.
    fn detail(body: &str) -> String {
        ErrorEnvelope::message_from(body).unwrap_or_else(|| Self::truncate_body(body))
    }

    pub fn from_status(status: StatusCode, body: &str) -> Self {
        match status.as_u16() {
            401 => ApiError::Unauthorized,
            403 => ApiError::AccessDenied(Self::detail(body)),
            404 => ApiError::NotFound(Self::detail(body)),
            400 | 409 | 422 => ApiError::Validation(Self::detail(body)),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(Self::detail(body)),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, Self::detail(body))),
        }
    }

    /// Like `from_status`, for the credential endpoints: a 401 there means
    /// the email/password (or registration data) was rejected, and the
    /// backend's message is shown to the user verbatim.
    pub fn from_credential_status(status: StatusCode, body: &str) -> Self {
        match status.as_u16() {
            400 | 401 | 409 | 422 => ApiError::AuthenticationFailed(
                ErrorEnvelope::message_from(body)
                    .unwrap_or_else(|| "Invalid email or password".to_string()),
            ),
            _ => Self::from_status(status, body),
        }
    }

    /// True for failures the user can retry without signing in again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ApiError::Network(_) | ApiError::RateLimited | ApiError::ServerError(_)
        )
    }
}
