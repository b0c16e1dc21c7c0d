//! JSON envelopes used by every Bookshelf endpoint.
//!
//! Success: `{ "success": true, "data": ..., "message": "..." }`
//! Failure: `{ "error": { "message": "..." } }`

use serde::{Deserialize, Serialize};

use super::UserProfile;

#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope<T> {
    #[serde(default)]
    pub success: bool,
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub message: String,
}

impl ErrorEnvelope {
    /// Pull a human-readable message out of an error response body.
    ///
    /// Tries the `{ error: { message } }` shape first, then a top-level
    /// `message` from a `{ success: false, message }` envelope.
    pub fn message_from(body: &str) -> Option<String> {
        if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) {
            return Some(envelope.error.message);
        }
        serde_json::from_str::<ApiEnvelope<serde_json::Value>>(body)
            .ok()
            .and_then(|e| e.message)
            .filter(|m| !m.is_empty())
    }
}

/// `data` of login and register responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthPayload {
    pub user: UserProfile,
    pub access_token: String,
    pub refresh_token: String,
}

/// `data` of a refresh response. Some backends only rotate the access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshPayload {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// `data` of `GET /auth/me`.
#[derive(Debug, Clone, Deserialize)]
pub struct MePayload {
    pub user: UserProfile,
}
