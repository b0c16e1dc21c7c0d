//! Request/response values passed through the client pipeline.
//!
//! Requests are plain data so the adapter can reissue one verbatim after a
//! token refresh.

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::ApiError;
use crate::models::ApiEnvelope;

#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the API base URL, e.g. `/books/12`.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: Option<Value>,
    /// Whether the request carries the session's access token (and is
    /// therefore eligible for refresh-and-retry on 401).
    pub authenticated: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
            authenticated: true,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn query(mut self, pairs: Vec<(String, String)>) -> Self {
        self.query = pairs;
        self
    }

    /// Send without the session's token; 401s are returned to the caller.
    pub fn anonymous(mut self) -> Self {
        self.authenticated = false;
        self
    }

    /// The bearer token currently attached, if any.
    pub fn bearer(&self) -> Option<&str> {
        self.headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
    }

    /// Copy of this request carrying `token` (or no Authorization header).
    pub(crate) fn with_bearer(&self, token: Option<&str>) -> Result<Self, ApiError> {
        let mut request = self.clone();
        request.headers.remove(AUTHORIZATION);
        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|_| {
                ApiError::InvalidResponse("access token is not a valid header value".to_string())
            })?;
            request.headers.insert(AUTHORIZATION, value);
        }
        Ok(request)
    }
}

/// A request captured by the adapter, with its retry flag carried explicitly.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub request: ApiRequest,
    pub retried: bool,
    /// Access token the last attempt was sent with.
    pub sent_with: Option<String>,
}

impl PendingRequest {
    pub fn new(request: ApiRequest) -> Self {
        Self {
            request,
            retried: false,
            sent_with: None,
        }
    }

    /// Whether a 401 on this request may trigger the refresh protocol.
    pub fn may_refresh(&self) -> bool {
        self.request.authenticated && !self.retried
    }

    /// Consume this request into its single permitted retry.
    pub fn into_retry(self) -> Self {
        Self {
            retried: true,
            ..self
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == StatusCode::UNAUTHORIZED
    }

    /// Turn a non-2xx response into the matching `ApiError`.
    pub fn error_for_status(self) -> Result<Self, ApiError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ApiError::from_status(self.status, &self.body))
        }
    }

    /// Parse the `data` field of a success envelope.
    pub fn data<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        let envelope: ApiEnvelope<T> = serde_json::from_str(&self.body)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse response: {}", e)))?;
        envelope
            .data
            .ok_or_else(|| ApiError::InvalidResponse("Response envelope has no data".to_string()))
    }
}
