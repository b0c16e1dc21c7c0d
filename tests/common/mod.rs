//! Scripted in-process backend for exercising the session pipeline.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bookshelf_client::api::{ApiError, ApiRequest, ApiResponse, Transport};
use bookshelf_client::auth::{AuthService, CredentialStore};
use bookshelf_client::models::{EntityId, UserProfile};
use reqwest::StatusCode;
use serde_json::json;

pub const GOOD_PASSWORD: &str = "correct-horse";

/// How the backend answers `POST /auth/refresh`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RefreshMode {
    /// Issue `access-N` / `refresh-N` for a valid refresh token.
    Rotate,
    /// Reject every refresh token with 401.
    Reject,
    /// Fail at the network level.
    NetworkDown,
}

struct Tokens {
    access: String,
    refresh: String,
    issued: u32,
}

pub struct ScriptedBackend {
    tokens: Mutex<Tokens>,
    refresh_mode: RefreshMode,
    refresh_delay: Duration,
    logout_fails: bool,
    throttled: AtomicUsize,
    refresh_calls: AtomicUsize,
    log: Mutex<Vec<ApiRequest>>,
}

impl ScriptedBackend {
    /// Backend that accepts `valid_access` and `valid_refresh`.
    pub fn new(valid_access: &str, valid_refresh: &str) -> Self {
        Self {
            tokens: Mutex::new(Tokens {
                access: valid_access.to_string(),
                refresh: valid_refresh.to_string(),
                issued: 0,
            }),
            refresh_mode: RefreshMode::Rotate,
            refresh_delay: Duration::ZERO,
            logout_fails: false,
            throttled: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            log: Mutex::new(Vec::new()),
        }
    }

    pub fn refresh_mode(mut self, mode: RefreshMode) -> Self {
        self.refresh_mode = mode;
        self
    }

    /// Hold every refresh call open this long.
    pub fn refresh_delay(mut self, delay: Duration) -> Self {
        self.refresh_delay = delay;
        self
    }

    pub fn logout_fails(mut self) -> Self {
        self.logout_fails = true;
        self
    }

    /// Answer the next `count` requests to `/throttled` with 429.
    pub fn throttle(self, count: usize) -> Self {
        self.throttled.store(count, Ordering::SeqCst);
        self
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// Requests received for `path`, in arrival order.
    pub fn requests_to(&self, path: &str) -> Vec<ApiRequest> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.path == path)
            .cloned()
            .collect()
    }

    fn ok(data: serde_json::Value) -> ApiResponse {
        ApiResponse::new(
            StatusCode::OK,
            json!({ "success": true, "data": data }).to_string(),
        )
    }

    fn unauthorized(message: &str) -> ApiResponse {
        ApiResponse::new(
            StatusCode::UNAUTHORIZED,
            json!({ "error": { "message": message } }).to_string(),
        )
    }

    fn user_json() -> serde_json::Value {
        json!({ "id": 1, "email": "ada@example.com", "name": "Ada" })
    }

    async fn refresh(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if !self.refresh_delay.is_zero() {
            tokio::time::sleep(self.refresh_delay).await;
        }
        match self.refresh_mode {
            RefreshMode::NetworkDown => Err(ApiError::Network("connection refused".to_string())),
            RefreshMode::Reject => Ok(Self::unauthorized("Invalid refresh token")),
            RefreshMode::Rotate => {
                let presented = request
                    .body
                    .as_ref()
                    .and_then(|b| b["refreshToken"].as_str())
                    .map(str::to_string);
                let mut tokens = self.tokens.lock().unwrap();
                if presented.as_deref() != Some(tokens.refresh.as_str()) {
                    return Ok(Self::unauthorized("Invalid refresh token"));
                }
                tokens.issued += 1;
                tokens.access = format!("access-{}", tokens.issued);
                tokens.refresh = format!("refresh-{}", tokens.issued);
                Ok(Self::ok(json!({
                    "accessToken": tokens.access,
                    "refreshToken": tokens.refresh,
                })))
            }
        }
    }

    fn login(&self, request: &ApiRequest) -> ApiResponse {
        let password = request
            .body
            .as_ref()
            .and_then(|b| b["password"].as_str())
            .unwrap_or_default();
        if password != GOOD_PASSWORD {
            return Self::unauthorized("Invalid email or password");
        }
        let mut tokens = self.tokens.lock().unwrap();
        tokens.access = "access-login".to_string();
        tokens.refresh = "refresh-login".to_string();
        Self::ok(json!({
            "user": Self::user_json(),
            "accessToken": tokens.access,
            "refreshToken": tokens.refresh,
        }))
    }

    fn protected(&self, request: &ApiRequest) -> ApiResponse {
        let valid = self.tokens.lock().unwrap().access.clone();
        if request.bearer() != Some(valid.as_str()) {
            return Self::unauthorized("Token expired");
        }
        match request.path.as_str() {
            "/auth/me" => Self::ok(json!({ "user": Self::user_json() })),
            "/favorites" => Self::ok(json!({ "favorites": [] })),
            "/books/404" => ApiResponse::new(
                StatusCode::NOT_FOUND,
                json!({ "error": { "message": "Book not found" } }).to_string(),
            ),
            path => Self::ok(json!({ "path": path })),
        }
    }
}

#[async_trait]
impl Transport for ScriptedBackend {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        self.log.lock().unwrap().push(request.clone());

        match request.path.as_str() {
            "/auth/refresh" => self.refresh(request).await,
            "/auth/login" => Ok(self.login(request)),
            "/auth/logout" if self.logout_fails => {
                Err(ApiError::Network("connection reset".to_string()))
            }
            "/auth/logout" => Ok(Self::ok(json!({}))),
            "/always-401" => Ok(Self::unauthorized("Nope")),
            "/throttled" => {
                let remaining = self.throttled.load(Ordering::SeqCst);
                if remaining > 0 {
                    self.throttled.store(remaining - 1, Ordering::SeqCst);
                    return Ok(ApiResponse::new(StatusCode::TOO_MANY_REQUESTS, ""));
                }
                Ok(self.protected(request))
            }
            _ => Ok(self.protected(request)),
        }
    }
}

pub fn ada() -> UserProfile {
    UserProfile {
        id: EntityId::Number(1),
        email: "ada@example.com".to_string(),
        name: "Ada".to_string(),
        created_at: None,
        updated_at: None,
    }
}

/// Service over `backend` with an in-memory store holding the given tokens.
pub fn service_with_session(
    backend: &Arc<ScriptedBackend>,
    access: Option<&str>,
    refresh: Option<&str>,
) -> AuthService {
    let store = Arc::new(CredentialStore::in_memory());
    if let (Some(access), Some(refresh)) = (access, refresh) {
        store.set_session(access, refresh, Some(ada())).unwrap();
    }
    let transport: Arc<dyn Transport> = Arc::clone(backend) as Arc<dyn Transport>;
    AuthService::new(transport, store, "/login")
}
