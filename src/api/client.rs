//! API client for the Bookshelf REST backend.
//!
//! Every authenticated request gets the session's access token attached. A
//! 401 on a request that has not been retried yet hands control to the
//! `RefreshCoordinator`; the request is then reissued exactly once with the
//! token that refresh produced.

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use super::request::{ApiRequest, ApiResponse, PendingRequest};
use super::transport::Transport;
use super::ApiError;
use crate::auth::refresh::{RefreshCoordinator, RefreshOutcome};
use crate::auth::CredentialStore;
use crate::models::{AuthPayload, MePayload, UserProfile};

// ============================================================================
// Constants
// ============================================================================

pub const LOGIN_PATH: &str = "/auth/login";
pub const REGISTER_PATH: &str = "/auth/register";
pub const ME_PATH: &str = "/auth/me";
pub const LOGOUT_PATH: &str = "/auth/logout";

/// Maximum number of retries for rate-limited (429) requests.
/// 3 retries with exponential backoff usually succeeds without excessive delay.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
/// 1 second is polite to the server while not making users wait too long.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// API client for Bookshelf.
/// Clone is cheap - the transport, store and coordinator are shared.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    store: Arc<CredentialStore>,
    refresh: RefreshCoordinator,
    initial_backoff: Duration,
}

impl ApiClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<CredentialStore>,
        refresh: RefreshCoordinator,
    ) -> Self {
        Self {
            transport,
            store,
            refresh,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        }
    }

    /// Override the first rate-limit backoff delay.
    pub fn with_initial_backoff(mut self, delay: Duration) -> Self {
        self.initial_backoff = delay;
        self
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    pub fn refresh(&self) -> &RefreshCoordinator {
        &self.refresh
    }

    /// Send a request through the session pipeline.
    ///
    /// Returns the backend's response whatever its status, except when the
    /// session had to be refreshed and that failed: then the refresh error
    /// (`SessionExpired` or the transient failure) is returned instead.
    pub async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let token = if request.authenticated {
            self.store.access_token()
        } else {
            None
        };

        let (pending, response) = self.attempt(PendingRequest::new(request), token).await?;
        if !(response.is_unauthorized() && pending.may_refresh()) {
            return Ok(response);
        }

        debug!(path = %pending.request.path, "Access token rejected, recovering session");
        match self.refresh.recover(pending.sent_with.as_deref()).await {
            RefreshOutcome::Refreshed(token) => {
                let _settle = self.refresh.settle_on_drop();
                let (_, response) = self.attempt(pending.into_retry(), Some(token)).await?;
                Ok(response)
            }
            RefreshOutcome::Expired => Err(ApiError::SessionExpired),
            RefreshOutcome::Unavailable(err) => Err(err),
        }
    }

    /// One attempt at a request with the given token, retrying only on 429.
    async fn attempt(
        &self,
        mut pending: PendingRequest,
        token: Option<String>,
    ) -> Result<(PendingRequest, ApiResponse), ApiError> {
        let request = pending.request.with_bearer(token.as_deref())?;
        pending.sent_with = token;

        let mut retries = 0;
        let mut backoff = self.initial_backoff;

        loop {
            let response = self.transport.send(&request).await?;
            if response.status != StatusCode::TOO_MANY_REQUESTS {
                return Ok((pending, response));
            }

            // Rate limited
            retries += 1;
            if retries > MAX_RATE_LIMIT_RETRIES {
                return Err(ApiError::RateLimited);
            }
            warn!(
                path = %request.path,
                retry = retries,
                backoff_ms = backoff.as_millis() as u64,
                "Rate limited, backing off"
            );
            tokio::time::sleep(backoff).await;
            backoff *= 2; // Exponential backoff
        }
    }

    /// Send a request and unwrap the `data` of a success envelope.
    pub async fn send_json<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        self.execute(request).await?.error_for_status()?.data()
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send_json(ApiRequest::get(path)).await
    }

    pub async fn post_json<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send_json(ApiRequest::post(path).json(Self::to_body(body)?))
            .await
    }

    pub async fn put_json<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send_json(ApiRequest::put(path).json(Self::to_body(body)?))
            .await
    }

    /// DELETE, ignoring any response body.
    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.execute(ApiRequest::delete(path))
            .await?
            .error_for_status()?;
        Ok(())
    }

    fn to_body<B: Serialize>(body: &B) -> Result<serde_json::Value, ApiError> {
        serde_json::to_value(body).map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to serialize request body: {}", e))
        })
    }

    // ===== Authentication Endpoints =====

    /// Exchange email and password for a session. A 401 here is bad
    /// credentials, never an expired token.
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthPayload, ApiError> {
        let request = ApiRequest::post(LOGIN_PATH)
            .anonymous()
            .json(json!({ "email": email, "password": password }));
        self.credential_exchange(request).await
    }

    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthPayload, ApiError> {
        let request = ApiRequest::post(REGISTER_PATH)
            .anonymous()
            .json(json!({ "name": name, "email": email, "password": password }));
        self.credential_exchange(request).await
    }

    async fn credential_exchange(&self, request: ApiRequest) -> Result<AuthPayload, ApiError> {
        let response = self.execute(request).await?;
        if !response.is_success() {
            return Err(ApiError::from_credential_status(response.status, &response.body));
        }
        response.data()
    }

    /// Fetch the signed-in user's profile.
    pub async fn me(&self) -> Result<UserProfile, ApiError> {
        let payload: MePayload = self.get_json(ME_PATH).await?;
        Ok(payload.user)
    }

    /// Tell the backend to revoke the session. Sent once with the current
    /// token; an expired token is not refreshed just to sign out.
    pub async fn logout(&self) -> Result<(), ApiError> {
        let body = json!({ "refreshToken": self.store.refresh_token() });
        let request = ApiRequest::post(LOGOUT_PATH).anonymous().json(body);
        let (_, response) = self
            .attempt(PendingRequest::new(request), self.store.access_token())
            .await?;
        response.error_for_status()?;
        Ok(())
    }
}
