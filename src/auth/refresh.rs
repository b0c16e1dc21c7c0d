//! Silent token refresh.
//!
//! When an authenticated request comes back 401, the client asks the
//! `RefreshCoordinator` to recover the session. The coordinator exchanges the
//! refresh token for new tokens at most once at a time: the first caller
//! starts the exchange and parks a shared handle to it, and every request
//! that hits a 401 meanwhile awaits that same handle. The exchange runs on its
//! own task, so it completes even when every request waiting on it is
//! cancelled.
//!
//! ```text
//! Idle ──401──▶ Refreshing ──ok──▶ RetryingOriginal
//!                  │  └──401 / no refresh token──▶ Failed (session cleared)
//!                  └──network / server error──▶ Idle (session untouched)
//! ```

use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::json;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::events::{AuthEvent, AuthEvents};
use super::CredentialStore;
use crate::api::request::ApiRequest;
use crate::api::transport::Transport;
use crate::api::ApiError;
use crate::models::RefreshPayload;

pub const REFRESH_PATH: &str = "/auth/refresh";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Refreshing,
    RetryingOriginal,
    Failed,
}

/// What a request that saw a 401 should do next.
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    /// Retry once with this access token.
    Refreshed(String),
    /// The session was cleared; the user must sign in again.
    Expired,
    /// The refresh call itself failed; the session was left untouched.
    Unavailable(ApiError),
}

type InflightRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

/// Cheap to clone; clones share the same in-flight refresh.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    transport: Arc<dyn Transport>,
    store: Arc<CredentialStore>,
    events: AuthEvents,
    login_path: String,
    state: watch::Sender<RefreshState>,
    inflight: Mutex<Option<InflightRefresh>>,
}

impl RefreshCoordinator {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<CredentialStore>,
        events: AuthEvents,
        login_path: impl Into<String>,
    ) -> Self {
        let (state, _) = watch::channel(RefreshState::Idle);
        Self {
            inner: Arc::new(Inner {
                transport,
                store,
                events,
                login_path: login_path.into(),
                state,
                inflight: Mutex::new(None),
            }),
        }
    }

    pub fn state(&self) -> RefreshState {
        *self.inner.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<RefreshState> {
        self.inner.state.subscribe()
    }

    pub fn events(&self) -> &AuthEvents {
        &self.inner.events
    }

    pub fn login_path(&self) -> &str {
        &self.inner.login_path
    }

    /// Recover from a 401 on a request that was sent with `sent_with`.
    ///
    /// Joins the in-flight refresh if there is one. If the session already
    /// holds a different access token than the one that was rejected,
    /// another request has refreshed in the meantime and that token is
    /// returned without a new refresh call.
    pub async fn recover(&self, sent_with: Option<&str>) -> RefreshOutcome {
        let refresh = {
            let mut slot = self.inner.slot();
            match slot.as_ref() {
                Some(existing) => {
                    debug!("Joining in-flight token refresh");
                    existing.clone()
                }
                None => {
                    if let Some(current) = self.inner.store.access_token() {
                        if sent_with != Some(current.as_str()) {
                            debug!("Session already refreshed, retrying with current token");
                            return RefreshOutcome::Refreshed(current);
                        }
                    }
                    let task = tokio::spawn(Arc::clone(&self.inner).exchange());
                    let inner = Arc::clone(&self.inner);
                    let refresh = async move {
                        task.await.unwrap_or_else(|e| {
                            inner.slot().take();
                            inner.set_state(RefreshState::Idle);
                            RefreshOutcome::Unavailable(ApiError::Network(format!(
                                "Token refresh task failed: {}",
                                e
                            )))
                        })
                    }
                    .boxed()
                    .shared();
                    *slot = Some(refresh.clone());
                    refresh
                }
            }
        };
        refresh.await
    }

    /// Mark the retry that followed a refresh as done.
    pub fn settle(&self) {
        self.inner.settle();
    }

    /// Settles when dropped, so a cancelled retry does not leave the state
    /// at `RetryingOriginal`.
    pub fn settle_on_drop(&self) -> SettleGuard<'_> {
        SettleGuard { coordinator: self }
    }

    /// Back to `Idle` after a fresh sign-in.
    pub fn reset(&self) {
        self.inner.set_state(RefreshState::Idle);
    }
}

pub struct SettleGuard<'a> {
    coordinator: &'a RefreshCoordinator,
}

impl Drop for SettleGuard<'_> {
    fn drop(&mut self) {
        self.coordinator.settle();
    }
}

impl Inner {
    /// Body of the spawned refresh task.
    async fn exchange(self: Arc<Self>) -> RefreshOutcome {
        let outcome = self.run().await;
        let parked = self.slot().take();
        // Only the parked handle is left: every caller was cancelled and
        // nobody will retry with the new token.
        if parked.as_ref().and_then(Shared::strong_count) == Some(1) {
            self.settle();
        }
        outcome
    }

    fn settle(&self) {
        self.state.send_if_modified(|state| {
            if *state == RefreshState::RetryingOriginal {
                *state = RefreshState::Idle;
                true
            } else {
                false
            }
        });
    }

    fn slot(&self) -> MutexGuard<'_, Option<InflightRefresh>> {
        self.inflight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_state(&self, next: RefreshState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(from = ?previous, to = ?next, "Refresh state changed");
        }
    }

    async fn run(&self) -> RefreshOutcome {
        self.set_state(RefreshState::Refreshing);

        let Some(refresh_token) = self.store.refresh_token() else {
            info!("No refresh token available, session cannot be renewed");
            return self.fail(None);
        };

        let request = ApiRequest::post(REFRESH_PATH)
            .anonymous()
            .json(json!({ "refreshToken": refresh_token }));

        let response = match self.transport.send(&request).await {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "Token refresh failed, keeping session");
                return self.unavailable(err);
            }
        };

        if response.is_unauthorized() {
            info!("Refresh token rejected");
            return self.fail(Some(&refresh_token));
        }
        if !response.is_success() {
            let err = ApiError::from_status(response.status, &response.body);
            warn!(status = %response.status, error = %err, "Token refresh failed, keeping session");
            return self.unavailable(err);
        }

        let payload: RefreshPayload = match response.data() {
            Ok(payload) => payload,
            Err(err) => {
                warn!(error = %err, "Malformed refresh response, keeping session");
                return self.unavailable(err);
            }
        };

        let access_token = payload.access_token.clone();
        match self
            .store
            .rotate_tokens(&refresh_token, payload.access_token, payload.refresh_token)
        {
            Ok(true) => {
                info!("Access token refreshed");
                self.set_state(RefreshState::RetryingOriginal);
                RefreshOutcome::Refreshed(access_token)
            }
            Ok(false) => self.superseded(),
            Err(err) => {
                warn!(error = %err, "Failed to persist refreshed tokens");
                self.unavailable(err.into())
            }
        }
    }

    fn unavailable(&self, err: ApiError) -> RefreshOutcome {
        self.set_state(RefreshState::Idle);
        RefreshOutcome::Unavailable(err)
    }

    /// The session was signed out or replaced while the refresh was in
    /// flight; whatever the store holds now wins.
    fn superseded(&self) -> RefreshOutcome {
        debug!("Session changed during token refresh, discarding result");
        self.set_state(RefreshState::Idle);
        match self.store.access_token() {
            Some(current) => RefreshOutcome::Refreshed(current),
            None => RefreshOutcome::Expired,
        }
    }

    fn fail(&self, exchanged: Option<&str>) -> RefreshOutcome {
        match self.store.clear_if_refresh_token(exchanged) {
            Ok(false) => return self.superseded(),
            Ok(true) => {}
            Err(e) => warn!(error = %e, "Failed to remove persisted session"),
        }
        self.set_state(RefreshState::Failed);
        self.events.emit(AuthEvent::LoginRequired {
            redirect_to: self.login_path.clone(),
        });
        RefreshOutcome::Expired
    }
}
