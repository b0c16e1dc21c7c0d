use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::credentials::KeyringBackend;
use super::events::{AuthEvent, AuthEvents};
use super::refresh::RefreshCoordinator;
use super::session::{FileBackend, MemoryBackend, SessionBackend};
use super::CredentialStore;
use crate::api::{ApiClient, ApiError, ReqwestTransport, Transport};
use crate::config::{Config, StorageKind};
use crate::models::{AuthPayload, UserProfile};

/// Shortest password the registration form accepts.
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// What views need to know about the session, derived from the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct AuthState {
    pub is_loading: bool,
    pub is_authenticated: bool,
    pub user: Option<UserProfile>,
}

/// Session lifecycle: sign-in, registration, sign-out and start-up hydration.
pub struct AuthService {
    client: ApiClient,
    store: Arc<CredentialStore>,
    events: AuthEvents,
    loading: AtomicBool,
}

impl AuthService {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<CredentialStore>,
        login_path: &str,
    ) -> Self {
        let events = AuthEvents::new();
        let refresh = RefreshCoordinator::new(
            Arc::clone(&transport),
            Arc::clone(&store),
            events.clone(),
            login_path,
        );
        let client = ApiClient::new(transport, Arc::clone(&store), refresh);
        Self {
            client,
            store,
            events,
            loading: AtomicBool::new(true),
        }
    }

    /// Wire up transport, credential backend and client from configuration.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let transport = ReqwestTransport::new(&config.api_base_url, config.request_timeout())?;
        let backend: Box<dyn SessionBackend> = match config.storage {
            StorageKind::File => Box::new(FileBackend::new(config.cache_dir()?)),
            StorageKind::Keyring => Box::new(KeyringBackend::new()?),
            StorageKind::Memory => Box::new(MemoryBackend::new()),
        };
        let store = Arc::new(CredentialStore::open(backend)?);
        Ok(Self::new(Arc::new(transport), store, &config.login_path))
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> AuthState {
        let session = self.store.snapshot();
        AuthState {
            is_loading: self.loading.load(Ordering::SeqCst),
            is_authenticated: session.is_authenticated(),
            user: session.user,
        }
    }

    /// Start-up check of a persisted session.
    ///
    /// Confirms the session with `GET /auth/me` (refreshing it if the access
    /// token expired) and updates the cached profile. Network trouble keeps
    /// the cached session; only a rejected refresh token signs the user out.
    /// `is_loading` is true until this returns.
    pub async fn hydrate(&self) -> AuthState {
        let session = self.store.snapshot();
        if session.access_token.is_some() || session.refresh_token.is_some() {
            match self.client.me().await {
                Ok(user) => {
                    if let Err(e) = self.store.update_user(user) {
                        warn!(error = %e, "Failed to cache user profile");
                    }
                    debug!("Session restored");
                }
                Err(ApiError::SessionExpired) => info!("Stored session has expired"),
                Err(e) => {
                    warn!(error = %e, "Could not verify stored session, using cached profile")
                }
            }
        } else {
            debug!("No stored session");
        }
        self.loading.store(false, Ordering::SeqCst);
        self.state()
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<UserProfile, ApiError> {
        let email = email.trim();
        validate_email(email)?;
        if password.is_empty() {
            return Err(ApiError::Validation("Email and password required".to_string()));
        }

        let payload = self.client.login(email, password).await.map_err(|e| {
            warn!(error = %e, "Login failed");
            e
        })?;
        self.start_session(payload)
    }

    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<UserProfile, ApiError> {
        let name = name.trim();
        let email = email.trim();
        if name.is_empty() {
            return Err(ApiError::Validation("Name is required".to_string()));
        }
        validate_email(email)?;
        if password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(ApiError::Validation(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LENGTH
            )));
        }

        let payload = self.client.register(name, email, password).await?;
        self.start_session(payload)
    }

    fn start_session(&self, payload: AuthPayload) -> Result<UserProfile, ApiError> {
        let user = payload.user;
        self.store
            .set_session(payload.access_token, payload.refresh_token, Some(user.clone()))?;
        self.client.refresh().reset();
        self.loading.store(false, Ordering::SeqCst);
        info!(user = %user.id, "Signed in");
        self.events.emit(AuthEvent::SignedIn(user.clone()));
        Ok(user)
    }

    /// Sign out. The backend is told best-effort; local state is cleared
    /// whether or not that call succeeds.
    pub async fn logout(&self) {
        if self.store.access_token().is_some() {
            if let Err(e) = self.client.logout().await {
                warn!(error = %e, "Server logout failed, clearing local session anyway");
            }
        }
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to remove persisted session");
        }
        self.client.refresh().reset();
        info!("Signed out");
        self.events.emit(AuthEvent::SignedOut);
    }

    /// Re-fetch the profile from the backend and cache it.
    pub async fn refresh_profile(&self) -> Result<UserProfile, ApiError> {
        let user = self.client.me().await?;
        self.store.update_user(user.clone())?;
        Ok(user)
    }
}

fn validate_email(email: &str) -> Result<(), ApiError> {
    if email.is_empty() {
        return Err(ApiError::Validation("Email and password required".to_string()));
    }
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(ApiError::Validation("Enter a valid email address".to_string())),
    }
}
