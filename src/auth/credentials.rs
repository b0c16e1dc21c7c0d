use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{Context, Result};
use keyring::Entry;
use tracing::{debug, warn};

use super::session::{MemoryBackend, Session, SessionBackend};
use crate::models::UserProfile;

const SERVICE_NAME: &str = "bookshelf-client";

const ACCESS_TOKEN_KEY: &str = "access_token";
const REFRESH_TOKEN_KEY: &str = "refresh_token";
const USER_KEY: &str = "user";

/// Stores the session triple as three entries in the OS keychain.
///
/// The keychain has no multi-entry transaction, so `save` puts back the
/// last persisted triple when a later entry fails to write.
pub struct KeyringBackend {
    access_token: Entry,
    refresh_token: Entry,
    user: Entry,
    persisted: Mutex<Option<Session>>,
}

impl KeyringBackend {
    pub fn new() -> Result<Self> {
        Self::with_service(SERVICE_NAME)
    }

    pub fn with_service(service: &str) -> Result<Self> {
        let entry = |key: &str| {
            Entry::new(service, key)
                .with_context(|| format!("Failed to create keyring entry {}", key))
        };
        Ok(Self {
            access_token: entry(ACCESS_TOKEN_KEY)?,
            refresh_token: entry(REFRESH_TOKEN_KEY)?,
            user: entry(USER_KEY)?,
            persisted: Mutex::new(None),
        })
    }

    fn entries(&self) -> [(&'static str, &Entry); 3] {
        [
            (ACCESS_TOKEN_KEY, &self.access_token),
            (REFRESH_TOKEN_KEY, &self.refresh_token),
            (USER_KEY, &self.user),
        ]
    }

    fn persisted(&self) -> MutexGuard<'_, Option<Session>> {
        self.persisted.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read(key: &str, entry: &Entry) -> Result<Option<String>> {
        match entry.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {} from keychain", key)),
        }
    }

    fn remove(key: &str, entry: &Entry) -> Result<()> {
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to delete {} from keychain", key)),
        }
    }

    /// Raw entry values for a session, in `entries()` order.
    fn values(session: &Session) -> Result<[Option<String>; 3]> {
        let user = session
            .user
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .context("Failed to serialize user profile")?;
        Ok([session.access_token.clone(), session.refresh_token.clone(), user])
    }

    fn write_all(&self, values: &[Option<String>; 3]) -> Result<()> {
        for ((key, entry), value) in self.entries().into_iter().zip(values) {
            match value {
                Some(value) => entry
                    .set_password(value)
                    .with_context(|| format!("Failed to store {} in keychain", key))?,
                None => Self::remove(key, entry)?,
            }
        }
        Ok(())
    }
}

impl SessionBackend for KeyringBackend {
    fn load(&self) -> Result<Option<Session>> {
        let access_token = Self::read(ACCESS_TOKEN_KEY, &self.access_token)?;
        let refresh_token = Self::read(REFRESH_TOKEN_KEY, &self.refresh_token)?;
        let user = match Self::read(USER_KEY, &self.user)? {
            Some(raw) => match serde_json::from_str::<UserProfile>(&raw) {
                Ok(user) => Some(user),
                Err(e) => {
                    warn!(error = %e, "Ignoring unreadable cached user profile");
                    None
                }
            },
            None => None,
        };

        let session = Session {
            access_token,
            refresh_token,
            user,
        };
        let session = if session.is_empty() { None } else { Some(session) };
        *self.persisted() = session.clone();
        Ok(session)
    }

    fn save(&self, session: &Session) -> Result<()> {
        let next = Self::values(session)?;
        let mut persisted = self.persisted();

        if let Err(e) = self.write_all(&next) {
            let previous = Self::values(&persisted.clone().unwrap_or_default())?;
            if let Err(restore) = self.write_all(&previous) {
                warn!(error = %restore, "Failed to restore previous keychain session");
            }
            return Err(e);
        }
        *persisted = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        // Remove every entry even if one fails, then report the first failure
        let mut first_error = None;
        for (key, entry) in self.entries() {
            if let Err(e) = Self::remove(key, entry) {
                first_error.get_or_insert(e);
            }
        }
        *self.persisted() = None;
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn name(&self) -> &'static str {
        "keyring"
    }
}

/// Process-wide owner of the session triple.
///
/// Readers see an in-memory copy guarded by a lock; every mutation persists
/// the complete triple to the backend first and then swaps the copy while
/// still holding the write lock, so no reader observes a partial update.
pub struct CredentialStore {
    backend: Box<dyn SessionBackend>,
    session: RwLock<Session>,
}

impl CredentialStore {
    /// Load the persisted session (if any) and take ownership of the backend.
    pub fn open(backend: Box<dyn SessionBackend>) -> Result<Self> {
        let session = backend.load()?.unwrap_or_default();
        debug!(
            backend = backend.name(),
            authenticated = session.is_authenticated(),
            has_refresh_token = session.refresh_token.is_some(),
            "Credential store opened"
        );
        Ok(Self {
            backend,
            session: RwLock::new(session),
        })
    }

    /// A store that forgets everything when the process exits.
    pub fn in_memory() -> Self {
        Self {
            backend: Box::new(MemoryBackend::new()),
            session: RwLock::new(Session::default()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Session> {
        self.session.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Session> {
        self.session.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn commit(&self, current: &mut Session, next: Session) -> Result<()> {
        self.backend.save(&next)?;
        *current = next;
        Ok(())
    }

    pub fn access_token(&self) -> Option<String> {
        self.read().access_token.clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.read().refresh_token.clone()
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.read().user.clone()
    }

    pub fn snapshot(&self) -> Session {
        self.read().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.read().is_authenticated()
    }

    /// Replace the whole triple.
    pub fn set_session(
        &self,
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        user: Option<UserProfile>,
    ) -> Result<()> {
        let next = Session::new(access_token.into(), refresh_token.into(), user);
        let mut current = self.write();
        self.commit(&mut current, next)
    }

    /// Store tokens issued in exchange for the refresh token `exchanged`,
    /// keeping the cached user profile. A missing new refresh token keeps the
    /// previous one.
    ///
    /// Returns false (and stores nothing) when the session no longer holds
    /// `exchanged`, i.e. it was cleared or replaced while the refresh call
    /// was in flight.
    pub fn rotate_tokens(
        &self,
        exchanged: &str,
        access_token: String,
        refresh_token: Option<String>,
    ) -> Result<bool> {
        let mut current = self.write();
        if current.refresh_token.as_deref() != Some(exchanged) {
            return Ok(false);
        }
        let next = Session {
            access_token: Some(access_token),
            refresh_token: refresh_token.or_else(|| current.refresh_token.clone()),
            user: current.user.clone(),
        };
        self.commit(&mut current, next)?;
        Ok(true)
    }

    /// Replace the cached profile. Returns false (and stores nothing) when
    /// signed out.
    pub fn update_user(&self, user: UserProfile) -> Result<bool> {
        let mut current = self.write();
        if !current.is_authenticated() {
            return Ok(false);
        }
        let next = Session {
            user: Some(user),
            ..current.clone()
        };
        self.commit(&mut current, next)?;
        Ok(true)
    }

    /// Forget the session. The in-memory copy is always cleared, even when
    /// the backend fails to delete its record. Clearing twice is fine.
    pub fn clear(&self) -> Result<()> {
        let mut current = self.write();
        *current = Session::default();
        self.backend.clear()
    }

    /// Forget the session only if it still holds the refresh token
    /// `exchanged` (or holds none, when `exchanged` is `None`). Returns
    /// false and leaves a newer session alone otherwise.
    ///
    /// On a match the in-memory copy is cleared even if the backend fails.
    pub fn clear_if_refresh_token(&self, exchanged: Option<&str>) -> Result<bool> {
        let mut current = self.write();
        if current.refresh_token.as_deref() != exchanged {
            return Ok(false);
        }
        *current = Session::default();
        self.backend.clear()?;
        Ok(true)
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }
}
