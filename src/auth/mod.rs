//! Authentication module for managing user sessions and credentials.
//!
//! This module provides:
//! - `Session`: the access token / refresh token / user profile triple
//! - `CredentialStore`: the single owner of that triple, persisted through a
//!   `SessionBackend` (session file, OS keychain, or memory)
//! - `RefreshCoordinator`: deduplicated refresh-and-retry after a 401
//! - `AuthService`: login, registration, logout and start-up hydration
//! - `AuthEvents`: lifecycle notifications, including "login required"

pub mod credentials;
pub mod events;
pub mod refresh;
pub mod service;
pub mod session;

pub use credentials::{CredentialStore, KeyringBackend};
pub use events::{AuthEvent, AuthEvents};
pub use refresh::{RefreshCoordinator, RefreshOutcome, RefreshState};
pub use service::{AuthService, AuthState};
pub use session::{FileBackend, MemoryBackend, Session, SessionBackend};
