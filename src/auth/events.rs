//! Session lifecycle notifications.
//!
//! The session layer cannot navigate on its own; it broadcasts `AuthEvent`s
//! and the application (TUI, GUI or web shell) reacts, e.g. by showing the
//! login view on `LoginRequired`.

use tokio::sync::broadcast;
use tracing::debug;

use crate::models::UserProfile;

/// Buffer for lifecycle events.
/// Events are rare (sign-in, sign-out, expiry); slow subscribers that fall
/// this far behind only miss stale notifications.
const EVENT_BUFFER_SIZE: usize = 16;

#[derive(Debug, Clone, PartialEq)]
pub enum AuthEvent {
    SignedIn(UserProfile),
    SignedOut,
    /// The session could not be refreshed and was cleared.
    LoginRequired { redirect_to: String },
}

/// Cloneable sender side shared by the coordinator and the auth service.
#[derive(Clone)]
pub struct AuthEvents {
    tx: broadcast::Sender<AuthEvent>,
}

impl AuthEvents {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUFFER_SIZE);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: AuthEvent) {
        // No subscribers is not an error
        if self.tx.send(event).is_err() {
            debug!("Auth event dropped, no subscribers");
        }
    }
}

impl Default for AuthEvents {
    fn default() -> Self {
        Self::new()
    }
}
