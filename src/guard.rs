//! Route protection for views that need a signed-in user.
//!
//! `RouteGuard` is a pure decision function over the current `AuthState`,
//! re-evaluated on every navigation/render. It never redirects while the
//! session is still being hydrated, which avoids a flash of the login view
//! for users who are in fact signed in.

use serde::Serialize;

use crate::auth::AuthState;

pub const DEFAULT_LOGIN_PATH: &str = "/login";

/// Where to land after login when there is no usable origin path.
pub const DEFAULT_HOME_PATH: &str = "/";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum GuardDecision {
    /// Session still loading: show a neutral loading indicator.
    Loading,
    /// Render the protected content.
    Render,
    /// Send the user to `to`, remembering `from` for after login.
    Redirect { to: String, from: String },
}

#[derive(Debug, Clone)]
pub struct RouteGuard {
    redirect_to: String,
}

impl Default for RouteGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteGuard {
    pub fn new() -> Self {
        Self::with_redirect(DEFAULT_LOGIN_PATH)
    }

    /// Guard that sends unauthenticated users somewhere other than `/login`.
    pub fn with_redirect(redirect_to: impl Into<String>) -> Self {
        Self {
            redirect_to: redirect_to.into(),
        }
    }

    pub fn redirect_to(&self) -> &str {
        &self.redirect_to
    }

    pub fn evaluate(
        &self,
        is_authenticated: bool,
        is_loading: bool,
        requested_path: &str,
    ) -> GuardDecision {
        if is_loading {
            GuardDecision::Loading
        } else if is_authenticated {
            GuardDecision::Render
        } else {
            GuardDecision::Redirect {
                to: self.redirect_to.clone(),
                from: requested_path.to_string(),
            }
        }
    }

    pub fn evaluate_state(&self, state: &AuthState, requested_path: &str) -> GuardDecision {
        self.evaluate(state.is_authenticated, state.is_loading, requested_path)
    }

    /// Path to continue to after a successful login.
    ///
    /// Only local absolute paths are honored; anything else (missing,
    /// protocol-relative `//host`, absolute URLs, or the login page itself)
    /// falls back to the home path.
    pub fn post_login_destination<'a>(&self, from: Option<&'a str>) -> &'a str {
        match from {
            Some(path)
                if path.starts_with('/')
                    && !path.starts_with("//")
                    && !path.contains('\\')
                    && !self.is_login_path(path) =>
            {
                path
            }
            _ => DEFAULT_HOME_PATH,
        }
    }

    fn is_login_path(&self, path: &str) -> bool {
        let bare = path.split(|c: char| c == '?' || c == '#').next().unwrap_or(path);
        bare.trim_end_matches('/') == self.redirect_to.trim_end_matches('/')
    }
}
