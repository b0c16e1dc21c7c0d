//! Bookshelf client library.
//!
//! Session-aware access to the Bookshelf book discovery backend: persisted
//! credentials, silent token refresh with single-flight deduplication, route
//! guarding for front ends, and typed book/review/favorite endpoints.

pub mod api;
pub mod auth;
pub mod config;
pub mod guard;
pub mod models;

pub use api::{ApiClient, ApiError};
pub use auth::{AuthEvent, AuthService, AuthState, CredentialStore};
pub use config::Config;
pub use guard::{GuardDecision, RouteGuard};
