//! REST API client module for the Bookshelf service.
//!
//! This module provides the `ApiClient` for communicating with the
//! Bookshelf backend: the `/auth/*` endpoints and the book, review,
//! favorite and recommendation resources.
//!
//! The API uses bearer token authentication. Expired access tokens are
//! renewed transparently through `auth::RefreshCoordinator`.

pub mod client;
pub mod error;
pub mod request;
pub mod resources;
pub mod transport;

pub use client::ApiClient;
pub use error::ApiError;
pub use request::{ApiRequest, ApiResponse, PendingRequest};
pub use transport::{ReqwestTransport, Transport};
