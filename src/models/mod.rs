//! Data models for Bookshelf entities.
//!
//! This module contains the data structures shared by the API client and
//! the session layer:
//!
//! - `UserProfile`, `EntityId`: the signed-in account as cached by the session
//! - `ApiEnvelope`, `ErrorEnvelope`: the JSON wrappers every endpoint returns
//! - `AuthPayload`, `RefreshPayload`: token-bearing responses from `/auth/*`
//! - Book types: `Book`, `BookPage`, `BookQuery`, `Review`, `NewReview`, `Favorite`

pub mod book;
pub mod envelope;
pub mod user;

pub use book::{Book, BookPage, BookQuery, Favorite, NewReview, Review};
pub use envelope::{ApiEnvelope, AuthPayload, ErrorEnvelope, MePayload, RefreshPayload};
pub use user::{EntityId, UserProfile};
