//! Book, review, favorite and recommendation endpoints.
//!
//! All of these go through `ApiClient::execute`, so they share token
//! injection and refresh-and-retry with every other call.

use serde::Deserialize;
use serde_json::json;

use super::request::ApiRequest;
use super::{ApiClient, ApiError};
use crate::models::{Book, BookPage, BookQuery, EntityId, Favorite, NewReview, Review};

const BOOKS_PATH: &str = "/books";
const FAVORITES_PATH: &str = "/favorites";
const RECOMMENDATIONS_PATH: &str = "/recommendations";

// Internal response wrappers: each endpoint nests its payload under a key
// named after the resource.

#[derive(Debug, Deserialize)]
struct BookData {
    book: Book,
}

#[derive(Debug, Deserialize)]
struct ReviewsData {
    #[serde(default)]
    reviews: Vec<Review>,
}

#[derive(Debug, Deserialize)]
struct ReviewData {
    review: Review,
}

#[derive(Debug, Deserialize)]
struct FavoritesData {
    #[serde(default)]
    favorites: Vec<Favorite>,
}

#[derive(Debug, Deserialize)]
struct FavoriteData {
    favorite: Favorite,
}

#[derive(Debug, Deserialize)]
struct RecommendationsData {
    #[serde(default)]
    recommendations: Vec<Book>,
}

impl ApiClient {
    /// Browse or search the catalog.
    pub async fn list_books(&self, query: &BookQuery) -> Result<BookPage, ApiError> {
        self.send_json(ApiRequest::get(BOOKS_PATH).query(query.to_pairs()))
            .await
    }

    pub async fn get_book(&self, id: &EntityId) -> Result<Book, ApiError> {
        let data: BookData = self.get_json(&format!("{}/{}", BOOKS_PATH, id)).await?;
        Ok(data.book)
    }

    pub async fn book_reviews(&self, book_id: &EntityId) -> Result<Vec<Review>, ApiError> {
        let data: ReviewsData = self
            .get_json(&format!("{}/{}/reviews", BOOKS_PATH, book_id))
            .await?;
        Ok(data.reviews)
    }

    /// Post a review. Rejected locally, without a request, if it would fail
    /// the backend's validation.
    pub async fn add_review(
        &self,
        book_id: &EntityId,
        review: &NewReview,
    ) -> Result<Review, ApiError> {
        review.validate().map_err(ApiError::Validation)?;
        let data: ReviewData = self
            .post_json(&format!("{}/{}/reviews", BOOKS_PATH, book_id), review)
            .await?;
        Ok(data.review)
    }

    pub async fn favorites(&self) -> Result<Vec<Favorite>, ApiError> {
        let data: FavoritesData = self.get_json(FAVORITES_PATH).await?;
        Ok(data.favorites)
    }

    pub async fn add_favorite(&self, book_id: &EntityId) -> Result<Favorite, ApiError> {
        let data: FavoriteData = self
            .post_json(FAVORITES_PATH, &json!({ "bookId": book_id }))
            .await?;
        Ok(data.favorite)
    }

    pub async fn remove_favorite(&self, book_id: &EntityId) -> Result<(), ApiError> {
        self.delete(&format!("{}/{}", FAVORITES_PATH, book_id)).await
    }

    /// Personalized picks for the signed-in user.
    pub async fn recommendations(&self) -> Result<Vec<Book>, ApiError> {
        let data: RecommendationsData = self.get_json(RECOMMENDATIONS_PATH).await?;
        Ok(data.recommendations)
    }
}
