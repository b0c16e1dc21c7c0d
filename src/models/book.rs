//! Book catalog, review and favorite models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::EntityId;

/// Longest review body the backend accepts.
pub const MAX_REVIEW_LENGTH: usize = 2000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: EntityId,
    pub title: String,
    pub author: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub cover_image: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub published_year: Option<i32>,
    #[serde(default)]
    pub average_rating: Option<f64>,
    #[serde(default)]
    pub review_count: Option<u32>,
}

impl Book {
    /// Average rating rounded to one decimal, or "No ratings" for unreviewed books.
    pub fn rating_display(&self) -> String {
        match (self.average_rating, self.review_count.unwrap_or(0)) {
            (Some(avg), count) if count > 0 => format!("{:.1} ({} reviews)", avg, count),
            _ => "No ratings".to_string(),
        }
    }
}

/// One page of `GET /books`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookPage {
    #[serde(default)]
    pub books: Vec<Book>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub total_pages: Option<u32>,
}

/// Filters for `GET /books`.
#[derive(Debug, Clone, Default)]
pub struct BookQuery {
    pub search: Option<String>,
    pub genre: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl BookQuery {
    pub fn search(term: impl Into<String>) -> Self {
        Self {
            search: Some(term.into()),
            ..Self::default()
        }
    }

    /// Query-string pairs, skipping unset and blank filters.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if let Some(ref search) = self.search {
            if !search.trim().is_empty() {
                pairs.push(("search".to_string(), search.trim().to_string()));
            }
        }
        if let Some(ref genre) = self.genre {
            if !genre.is_empty() {
                pairs.push(("genre".to_string(), genre.clone()));
            }
        }
        if let Some(page) = self.page {
            pairs.push(("page".to_string(), page.to_string()));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit".to_string(), limit.to_string()));
        }
        pairs
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: EntityId,
    pub book_id: EntityId,
    pub user_id: EntityId,
    pub rating: u8,
    pub text: String,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Body of `POST /books/{id}/reviews`.
#[derive(Debug, Clone, Serialize)]
pub struct NewReview {
    pub rating: u8,
    pub text: String,
}

impl NewReview {
    /// Check the review the same way the review form does before submitting.
    pub fn validate(&self) -> Result<(), String> {
        if !(1..=5).contains(&self.rating) {
            return Err("Rating must be between 1 and 5".to_string());
        }
        let text = self.text.trim();
        if text.is_empty() {
            return Err("Review text is required".to_string());
        }
        if text.chars().count() > MAX_REVIEW_LENGTH {
            return Err(format!(
                "Review must be at most {} characters",
                MAX_REVIEW_LENGTH
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Favorite {
    pub id: EntityId,
    pub book_id: EntityId,
    #[serde(default)]
    pub book: Option<Book>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_book_query_pairs_skip_blank_filters() {
        let query = BookQuery {
            search: Some("  dune ".to_string()),
            genre: Some(String::new()),
            page: Some(2),
            limit: None,
        };
        assert_eq!(
            query.to_pairs(),
            vec![
                ("search".to_string(), "dune".to_string()),
                ("page".to_string(), "2".to_string()),
            ]
        );
        assert!(BookQuery::default().to_pairs().is_empty());
    }

    #[test]
    fn test_new_review_validation() {
        let ok = NewReview { rating: 4, text: "Loved it".to_string() };
        assert!(ok.validate().is_ok());

        let zero = NewReview { rating: 0, text: "meh".to_string() };
        assert!(zero.validate().is_err());

        let six = NewReview { rating: 6, text: "wow".to_string() };
        assert!(six.validate().is_err());

        let blank = NewReview { rating: 3, text: "   ".to_string() };
        assert_eq!(blank.validate().unwrap_err(), "Review text is required");

        let long = NewReview { rating: 3, text: "a".repeat(MAX_REVIEW_LENGTH + 1) };
        assert!(long.validate().is_err());
    }

    #[test]
    fn test_rating_display() {
        let json = r#"{"id": 1, "title": "Dune", "author": "Frank Herbert", "averageRating": 4.26, "reviewCount": 8}"#;
        let book: Book = serde_json::from_str(json).expect("valid book json");
        assert_eq!(book.rating_display(), "4.3 (8 reviews)");

        let unrated = Book { average_rating: None, review_count: None, ..book };
        assert_eq!(unrated.rating_display(), "No ratings");
    }
}
