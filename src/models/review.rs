use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Review {
    pub id: Uuid,
    pub author_id: Uuid,
    pub content: String,
    pub rating: i16,
    pub likes: i32,
    pub dislikes: i32,
    pub created_at: DateTime<Utc>,
}

impl Review {
    pub fn counts(&self) -> ReviewCounts {
        ReviewCounts {
            likes: self.likes,
            dislikes: self.dislikes,
        }
    }
}

/// Like/dislike totals as stored on the review row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ReviewCounts {
    pub likes: i32,
    pub dislikes: i32,
}

impl ReviewCounts {
    pub fn total(&self) -> i32 {
        self.likes + self.dislikes
    }
}

// Insert payload handed to the store
#[derive(Debug, Clone)]
pub struct NewReview {
    pub author_id: Uuid,
    pub content: String,
    pub rating: i16,
}

// Create review request
#[derive(Debug, Validate, Deserialize)]
pub struct CreateReviewRequest {
    #[validate(length(min = 1, max = 5000))]
    pub content: String,
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: i16,
}

impl CreateReviewRequest {
    pub fn into_new_review(self, author_id: Uuid) -> NewReview {
        NewReview {
            author_id,
            content: self.content.trim().to_string(),
            rating: self.rating,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReviewAuthor {
    pub id: Uuid,
    pub email: String,
    pub first_name: Option<String>,
    pub image_url: Option<String>,
}

// Review response with author info
#[derive(Debug, Serialize)]
pub struct ReviewResponse {
    pub id: Uuid,
    pub content: String,
    pub rating: i16,
    pub likes: i32,
    pub dislikes: i32,
    pub created_at: DateTime<Utc>,
    pub author: Option<ReviewAuthor>,
}

impl ReviewResponse {
    pub fn new(review: Review, author: Option<ReviewAuthor>) -> Self {
        Self {
            id: review.id,
            content: review.content,
            rating: review.rating,
            likes: review.likes,
            dislikes: review.dislikes,
            created_at: review.created_at,
            author,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rating_outside_star_range_is_rejected() {
        for rating in [0, 6, -1] {
            let request = CreateReviewRequest {
                content: "Great combat, weak story".to_string(),
                rating,
            };
            assert!(request.validate().is_err(), "rating {rating} accepted");
        }
    }

    #[test]
    fn test_empty_content_is_rejected() {
        let request = CreateReviewRequest {
            content: String::new(),
            rating: 4,
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_into_new_review_trims_content() {
        let author_id = Uuid::new_v4();
        let request = CreateReviewRequest {
            content: "  Legendary Adventure is worth it \n".to_string(),
            rating: 5,
        };
        assert!(request.validate().is_ok());

        let new_review = request.into_new_review(author_id);
        assert_eq!(new_review.author_id, author_id);
        assert_eq!(new_review.content, "Legendary Adventure is worth it");
        assert_eq!(new_review.rating, 5);
    }
}
