// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use std::sync::Arc;

use anyhow::Result;
use game_reviews::models::{NewReview, Review};
use game_reviews::services::vote_service::VoteService;
use game_reviews::store::{MemoryReviewStore, ReviewStore};
use tokio::sync::Notify;
use uuid::Uuid;

pub struct TestHarness {
    pub store: Arc<MemoryReviewStore>,
    pub votes: VoteService<MemoryReviewStore>,
    pub reconcile: Arc<Notify>,
}

/// Vote service over a fresh in-memory store.
pub fn test_harness() -> TestHarness {
    let store = Arc::new(MemoryReviewStore::new());
    let reconcile = Arc::new(Notify::new());
    let votes = VoteService::new(store.clone(), reconcile.clone());
    TestHarness {
        store,
        votes,
        reconcile,
    }
}

pub async fn create_review(store: &MemoryReviewStore, rating: i16) -> Result<Review> {
    let review = store
        .create_review(NewReview {
            author_id: Uuid::new_v4(),
            content: "Embark on an epic journey".to_string(),
            rating,
        })
        .await?;
    Ok(review)
}

/// Asserts the stored counters equal what the ledger says.
pub async fn assert_counts_match_ledger(store: &MemoryReviewStore, review_id: Uuid) -> Result<()> {
    let review = store
        .get_review(review_id)
        .await?
        .expect("review should exist");
    let tally = store.ledger_tally(review_id).await;
    assert_eq!(
        review.counts(),
        tally,
        "counters drifted from ledger for review {review_id}"
    );
    Ok(())
}
