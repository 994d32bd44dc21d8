use thiserror::Error;

use crate::{
    error::StoreError,
    models::{ReviewCounts, Vote},
    store::VoteTx,
};

#[derive(Error, Debug)]
pub enum ApplyError {
    #[error("Review not found")]
    ReviewNotFound,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Counts a ledger entry on its review and returns the new totals.
///
/// The vote's `applied` flag is flipped in the same transaction as the
/// increment. A vote that was already applied is not counted again; the
/// current totals are returned instead.
pub async fn apply_vote<T: VoteTx>(tx: &mut T, vote: &Vote) -> Result<ReviewCounts, ApplyError> {
    if !tx.mark_applied(vote.id).await? {
        tracing::debug!(vote_id = %vote.id, "Vote already applied, skipping increment");
        return tx
            .read_counts(vote.review_id)
            .await?
            .ok_or(ApplyError::ReviewNotFound);
    }

    let counts = tx
        .increment_counter(vote.review_id, vote.polarity)
        .await?
        .ok_or(ApplyError::ReviewNotFound)?;

    tracing::debug!(
        review_id = %vote.review_id,
        likes = counts.likes,
        dislikes = counts.dislikes,
        "Review counters updated"
    );

    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{NewReview, VotePolarity},
        services::vote_ledger::{self, CastVote},
        store::{MemoryReviewStore, ReviewStore},
    };
    use uuid::Uuid;

    #[tokio::test]
    async fn test_redelivered_apply_does_not_double_count() {
        let store = MemoryReviewStore::new();
        let review = store
            .create_review(NewReview {
                author_id: Uuid::new_v4(),
                content: "Great soundtrack".to_string(),
                rating: 5,
            })
            .await
            .unwrap();

        let mut tx = store.begin().await.unwrap();
        let CastVote::Applied(vote) =
            vote_ledger::cast_vote(&mut tx, Uuid::new_v4(), review.id, VotePolarity::Like)
                .await
                .unwrap()
        else {
            panic!("expected the vote to be recorded");
        };

        let first = apply_vote(&mut tx, &vote).await.unwrap();
        let again = apply_vote(&mut tx, &vote).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(first, ReviewCounts { likes: 1, dislikes: 0 });
        assert_eq!(again, first);
        assert_eq!(store.ledger_tally(review.id).await, first);
    }

    #[tokio::test]
    async fn test_apply_surfaces_store_failure() {
        let store = MemoryReviewStore::new();
        let review = store
            .create_review(NewReview {
                author_id: Uuid::new_v4(),
                content: "Crashes on launch".to_string(),
                rating: 1,
            })
            .await
            .unwrap();
        store.fail_increments(true);

        let mut tx = store.begin().await.unwrap();
        let CastVote::Applied(vote) =
            vote_ledger::cast_vote(&mut tx, Uuid::new_v4(), review.id, VotePolarity::Dislike)
                .await
                .unwrap()
        else {
            panic!("expected the vote to be recorded");
        };

        let result = apply_vote(&mut tx, &vote).await;
        assert!(matches!(result, Err(ApplyError::Store(_))));
    }
}
