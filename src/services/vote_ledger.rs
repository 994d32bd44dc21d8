use uuid::Uuid;

use crate::{
    error::StoreError,
    models::{NewVote, Vote, VotePolarity},
    store::{StoreResult, VoteTx},
};

#[derive(Debug, Clone)]
pub enum CastVote {
    /// The ledger entry was written. It still has to be applied to the review.
    Applied(Vote),
    DuplicateVote,
    ReviewNotFound,
}

/// Records the user's vote on the review, at most once per pair.
///
/// Exclusivity comes from the store's unique (user_id, review_id) constraint
/// on a single insert, never from a lookup beforehand, so concurrent casts for
/// the same pair produce exactly one `Applied`.
pub async fn cast_vote<T: VoteTx>(
    tx: &mut T,
    user_id: Uuid,
    review_id: Uuid,
    polarity: VotePolarity,
) -> StoreResult<CastVote> {
    let vote = NewVote::new(user_id, review_id, polarity);

    match tx.insert_vote(&vote).await {
        Ok(Some(vote)) => {
            tracing::debug!(vote_id = %vote.id, %user_id, %review_id, %polarity, "Ledger entry written");
            Ok(CastVote::Applied(vote))
        }
        Ok(None) => {
            tracing::debug!(%user_id, %review_id, "Duplicate vote rejected");
            Ok(CastVote::DuplicateVote)
        }
        Err(StoreError::MissingReference(reference)) => {
            tracing::debug!(%review_id, %reference, "Vote references a missing row");
            Ok(CastVote::ReviewNotFound)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::NewReview,
        store::{MemoryReviewStore, ReviewStore},
    };

    #[tokio::test]
    async fn test_second_cast_for_same_pair_is_duplicate() {
        let store = MemoryReviewStore::new();
        let review = store
            .create_review(NewReview {
                author_id: Uuid::new_v4(),
                content: "Too short".to_string(),
                rating: 2,
            })
            .await
            .unwrap();
        let user_id = Uuid::new_v4();

        let mut tx = store.begin().await.unwrap();
        let first = cast_vote(&mut tx, user_id, review.id, VotePolarity::Dislike)
            .await
            .unwrap();
        let CastVote::Applied(vote) = first else {
            panic!("expected first cast to be applied, got {first:?}");
        };
        assert!(!vote.applied);
        assert_eq!(vote.polarity, VotePolarity::Dislike);

        let second = cast_vote(&mut tx, user_id, review.id, VotePolarity::Like)
            .await
            .unwrap();
        assert!(matches!(second, CastVote::DuplicateVote));
    }

    #[tokio::test]
    async fn test_cast_on_missing_review_is_not_found() {
        let store = MemoryReviewStore::new();
        let mut tx = store.begin().await.unwrap();

        let outcome = cast_vote(&mut tx, Uuid::new_v4(), Uuid::new_v4(), VotePolarity::Like)
            .await
            .unwrap();
        assert!(matches!(outcome, CastVote::ReviewNotFound));
    }
}
