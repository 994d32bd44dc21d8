//! In-process `ReviewStore`.
//!
//! A transaction holds the store-wide lock for its whole lifetime, so
//! transactions are serialized. Writes go straight to the shared state and a
//! snapshot taken at `begin` is restored if the handle is dropped uncommitted.
//! Faults can be switched on to exercise the failure paths of the vote flow.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{ReviewStore, StoreResult, VoteTx};
use crate::{
    error::StoreError,
    models::{NewReview, NewVote, Review, ReviewCounts, Vote, VotePolarity},
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    reviews: HashMap<Uuid, Review>,
    votes: HashMap<(Uuid, Uuid), Vote>,
}

impl MemoryState {
    fn tally(&self, review_id: Uuid) -> ReviewCounts {
        self.votes
            .values()
            .filter(|vote| vote.review_id == review_id)
            .fold(ReviewCounts::default(), |mut acc, vote| {
                match vote.polarity {
                    VotePolarity::Like => acc.likes += 1,
                    VotePolarity::Dislike => acc.dislikes += 1,
                }
                acc
            })
    }
}

#[derive(Debug, Default)]
struct Faults {
    unavailable: AtomicBool,
    fail_increments: AtomicBool,
    fail_commits: AtomicBool,
    fail_reconcile: std::sync::Mutex<HashSet<Uuid>>,
}

#[derive(Clone, Default)]
pub struct MemoryReviewStore {
    state: Arc<Mutex<MemoryState>>,
    faults: Arc<Faults>,
}

impl MemoryReviewStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every new transaction and query fail as if the database were down.
    pub fn set_unavailable(&self, on: bool) {
        self.faults.unavailable.store(on, Ordering::SeqCst);
    }

    /// Makes `increment_counter` fail after the ledger insert went through.
    pub fn fail_increments(&self, on: bool) {
        self.faults.fail_increments.store(on, Ordering::SeqCst);
    }

    /// Makes `commit` fail after applying the writes, leaving the outcome
    /// ambiguous to the caller the way a dropped connection would.
    pub fn fail_commits(&self, on: bool) {
        self.faults.fail_commits.store(on, Ordering::SeqCst);
    }

    /// Makes `reconcile_review` fail for one review.
    pub fn fail_reconcile_of(&self, review_id: Uuid, on: bool) {
        let mut failing = self
            .faults
            .fail_reconcile
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if on {
            failing.insert(review_id);
        } else {
            failing.remove(&review_id);
        }
    }

    /// Likes and dislikes counted from ledger entries.
    pub async fn ledger_tally(&self, review_id: Uuid) -> ReviewCounts {
        self.state.lock().await.tally(review_id)
    }

    pub async fn vote(&self, user_id: Uuid, review_id: Uuid) -> Option<Vote> {
        self.state
            .lock()
            .await
            .votes
            .get(&(user_id, review_id))
            .cloned()
    }

    pub async fn vote_count(&self) -> usize {
        self.state.lock().await.votes.len()
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.faults.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".to_string()));
        }
        Ok(())
    }
}

impl ReviewStore for MemoryReviewStore {
    type Tx = MemoryVoteTx;

    async fn begin(&self) -> StoreResult<MemoryVoteTx> {
        self.check_available()?;
        let guard = self.state.clone().lock_owned().await;
        let snapshot = guard.clone();
        Ok(MemoryVoteTx {
            guard,
            snapshot: Some(snapshot),
            faults: self.faults.clone(),
        })
    }

    async fn create_review(&self, review: NewReview) -> StoreResult<Review> {
        self.check_available()?;
        let review = Review {
            id: Uuid::new_v4(),
            author_id: review.author_id,
            content: review.content,
            rating: review.rating,
            likes: 0,
            dislikes: 0,
            created_at: Utc::now(),
        };
        self.state
            .lock()
            .await
            .reviews
            .insert(review.id, review.clone());
        Ok(review)
    }

    async fn get_review(&self, review_id: Uuid) -> StoreResult<Option<Review>> {
        self.check_available()?;
        Ok(self.state.lock().await.reviews.get(&review_id).cloned())
    }

    async fn list_reviews(&self, limit: i64, offset: i64) -> StoreResult<Vec<Review>> {
        self.check_available()?;
        let state = self.state.lock().await;
        let mut reviews: Vec<Review> = state.reviews.values().cloned().collect();
        reviews.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));

        Ok(reviews
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn count_reviews(&self) -> StoreResult<i64> {
        self.check_available()?;
        Ok(self.state.lock().await.reviews.len() as i64)
    }

    async fn drifted_reviews(&self) -> StoreResult<Vec<Uuid>> {
        self.check_available()?;
        let state = self.state.lock().await;

        Ok(state
            .reviews
            .values()
            .filter(|review| {
                review.counts() != state.tally(review.id)
                    || state
                        .votes
                        .values()
                        .any(|vote| vote.review_id == review.id && !vote.applied)
            })
            .map(|review| review.id)
            .collect())
    }

    async fn reconcile_review(&self, review_id: Uuid) -> StoreResult<bool> {
        self.check_available()?;
        let failing = self
            .faults
            .fail_reconcile
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(&review_id);
        if failing {
            return Err(StoreError::Unavailable(format!(
                "injected reconcile failure for review {review_id}"
            )));
        }

        let mut state = self.state.lock().await;
        let tally = state.tally(review_id);
        let Some(review) = state.reviews.get_mut(&review_id) else {
            return Ok(false);
        };

        let repaired = review.counts() != tally;
        if repaired {
            review.likes = tally.likes;
            review.dislikes = tally.dislikes;
        }
        for vote in state
            .votes
            .values_mut()
            .filter(|vote| vote.review_id == review_id)
        {
            vote.applied = true;
        }

        Ok(repaired)
    }
}

pub struct MemoryVoteTx {
    guard: OwnedMutexGuard<MemoryState>,
    snapshot: Option<MemoryState>,
    faults: Arc<Faults>,
}

impl Drop for MemoryVoteTx {
    fn drop(&mut self) {
        // Uncommitted: roll back.
        if let Some(snapshot) = self.snapshot.take() {
            *self.guard = snapshot;
        }
    }
}

impl VoteTx for MemoryVoteTx {
    async fn review_exists(&mut self, review_id: Uuid) -> StoreResult<bool> {
        Ok(self.guard.reviews.contains_key(&review_id))
    }

    async fn insert_vote(&mut self, vote: &NewVote) -> StoreResult<Option<Vote>> {
        if !self.guard.reviews.contains_key(&vote.review_id) {
            return Err(StoreError::MissingReference(format!(
                "review {}",
                vote.review_id
            )));
        }

        let key = (vote.user_id, vote.review_id);
        if self.guard.votes.contains_key(&key) {
            return Ok(None);
        }

        let row = Vote {
            id: vote.id,
            user_id: vote.user_id,
            review_id: vote.review_id,
            polarity: vote.polarity,
            applied: false,
            created_at: vote.created_at,
        };
        self.guard.votes.insert(key, row.clone());
        Ok(Some(row))
    }

    async fn mark_applied(&mut self, vote_id: Uuid) -> StoreResult<bool> {
        let vote = self
            .guard
            .votes
            .values_mut()
            .find(|vote| vote.id == vote_id && !vote.applied);

        match vote {
            Some(vote) => {
                vote.applied = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn increment_counter(
        &mut self,
        review_id: Uuid,
        polarity: VotePolarity,
    ) -> StoreResult<Option<ReviewCounts>> {
        if self.faults.fail_increments.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "injected increment failure".to_string(),
            ));
        }

        let Some(review) = self.guard.reviews.get_mut(&review_id) else {
            return Ok(None);
        };
        match polarity {
            VotePolarity::Like => review.likes += 1,
            VotePolarity::Dislike => review.dislikes += 1,
        }
        Ok(Some(review.counts()))
    }

    async fn read_counts(&mut self, review_id: Uuid) -> StoreResult<Option<ReviewCounts>> {
        Ok(self.guard.reviews.get(&review_id).map(Review::counts))
    }

    async fn commit(mut self) -> StoreResult<()> {
        self.snapshot = None;
        if self.faults.fail_commits.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "connection lost during commit".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store_with_review() -> (MemoryReviewStore, Review) {
        let store = MemoryReviewStore::new();
        let review = store
            .create_review(NewReview {
                author_id: Uuid::new_v4(),
                content: "Solid co-op".to_string(),
                rating: 4,
            })
            .await
            .unwrap();
        (store, review)
    }

    #[tokio::test]
    async fn test_dropped_transaction_rolls_back_writes() {
        let (store, review) = store_with_review().await;
        let user_id = Uuid::new_v4();

        {
            let mut tx = store.begin().await.unwrap();
            let vote = NewVote::new(user_id, review.id, VotePolarity::Like);
            assert!(tx.insert_vote(&vote).await.unwrap().is_some());
            tx.increment_counter(review.id, VotePolarity::Like)
                .await
                .unwrap();
        }

        assert_eq!(store.vote_count().await, 0);
        let stored = store.get_review(review.id).await.unwrap().unwrap();
        assert_eq!(stored.counts(), ReviewCounts::default());
    }

    #[tokio::test]
    async fn test_insert_vote_conflicts_on_same_pair() {
        let (store, review) = store_with_review().await;
        let user_id = Uuid::new_v4();

        let mut tx = store.begin().await.unwrap();
        let first = NewVote::new(user_id, review.id, VotePolarity::Like);
        let second = NewVote::new(user_id, review.id, VotePolarity::Dislike);
        assert!(tx.insert_vote(&first).await.unwrap().is_some());
        assert!(tx.insert_vote(&second).await.unwrap().is_none());
        tx.commit().await.unwrap();

        let vote = store.vote(user_id, review.id).await.unwrap();
        assert_eq!(vote.polarity, VotePolarity::Like);
    }

    #[tokio::test]
    async fn test_unavailable_store_refuses_transactions() {
        let (store, _review) = store_with_review().await;
        store.set_unavailable(true);
        assert!(matches!(
            store.begin().await,
            Err(StoreError::Unavailable(_))
        ));
    }
}
