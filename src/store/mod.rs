//! Storage contract the vote flow depends on.
//!
//! The ledger and the aggregate only ever touch storage through a `VoteTx`,
//! so a single vote submission is one transaction: dropping the handle without
//! calling `commit` rolls every write back.

pub mod memory;
pub mod postgres;

use std::future::Future;

use uuid::Uuid;

use crate::{
    error::StoreError,
    models::{NewReview, NewVote, Review, ReviewCounts, Vote, VotePolarity},
};

pub use memory::MemoryReviewStore;
pub use postgres::PgReviewStore;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Outcome of a reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Reviews whose counters or applied flags looked inconsistent.
    pub scanned: usize,
    /// Reviews whose counters were rewritten.
    pub repaired: Vec<Uuid>,
    /// Reviews left for the next pass because their repair failed.
    pub failed: Vec<Uuid>,
}

pub trait ReviewStore: Send + Sync + 'static {
    type Tx: VoteTx;

    fn begin(&self) -> impl Future<Output = StoreResult<Self::Tx>> + Send;

    fn create_review(&self, review: NewReview)
    -> impl Future<Output = StoreResult<Review>> + Send;

    fn get_review(&self, review_id: Uuid)
    -> impl Future<Output = StoreResult<Option<Review>>> + Send;

    /// Newest first.
    fn list_reviews(
        &self,
        limit: i64,
        offset: i64,
    ) -> impl Future<Output = StoreResult<Vec<Review>>> + Send;

    fn count_reviews(&self) -> impl Future<Output = StoreResult<i64>> + Send;

    /// Reviews whose counters disagree with their ledger entries or that still
    /// have unapplied entries. Read without locks, so it may include reviews
    /// an in-flight vote is about to settle.
    fn drifted_reviews(&self) -> impl Future<Output = StoreResult<Vec<Uuid>>> + Send;

    /// Rewrites one review's counters from its ledger entries under the review
    /// lock and marks those entries applied. Returns true when the counters
    /// changed.
    fn reconcile_review(&self, review_id: Uuid) -> impl Future<Output = StoreResult<bool>> + Send;
}

pub trait VoteTx: Send {
    fn review_exists(&mut self, review_id: Uuid)
    -> impl Future<Output = StoreResult<bool>> + Send;

    /// Unique-constrained insert. `None` means a vote for this
    /// (user, review) pair already exists.
    fn insert_vote(
        &mut self,
        vote: &NewVote,
    ) -> impl Future<Output = StoreResult<Option<Vote>>> + Send;

    /// Flips `applied` from false to true. Returns false when it was already set.
    fn mark_applied(&mut self, vote_id: Uuid) -> impl Future<Output = StoreResult<bool>> + Send;

    /// Atomic `counter = counter + 1`. `None` when the review does not exist.
    fn increment_counter(
        &mut self,
        review_id: Uuid,
        polarity: VotePolarity,
    ) -> impl Future<Output = StoreResult<Option<ReviewCounts>>> + Send;

    fn read_counts(
        &mut self,
        review_id: Uuid,
    ) -> impl Future<Output = StoreResult<Option<ReviewCounts>>> + Send;

    fn commit(self) -> impl Future<Output = StoreResult<()>> + Send
    where
        Self: Sized;
}
