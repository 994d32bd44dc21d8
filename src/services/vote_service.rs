use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::{
    error::VoteError,
    models::{ReviewCounts, VotePolarity},
    services::{
        review_aggregate::{self, ApplyError},
        vote_ledger::{self, CastVote},
    },
    store::{ReviewStore, VoteTx},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    DuplicateVote,
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    Accepted(ReviewCounts),
    Rejected(Rejection),
}

/// Runs the ledger write and the counter update as one transaction.
pub struct VoteService<S> {
    store: Arc<S>,
    reconcile: Arc<Notify>,
}

impl<S> Clone for VoteService<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            reconcile: self.reconcile.clone(),
        }
    }
}

impl<S: ReviewStore> VoteService<S> {
    /// `reconcile` is notified whenever a submission may have left the
    /// counters behind the ledger.
    pub fn new(store: Arc<S>, reconcile: Arc<Notify>) -> Self {
        Self { store, reconcile }
    }

    /// Any `Err` is safe to retry from the top: a vote that did land comes
    /// back as `Rejected(DuplicateVote)`.
    pub async fn submit_vote(
        &self,
        user_id: Uuid,
        review_id: Uuid,
        polarity: VotePolarity,
    ) -> Result<VoteOutcome, VoteError> {
        let mut tx = self.store.begin().await?;

        if !tx.review_exists(review_id).await? {
            return Ok(VoteOutcome::Rejected(Rejection::NotFound));
        }

        let vote = match vote_ledger::cast_vote(&mut tx, user_id, review_id, polarity).await? {
            CastVote::Applied(vote) => vote,
            CastVote::DuplicateVote => return Ok(VoteOutcome::Rejected(Rejection::DuplicateVote)),
            CastVote::ReviewNotFound => return Ok(VoteOutcome::Rejected(Rejection::NotFound)),
        };

        let counts = match review_aggregate::apply_vote(&mut tx, &vote).await {
            Ok(counts) => counts,
            // Dropping tx rolls the ledger entry back with it.
            Err(ApplyError::ReviewNotFound) => {
                return Ok(VoteOutcome::Rejected(Rejection::NotFound));
            }
            Err(ApplyError::Store(source)) => {
                drop(tx);
                tracing::error!(
                    vote_id = %vote.id,
                    %review_id,
                    error = %source,
                    "Counter update failed after ledger write, scheduling reconciliation"
                );
                self.reconcile.notify_one();
                return Err(VoteError::PartialApplyFailure {
                    vote_id: vote.id,
                    source,
                });
            }
        };

        if let Err(e) = tx.commit().await {
            // The commit may or may not have landed.
            tracing::warn!(vote_id = %vote.id, %review_id, error = %e, "Vote commit failed");
            self.reconcile.notify_one();
            return Err(VoteError::StorageUnavailable(e));
        }

        tracing::info!(
            %user_id,
            %review_id,
            %polarity,
            likes = counts.likes,
            dislikes = counts.dislikes,
            "Vote accepted"
        );

        Ok(VoteOutcome::Accepted(counts))
    }
}
