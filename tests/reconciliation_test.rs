mod common;

use std::time::Duration;

use anyhow::Result;
use common::{assert_counts_match_ledger, create_review, test_harness};
use game_reviews::error::VoteError;
use game_reviews::models::{ReviewCounts, VotePolarity};
use game_reviews::services::reconciliation::ReconciliationJob;
use game_reviews::services::vote_ledger::{self, CastVote};
use game_reviews::services::vote_service::{Rejection, VoteOutcome};
use game_reviews::store::{ReviewStore, VoteTx};
use uuid::Uuid;

#[tokio::test]
async fn test_reconciliation_repairs_ledger_entry_left_unapplied() -> Result<()> {
    let harness = test_harness();
    let review = create_review(&harness.store, 4).await?;

    harness
        .votes
        .submit_vote(Uuid::new_v4(), review.id, VotePolarity::Like)
        .await?;

    // A coordinator without transactions crashes between the two writes:
    // the ledger entry is committed, the counter never moves.
    let mut tx = harness.store.begin().await?;
    let cast = vote_ledger::cast_vote(&mut tx, Uuid::new_v4(), review.id, VotePolarity::Dislike)
        .await?;
    assert!(matches!(cast, CastVote::Applied(_)));
    tx.commit().await?;

    let stored = harness.store.get_review(review.id).await?.unwrap();
    assert_eq!(stored.counts(), ReviewCounts { likes: 1, dislikes: 0 });

    let job = ReconciliationJob::new(
        harness.store.clone(),
        harness.reconcile.clone(),
        Duration::from_secs(300),
    );
    let report = job.run_once().await?;
    assert_eq!(report.repaired, vec![review.id]);

    let stored = harness.store.get_review(review.id).await?.unwrap();
    assert_eq!(stored.counts(), ReviewCounts { likes: 1, dislikes: 1 });
    assert_counts_match_ledger(&harness.store, review.id).await?;

    // Repaired entries are marked applied, so the next pass is a no-op
    let report = job.run_once().await?;
    assert_eq!(report.scanned, 0);
    assert!(report.repaired.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_failed_increment_rolls_back_ledger_and_requests_reconciliation() -> Result<()> {
    let harness = test_harness();
    let review = create_review(&harness.store, 3).await?;
    let user_id = Uuid::new_v4();

    harness.store.fail_increments(true);
    let result = harness
        .votes
        .submit_vote(user_id, review.id, VotePolarity::Like)
        .await;
    assert!(matches!(
        result,
        Err(VoteError::PartialApplyFailure { .. })
    ));

    // No orphan ledger entry, no counter change
    assert!(harness.store.vote(user_id, review.id).await.is_none());
    assert_counts_match_ledger(&harness.store, review.id).await?;

    // The failure woke the reconciler
    tokio::time::timeout(Duration::from_secs(1), harness.reconcile.notified()).await?;

    harness.store.fail_increments(false);
    let outcome = harness
        .votes
        .submit_vote(user_id, review.id, VotePolarity::Like)
        .await?;
    assert_eq!(
        outcome,
        VoteOutcome::Accepted(ReviewCounts { likes: 1, dislikes: 0 })
    );
    Ok(())
}

#[tokio::test]
async fn test_ambiguous_commit_retry_yields_duplicate() -> Result<()> {
    let harness = test_harness();
    let review = create_review(&harness.store, 5).await?;
    let user_id = Uuid::new_v4();

    harness.store.fail_commits(true);
    let result = harness
        .votes
        .submit_vote(user_id, review.id, VotePolarity::Dislike)
        .await;
    assert!(matches!(result, Err(VoteError::StorageUnavailable(_))));
    harness.store.fail_commits(false);

    // The write actually landed; retrying must not count it twice
    let outcome = harness
        .votes
        .submit_vote(user_id, review.id, VotePolarity::Dislike)
        .await?;
    assert_eq!(outcome, VoteOutcome::Rejected(Rejection::DuplicateVote));

    let stored = harness.store.get_review(review.id).await?.unwrap();
    assert_eq!(stored.counts(), ReviewCounts { likes: 0, dislikes: 1 });
    assert_counts_match_ledger(&harness.store, review.id).await?;
    Ok(())
}

#[tokio::test]
async fn test_background_job_runs_when_notified() -> Result<()> {
    let harness = test_harness();
    let review = create_review(&harness.store, 2).await?;

    let mut tx = harness.store.begin().await?;
    vote_ledger::cast_vote(&mut tx, Uuid::new_v4(), review.id, VotePolarity::Like).await?;
    tx.commit().await?;

    // Long period so only the first tick and the notification drive passes
    let handle = ReconciliationJob::new(
        harness.store.clone(),
        harness.reconcile.clone(),
        Duration::from_secs(3600),
    )
    .start();

    harness.reconcile.notify_one();

    let mut repaired = false;
    for _ in 0..50 {
        let stored = harness.store.get_review(review.id).await?.unwrap();
        if stored.counts() == (ReviewCounts { likes: 1, dislikes: 0 }) {
            repaired = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    handle.abort();

    assert!(repaired, "background reconciliation never repaired the review");
    Ok(())
}

#[tokio::test]
async fn test_failing_review_does_not_block_the_rest_of_the_pass() -> Result<()> {
    let harness = test_harness();
    let stuck = create_review(&harness.store, 1).await?;
    let healthy = create_review(&harness.store, 5).await?;

    for review_id in [stuck.id, healthy.id] {
        let mut tx = harness.store.begin().await?;
        vote_ledger::cast_vote(&mut tx, Uuid::new_v4(), review_id, VotePolarity::Like).await?;
        tx.commit().await?;
    }

    harness.store.fail_reconcile_of(stuck.id, true);
    let job = ReconciliationJob::new(
        harness.store.clone(),
        harness.reconcile.clone(),
        Duration::from_secs(300),
    );

    let report = job.run_once().await?;
    assert_eq!(report.scanned, 2);
    assert_eq!(report.repaired, vec![healthy.id]);
    assert_eq!(report.failed, vec![stuck.id]);
    assert_counts_match_ledger(&harness.store, healthy.id).await?;

    // Left for the next pass
    harness.store.fail_reconcile_of(stuck.id, false);
    let report = job.run_once().await?;
    assert_eq!(report.repaired, vec![stuck.id]);
    assert!(report.failed.is_empty());
    assert_counts_match_ledger(&harness.store, stuck.id).await?;
    Ok(())
}
