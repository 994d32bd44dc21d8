use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{ReviewStore, StoreResult, VoteTx};
use crate::{
    error::StoreError,
    models::{NewReview, NewVote, Review, ReviewCounts, Vote, VotePolarity},
};

#[derive(Clone)]
pub struct PgReviewStore {
    db: PgPool,
}

impl PgReviewStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

impl ReviewStore for PgReviewStore {
    type Tx = PgVoteTx;

    async fn begin(&self) -> StoreResult<PgVoteTx> {
        let tx = self.db.begin().await?;
        Ok(PgVoteTx { tx })
    }

    async fn create_review(&self, review: NewReview) -> StoreResult<Review> {
        let review = sqlx::query_as::<_, Review>(
            r#"
            INSERT INTO reviews (id, author_id, content, rating, likes, dislikes, created_at)
            VALUES ($1, $2, $3, $4, 0, 0, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(review.author_id)
        .bind(&review.content)
        .bind(review.rating)
        .bind(chrono::Utc::now())
        .fetch_one(&self.db)
        .await
        .map_err(StoreError::from_sqlx)?;

        Ok(review)
    }

    async fn get_review(&self, review_id: Uuid) -> StoreResult<Option<Review>> {
        let review = sqlx::query_as::<_, Review>("SELECT * FROM reviews WHERE id = $1")
            .bind(review_id)
            .fetch_optional(&self.db)
            .await?;

        Ok(review)
    }

    async fn list_reviews(&self, limit: i64, offset: i64) -> StoreResult<Vec<Review>> {
        let reviews = sqlx::query_as::<_, Review>(
            "SELECT * FROM reviews ORDER BY created_at DESC, id LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;

        Ok(reviews)
    }

    async fn count_reviews(&self) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reviews")
            .fetch_one(&self.db)
            .await?;

        Ok(count)
    }

    async fn drifted_reviews(&self) -> StoreResult<Vec<Uuid>> {
        let candidates: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT r.id
            FROM reviews r
            LEFT JOIN review_votes v ON v.review_id = r.id
            GROUP BY r.id, r.likes, r.dislikes
            HAVING r.likes <> COUNT(v.id) FILTER (WHERE v.polarity = 'like')
                OR r.dislikes <> COUNT(v.id) FILTER (WHERE v.polarity = 'dislike')
                OR COALESCE(BOOL_OR(NOT v.applied), false)
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        Ok(candidates)
    }

    // The review row is locked first so in-flight votes that already
    // incremented it have committed, and votes that have not yet incremented
    // it stay invisible to the recount and apply on top of it afterwards.
    // NO KEY UPDATE does not wait on the key-share locks taken by ledger
    // inserts referencing the review.
    async fn reconcile_review(&self, review_id: Uuid) -> StoreResult<bool> {
        let mut tx = self.db.begin().await?;

        let current = sqlx::query_as::<_, ReviewCounts>(
            "SELECT likes, dislikes FROM reviews WHERE id = $1 FOR NO KEY UPDATE",
        )
        .bind(review_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(current) = current else {
            return Ok(false);
        };

        let tally = sqlx::query_as::<_, ReviewCounts>(
            r#"
            SELECT
                (COUNT(*) FILTER (WHERE polarity = 'like'))::int AS likes,
                (COUNT(*) FILTER (WHERE polarity = 'dislike'))::int AS dislikes
            FROM review_votes
            WHERE review_id = $1
            "#,
        )
        .bind(review_id)
        .fetch_one(&mut *tx)
        .await?;

        let repaired = tally != current;
        if repaired {
            sqlx::query("UPDATE reviews SET likes = $2, dislikes = $3 WHERE id = $1")
                .bind(review_id)
                .bind(tally.likes)
                .bind(tally.dislikes)
                .execute(&mut *tx)
                .await?;

            tracing::warn!(
                %review_id,
                stored_likes = current.likes,
                stored_dislikes = current.dislikes,
                likes = tally.likes,
                dislikes = tally.dislikes,
                "Repaired drifted review counters"
            );
        }

        sqlx::query("UPDATE review_votes SET applied = true WHERE review_id = $1 AND NOT applied")
            .bind(review_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(repaired)
    }
}

pub struct PgVoteTx {
    tx: Transaction<'static, Postgres>,
}

impl VoteTx for PgVoteTx {
    async fn review_exists(&mut self, review_id: Uuid) -> StoreResult<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM reviews WHERE id = $1)")
            .bind(review_id)
            .fetch_one(&mut *self.tx)
            .await?;

        Ok(exists)
    }

    async fn insert_vote(&mut self, vote: &NewVote) -> StoreResult<Option<Vote>> {
        let vote = sqlx::query_as::<_, Vote>(
            r#"
            INSERT INTO review_votes (id, user_id, review_id, polarity, applied, created_at)
            VALUES ($1, $2, $3, $4, false, $5)
            ON CONFLICT (user_id, review_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(vote.id)
        .bind(vote.user_id)
        .bind(vote.review_id)
        .bind(vote.polarity)
        .bind(vote.created_at)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(StoreError::from_sqlx)?;

        Ok(vote)
    }

    async fn mark_applied(&mut self, vote_id: Uuid) -> StoreResult<bool> {
        let result =
            sqlx::query("UPDATE review_votes SET applied = true WHERE id = $1 AND NOT applied")
                .bind(vote_id)
                .execute(&mut *self.tx)
                .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn increment_counter(
        &mut self,
        review_id: Uuid,
        polarity: VotePolarity,
    ) -> StoreResult<Option<ReviewCounts>> {
        let query = match polarity {
            VotePolarity::Like => {
                "UPDATE reviews SET likes = likes + 1 WHERE id = $1 RETURNING likes, dislikes"
            }
            VotePolarity::Dislike => {
                "UPDATE reviews SET dislikes = dislikes + 1 WHERE id = $1 RETURNING likes, dislikes"
            }
        };

        let counts = sqlx::query_as::<_, ReviewCounts>(query)
            .bind(review_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(counts)
    }

    async fn read_counts(&mut self, review_id: Uuid) -> StoreResult<Option<ReviewCounts>> {
        let counts =
            sqlx::query_as::<_, ReviewCounts>("SELECT likes, dislikes FROM reviews WHERE id = $1")
                .bind(review_id)
                .fetch_optional(&mut *self.tx)
                .await?;

        Ok(counts)
    }

    async fn commit(self) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
