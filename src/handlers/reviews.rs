use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;
use validator::Validate;

use crate::{
    AppState,
    auth::AuthUser,
    error::{AppError, Result},
    models::{CreateReviewRequest, ReviewResponse, VoteRequest, VoteResponse},
    services::{
        user_service,
        vote_service::{Rejection, VoteOutcome},
    },
    store::ReviewStore,
};

#[derive(Debug, Deserialize)]
pub struct GetReviewsQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

// Row offset of a 1-based page, in i64 so it cannot overflow.
fn page_offset(page: u32, limit: u32) -> i64 {
    (i64::from(page) - 1) * i64::from(limit)
}

pub async fn get_reviews(
    State(state): State<AppState>,
    Query(params): Query<GetReviewsQuery>,
) -> Result<Json<Value>> {
    let page = params.page.unwrap_or(1).max(1);
    let limit = params.limit.unwrap_or(25).clamp(1, 100); // Max 100 per page
    let offset = page_offset(page, limit);

    let reviews = state.store.list_reviews(i64::from(limit), offset).await?;
    let total_count = state.store.count_reviews().await?;

    let author_ids: Vec<Uuid> = reviews.iter().map(|review| review.author_id).collect();
    let authors = user_service::get_review_authors(&state.db, &author_ids).await?;

    let reviews: Vec<ReviewResponse> = reviews
        .into_iter()
        .map(|review| {
            let author = authors.get(&review.author_id).cloned();
            ReviewResponse::new(review, author)
        })
        .collect();

    Ok(Json(json!({
        "reviews": reviews,
        "pagination": {
            "page": page,
            "limit": limit,
            "total": total_count,
            "pages": (total_count + limit as i64 - 1) / limit as i64
        }
    })))
}

pub async fn get_review(
    State(state): State<AppState>,
    Path(review_id): Path<Uuid>,
) -> Result<Json<ReviewResponse>> {
    let review = state
        .store
        .get_review(review_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Review not found".to_string()))?;

    let author = user_service::get_review_authors(&state.db, &[review.author_id])
        .await?
        .remove(&review.author_id);

    Ok(Json(ReviewResponse::new(review, author)))
}

pub async fn create_review(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<CreateReviewRequest>,
) -> Result<(StatusCode, Json<ReviewResponse>)> {
    payload.validate()?;

    let rate_limit_key = format!("create_review:{}", auth_user.user_id);
    if !state
        .redis
        .check_rate_limit(
            &rate_limit_key,
            state.config.review_rate_limit_per_hour,
            3600,
        )
        .await?
    {
        return Err(AppError::RateLimit);
    }

    let new_review = payload.into_new_review(auth_user.user_id);
    if new_review.content.is_empty() {
        return Err(AppError::BadRequest(
            "Review content cannot be blank".to_string(),
        ));
    }

    let review = state.store.create_review(new_review).await?;
    tracing::info!(review_id = %review.id, author_id = %review.author_id, rating = review.rating, "Review created");

    let author = user_service::get_review_authors(&state.db, &[review.author_id])
        .await?
        .remove(&review.author_id);

    Ok((StatusCode::CREATED, Json(ReviewResponse::new(review, author))))
}

pub async fn vote_review(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(review_id): Path<Uuid>,
    Json(payload): Json<VoteRequest>,
) -> Result<Json<VoteResponse>> {
    let rate_limit_key = format!("vote_review:{}", auth_user.user_id);
    if !state
        .redis
        .check_rate_limit(&rate_limit_key, state.config.vote_rate_limit_per_hour, 3600)
        .await?
    {
        return Err(AppError::RateLimit);
    }

    let outcome = state
        .votes
        .submit_vote(auth_user.user_id, review_id, payload.polarity)
        .await?;

    match outcome {
        VoteOutcome::Accepted(counts) => Ok(Json(VoteResponse {
            likes: counts.likes,
            dislikes: counts.dislikes,
            polarity: payload.polarity,
        })),
        VoteOutcome::Rejected(Rejection::DuplicateVote) => Err(AppError::Conflict(
            "You have already voted on this review".to_string(),
        )),
        VoteOutcome::Rejected(Rejection::NotFound) => {
            Err(AppError::NotFound("Review not found".to_string()))
        }
    }
}
