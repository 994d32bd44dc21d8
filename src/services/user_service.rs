use std::collections::HashMap;

use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    error::Result,
    models::{ReviewAuthor, User, UserProfile},
    redis::RedisClient,
};

fn user_cache_key(external_id: &str) -> String {
    format!("user:{}", external_id)
}

pub async fn get_user_by_external_id(db: &PgPool, external_id: &str) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE external_id = $1")
        .bind(external_id)
        .fetch_optional(db)
        .await?;

    Ok(user)
}

/// Looks the user up in Redis first and falls back to Postgres, caching the
/// result. Soft-deleted users are never returned.
pub async fn get_active_user_cached(
    db: &PgPool,
    redis: &RedisClient,
    external_id: &str,
    ttl_seconds: usize,
) -> Result<Option<User>> {
    let key = user_cache_key(external_id);

    if let Some(cached) = redis.cache_get(&key).await? {
        match serde_json::from_str::<User>(&cached) {
            Ok(user) if user.is_active() => return Ok(Some(user)),
            Ok(_) => return Ok(None),
            Err(e) => {
                tracing::warn!("Discarding unreadable cached user {}: {}", external_id, e);
                redis.cache_delete(&key).await?;
            }
        }
    }

    let Some(user) = get_user_by_external_id(db, external_id).await? else {
        return Ok(None);
    };

    redis
        .cache_set(&key, &serde_json::to_string(&user)?, ttl_seconds)
        .await?;

    Ok(user.is_active().then_some(user))
}

pub async fn invalidate_user_cache(redis: &RedisClient, external_id: &str) -> Result<()> {
    redis.cache_delete(&user_cache_key(external_id)).await
}

/// Creates the user or refreshes its profile. A previously soft-deleted user
/// is restored.
pub async fn upsert_user(db: &PgPool, profile: &UserProfile) -> Result<User> {
    let now = chrono::Utc::now();

    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (id, external_id, email, first_name, last_name, image_url, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
        ON CONFLICT (external_id)
        DO UPDATE SET
            email = EXCLUDED.email,
            first_name = EXCLUDED.first_name,
            last_name = EXCLUDED.last_name,
            image_url = EXCLUDED.image_url,
            updated_at = EXCLUDED.updated_at,
            deleted_at = NULL
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&profile.external_id)
    .bind(&profile.email)
    .bind(&profile.first_name)
    .bind(&profile.last_name)
    .bind(&profile.image_url)
    .bind(now)
    .fetch_one(db)
    .await?;

    Ok(user)
}

pub async fn soft_delete_user(db: &PgPool, external_id: &str) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(
        r#"
        UPDATE users
        SET deleted_at = COALESCE(deleted_at, NOW()), updated_at = NOW()
        WHERE external_id = $1
        RETURNING *
        "#,
    )
    .bind(external_id)
    .fetch_optional(db)
    .await?;

    Ok(user)
}

/// Author summaries for a page of reviews, keyed by user id.
pub async fn get_review_authors(
    db: &PgPool,
    author_ids: &[Uuid],
) -> Result<HashMap<Uuid, ReviewAuthor>> {
    if author_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let users = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ANY($1)")
        .bind(author_ids)
        .fetch_all(db)
        .await?;

    Ok(users
        .into_iter()
        .map(|user| {
            (
                user.id,
                ReviewAuthor {
                    id: user.id,
                    email: user.email,
                    first_name: user.first_name,
                    image_url: user.image_url,
                },
            )
        })
        .collect())
}
