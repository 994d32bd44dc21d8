use axum::{extract::State, response::Json};

use crate::{
    AppState,
    auth::AuthUser,
    error::{AppError, Result},
    models::UserResponse,
    services::user_service,
};

pub async fn get_current_user(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<UserResponse>> {
    let user = user_service::get_active_user_cached(
        &state.db,
        &state.redis,
        &auth_user.external_id,
        state.config.user_cache_ttl_secs,
    )
    .await?
    .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    Ok(Json(user.into()))
}
