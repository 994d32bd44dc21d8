use axum::{extract::State, response::Json};
use serde_json::{Value, json};

use crate::{
    AppState,
    auth::WebhookCaller,
    error::{AppError, Result},
    models::{IdentityDeletedData, IdentityEvent, IdentityUserData},
    services::user_service,
};

/// Keeps local user rows in sync with the identity provider.
pub async fn identity_webhook(
    State(state): State<AppState>,
    _caller: WebhookCaller,
    Json(event): Json<IdentityEvent>,
) -> Result<Json<Value>> {
    tracing::info!(event_type = %event.event_type, "Identity webhook received");

    match event.event_type.as_str() {
        "user.created" | "user.updated" => {
            let data: IdentityUserData = serde_json::from_value(event.data)?;
            let profile = data
                .into_profile()
                .ok_or_else(|| AppError::BadRequest("Missing user id or email".to_string()))?;

            let user = user_service::upsert_user(&state.db, &profile).await?;
            user_service::invalidate_user_cache(&state.redis, &profile.external_id).await?;
            tracing::info!(user_id = %user.id, external_id = %user.external_id, "User synced");

            Ok(Json(json!({
                "message": "User synced successfully",
                "user_id": user.id
            })))
        }
        "user.deleted" => {
            let data: IdentityDeletedData = serde_json::from_value(event.data)?;
            let external_id = data
                .id
                .filter(|id| !id.is_empty())
                .ok_or_else(|| AppError::BadRequest("Missing user id".to_string()))?;

            let user = user_service::soft_delete_user(&state.db, &external_id)
                .await?
                .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
            user_service::invalidate_user_cache(&state.redis, &external_id).await?;
            tracing::info!(user_id = %user.id, %external_id, "User soft deleted");

            Ok(Json(json!({
                "message": "User soft deleted successfully"
            })))
        }
        other => {
            tracing::debug!(event_type = %other, "Ignoring identity webhook event");
            Ok(Json(json!({
                "message": "Webhook processed successfully"
            })))
        }
    }
}
