use axum::{RequestPartsExt, extract::FromRequestParts, http::request::Parts};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::{
    AppState,
    error::{AppError, Result},
    services::user_service,
};

/// Session token issued by the identity provider.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // identity provider user id
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn verify(token: &str, jwt_secret: &str) -> Result<Self> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(jwt_secret.as_ref()),
            &Validation::default(),
        )?;

        Ok(token_data.claims)
    }
}

/// The local, non-deleted user behind the bearer token.
#[derive(Debug)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub external_id: String,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| AppError::Authentication("Missing authorization header".to_string()))?;

        let claims = Claims::verify(bearer.token(), &state.config.jwt_secret)?;

        let user = user_service::get_active_user_cached(
            &state.db,
            &state.redis,
            &claims.sub,
            state.config.user_cache_ttl_secs,
        )
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        Ok(AuthUser {
            user_id: user.id,
            external_id: user.external_id,
        })
    }
}

/// Shared-secret check for identity provider webhooks.
pub struct WebhookCaller;

impl FromRequestParts<AppState> for WebhookCaller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| AppError::Authentication("Missing webhook credentials".to_string()))?;

        if !secrets_match(bearer.token(), &state.config.webhook_secret) {
            return Err(AppError::Authentication(
                "Invalid webhook credentials".to_string(),
            ));
        }

        Ok(WebhookCaller)
    }
}

fn secrets_match(given: &str, expected: &str) -> bool {
    if expected.is_empty() {
        return false;
    }
    given.as_bytes().ct_eq(expected.as_bytes()).into()
}
