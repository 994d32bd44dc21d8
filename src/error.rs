use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Failures raised by a `ReviewStore` implementation.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Referenced row does not exist: {0}")]
    MissingReference(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Maps constraint violations that mean "the thing you pointed at is gone".
    pub fn from_sqlx(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db) = e {
            if db.is_foreign_key_violation() {
                return StoreError::MissingReference(db.message().to_string());
            }
        }
        StoreError::Database(e)
    }
}

/// Failures of the vote submission flow. Expected rejections are not errors,
/// see `VoteOutcome`.
#[derive(Error, Debug)]
pub enum VoteError {
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[source] StoreError),

    #[error("Vote {vote_id} was recorded but the review counters were not updated: {source}")]
    PartialApplyFailure {
        vote_id: uuid::Uuid,
        #[source]
        source: StoreError,
    },
}

impl From<StoreError> for VoteError {
    fn from(e: StoreError) -> Self {
        VoteError::StorageUnavailable(e)
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Vote error: {0}")]
    Vote(#[from] VoteError),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Rate limit exceeded")]
    RateLimit,
}

impl AppError {
    fn status_and_message(&self) -> (StatusCode, &str) {
        match self {
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
            AppError::Store(StoreError::MissingReference(_)) => {
                (StatusCode::NOT_FOUND, "Referenced resource not found")
            }
            AppError::Store(e) => {
                tracing::error!("Store error: {:?}", e);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Storage temporarily unavailable",
                )
            }
            AppError::Vote(VoteError::StorageUnavailable(e)) => {
                tracing::warn!("Vote storage unavailable: {:?}", e);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Storage temporarily unavailable, please retry",
                )
            }
            AppError::Vote(e @ VoteError::PartialApplyFailure { .. }) => {
                tracing::error!("{}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
            AppError::Redis(e) => {
                tracing::error!("Redis error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
            AppError::Validation(message) => (StatusCode::BAD_REQUEST, message.as_str()),
            AppError::Authentication(message) => (StatusCode::UNAUTHORIZED, message.as_str()),
            AppError::NotFound(message) => (StatusCode::NOT_FOUND, message.as_str()),
            AppError::Conflict(message) => (StatusCode::CONFLICT, message.as_str()),
            AppError::BadRequest(message) => (StatusCode::BAD_REQUEST, message.as_str()),
            AppError::Internal(message) => {
                tracing::error!("Internal error: {}", message);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
            AppError::Jwt(e) => {
                tracing::debug!("JWT error: {:?}", e);
                (StatusCode::UNAUTHORIZED, "Invalid token")
            }
            AppError::Json(e) => {
                tracing::debug!("JSON error: {:?}", e);
                (StatusCode::BAD_REQUEST, "Malformed payload")
            }
            AppError::RateLimit => (StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded"),
        }
    }

    /// Whether the client may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::Vote(VoteError::StorageUnavailable(_))
                | AppError::Store(StoreError::Unavailable(_))
                | AppError::Store(StoreError::Database(_))
                | AppError::RateLimit
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = self.status_and_message();

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16(),
            "retryable": self.is_retryable()
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

// Validation helper
impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let error_messages: Vec<String> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |error| {
                    format!(
                        "{}: {}",
                        field,
                        error.message.as_ref().unwrap_or(&"Invalid value".into())
                    )
                })
            })
            .collect();

        AppError::Validation(error_messages.join(", "))
    }
}
