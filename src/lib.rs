pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod models;
pub mod redis;
pub mod services;
pub mod store;

use axum::{
    Router,
    http::{
        HeaderValue, Method,
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    },
    routing::{get, post},
};
use sqlx::PgPool;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    config::Config, redis::RedisClient, services::vote_service::VoteService,
    store::PgReviewStore,
};

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub store: Arc<PgReviewStore>,
    pub votes: VoteService<PgReviewStore>,
    pub redis: Arc<RedisClient>,
    pub config: Arc<Config>,
}

pub fn create_app(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = state
        .config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid allowed origin: {}", origin);
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([AUTHORIZATION, ACCEPT, CONTENT_TYPE]);

    // Handlers that take `AuthUser` require a bearer token; the webhook
    // authenticates with the shared secret instead.
    let api_routes = Router::new()
        .route(
            "/api/reviews",
            get(handlers::reviews::get_reviews).post(handlers::reviews::create_review),
        )
        .route(
            "/api/reviews/{review_id}",
            get(handlers::reviews::get_review),
        )
        .route(
            "/api/reviews/{review_id}/vote",
            post(handlers::reviews::vote_review),
        )
        .route("/api/users/me", get(handlers::users::get_current_user))
        .route(
            "/api/webhooks/identity",
            post(handlers::webhooks::identity_webhook),
        );

    api_routes
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
