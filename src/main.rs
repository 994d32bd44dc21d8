use game_reviews::config::Config;
use game_reviews::database::{create_pool, run_migrations};
use game_reviews::redis::RedisClient;
use game_reviews::services::{reconciliation::ReconciliationJob, vote_service::VoteService};
use game_reviews::store::PgReviewStore;
use game_reviews::{AppState, create_app};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "game_reviews=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("Configuration loaded successfully");

    // Create database connection pool
    let db = create_pool(&config).await?;
    tracing::info!("Database connection pool created");

    run_migrations(&db).await?;
    tracing::info!("Database migrations completed");

    let redis = Arc::new(RedisClient::new(&config.redis_url).await?);
    tracing::info!("Redis client created");

    // Vote flow and the reconciliation job share the wake-up signal
    let store = Arc::new(PgReviewStore::new(db.clone()));
    let reconcile = Arc::new(Notify::new());
    let votes = VoteService::new(store.clone(), reconcile.clone());

    let _reconciler = ReconciliationJob::new(
        store.clone(),
        reconcile,
        Duration::from_secs(config.reconcile_interval_secs),
    )
    .start();
    tracing::info!(
        "Counter reconciliation scheduled every {}s",
        config.reconcile_interval_secs
    );

    let state = AppState {
        db,
        store,
        votes,
        redis,
        config: Arc::new(config.clone()),
    };

    let app = create_app(state);

    let listener = TcpListener::bind(format!("{}:{}", config.host, config.port)).await?;
    tracing::info!("Server listening on {}:{}", config.host, config.port);

    axum::serve(listener, app).await?;

    Ok(())
}
