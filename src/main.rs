use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use credit_decision_engine::config::Config;
use credit_decision_engine::db::Database;
use credit_decision_engine::db_storage::PgLoanStore;
use credit_decision_engine::handlers::{self, AppState};
use credit_decision_engine::score_cache::ScoreCache;
use credit_decision_engine::services::CreditService;
use credit_decision_engine::storage::{InMemoryStore, LoanStore};

/// Main entry point for the application.
///
/// Initializes tracing and configuration, picks the Postgres store when a
/// database URL is configured (in-memory otherwise) and starts the Axum server.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "credit_decision_engine=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    match &config.database_url {
        Some(url) => {
            let db = Database::new(url).await?;
            tracing::info!("Database connection pool established");
            serve(Arc::new(PgLoanStore::new(db.pool.clone())), &config).await
        }
        None => {
            tracing::warn!("Running on the in-memory store; data is lost on restart");
            serve(Arc::new(InMemoryStore::new()), &config).await
        }
    }
}

async fn serve<S: LoanStore + 'static>(store: Arc<S>, config: &Config) -> anyhow::Result<()> {
    let scores = ScoreCache::new(config.score_cache_ttl(), config.score_cache_capacity);
    tracing::info!(
        "Score cache initialized ({}s TTL, {} capacity)",
        config.score_cache_ttl_secs,
        config.score_cache_capacity
    );

    let app_state = Arc::new(AppState {
        service: CreditService::new(store, scores, config.ledger_lock_timeout()),
    });

    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(config.rate_limit_per_second)
            .burst_size(config.rate_limit_burst)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("invalid rate limit configuration"))?,
    );

    let protected_routes = handlers::api_routes(app_state).layer(
        ServiceBuilder::new()
            // Request size limit: 1MB max payload
            .layer(RequestBodyLimitLayer::new(1024 * 1024))
            .layer(GovernorLayer {
                config: governor_conf,
            }),
    );

    // Health check bypasses rate limiting
    let app = Router::new()
        .route("/health", axum::routing::get(handlers::health))
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
