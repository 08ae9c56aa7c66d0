use hireline::{
    conversation::{
        conversation_cache::ConversationListCache,
        conversation_repository::ConversationRepository,
        conversation_service::ConversationService,
    },
    db::{create_pool, run_migrations},
    routes::create_router,
    state::{AppState, Config},
    websocket::ConnectionManager,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,hireline=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Arc::new(Config::from_env()?);

    // Sanitize URL for logging (hide password)
    let url_for_logging = config
        .database_url
        .split('@')
        .last()
        .map(|host| format!("<hidden>@{}", host))
        .unwrap_or_else(|| "<invalid format>".to_string());

    tracing::info!("Connecting to database at {}...", url_for_logging);
    let db = create_pool(&config.database_url).await.map_err(|e| {
        tracing::error!(
            "Failed to connect to database: {}. Check that PostgreSQL is running and DATABASE_URL is correct",
            e
        );
        e
    })?;

    tracing::info!("Running migrations...");
    run_migrations(&db).await?;

    let redis_client = redis::Client::open(config.redis_url.as_str())?;

    // Create WebSocket connection manager
    let ws_connections = ConnectionManager::new();

    // Create repositories and services
    let conversation_cache =
        ConversationListCache::new(redis_client, config.conversation_cache_ttl_secs);
    let conversation_service = ConversationService::new(
        ConversationRepository::new(db),
        conversation_cache,
        ws_connections.clone(),
    );

    let state = AppState {
        config: config.clone(),
        ws_connections,
        conversation_service,
    };

    let app = create_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("Server starting on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
