//! Helpdesk API server

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use helpdesk_api::{auth::JwtManager, create_router, realtime::EventHub, AppState, Config};
use helpdesk_shared::{
    create_pool, run_migrations, ConversationStore, InMemoryConversationStore,
    PgConversationStore, SystemClock,
};

const DEFAULT_LOG_FILTER: &str = "helpdesk_api=info,helpdesk_shared=info,tower_http=info";

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn connect_store(config: &Config) -> anyhow::Result<Arc<dyn ConversationStore>> {
    let Some(database_url) = config.database_url.as_deref() else {
        tracing::warn!("DATABASE_URL not set, conversations are kept in memory only");
        return Ok(Arc::new(InMemoryConversationStore::new()));
    };

    let pool = create_pool(database_url, config.database_max_connections)
        .await
        .context("failed to connect to database")?;
    run_migrations(&pool)
        .await
        .context("failed to run database migrations")?;
    tracing::info!("Database connected and migrations applied");

    Ok(Arc::new(PgConversationStore::new(pool)))
}

/// Wait for ctrl-c, then end open event streams so in-flight responses can finish
async fn shutdown_signal(hub: EventHub) {
    let closed = hub.disconnect_on(tokio::signal::ctrl_c()).await;
    tracing::info!(closed_streams = closed, "Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = Config::from_env().context("invalid configuration")?;
    let store = connect_store(&config).await?;
    let verifier = Arc::new(JwtManager::new(&config.jwt_secret));
    let bind_address = config.bind_address.clone();

    let state = AppState::new(config, store, verifier, Arc::new(SystemClock));
    let hub = state.hub.clone();
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("failed to bind {}", bind_address))?;
    tracing::info!("Helpdesk API listening on {}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(hub))
        .await
        .context("server error")?;

    Ok(())
}
