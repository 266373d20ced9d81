use std::sync::Arc;

use anyhow::Context;
use chatbot_postman::{
    config::Config,
    routes,
    services::store::{JsonFileStore, MemoryStore, StateStore},
    state::AppState,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("chatbot_postman=info,tower_http=info")),
        )
        .init();

    let store: Arc<dyn StateStore> = if config.ephemeral {
        tracing::warn!("ephemeral mode, sessions will not be persisted");
        Arc::new(MemoryStore::new())
    } else {
        let store = JsonFileStore::new(&config.data_dir);
        tracing::info!(path = %store.path().display(), "using file store");
        Arc::new(store)
    };

    let state = Arc::new(AppState::new(&config, store).await.context("failed to initialise state")?);
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("chatbot-postman running at http://{}", config.bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
