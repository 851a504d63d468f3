//! Binary entrypoint for the crash-stats API gateway.
use anyhow::Context;
use crashstats_api::{
    config::GatewayConfig, identity::InMemoryIdentityStore, run, upstream::HttpBackend, AppState,
};
use crashstats_core::{InMemoryStore, SharedStore};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

async fn shared_store(config: &GatewayConfig) -> anyhow::Result<Arc<dyn SharedStore>> {
    #[cfg(feature = "redis")]
    if let Some(url) = &config.redis_url {
        let store = crashstats_api::store_redis::RedisStore::connect(url)
            .await
            .context("connecting to Redis")?;
        tracing::info!("Using Redis shared store");
        return Ok(Arc::new(store));
    }

    if config.redis_url.is_some() {
        tracing::warn!("CRASHSTATS_REDIS_URL is set but the redis feature is disabled");
    }
    tracing::info!("Using in-process shared store");
    Ok(Arc::new(InMemoryStore::default()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crashstats_api=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = GatewayConfig::from_env()?;

    let identities = match &config.identities_path {
        Some(path) => InMemoryIdentityStore::load(path)?,
        None => {
            tracing::warn!("No identities file configured; every caller is anonymous");
            InMemoryIdentityStore::new()
        }
    };
    let backend = HttpBackend::new(&config.middleware_url, config.backend_timeout)?;
    let store = shared_store(&config).await?;

    tracing::info!(
        anonymous = %config.anonymous_rate,
        authenticated = %config.authenticated_rate,
        backend = %config.middleware_url,
        "Starting crash-stats API"
    );
    let state = AppState::new(config, Arc::new(backend), store, Arc::new(identities))?;
    run(state).await.context("serving HTTP")
}
