//! Crash-stats API gateway: `/api/{model_name}/` over a crash-report store.
pub mod config;
pub mod envelope;
pub mod handlers;
pub mod identity;
pub mod metrics;
pub mod middleware;
pub mod rate_limit;
#[cfg(feature = "redis")]
pub mod store_redis;
pub mod upstream;

use axum::{middleware::from_fn_with_state, routing::get, Router};
use config::GatewayConfig;
use crashstats_core::{ModelBackend, SharedStore, ValidationContext};
use crashstats_registry::ModelRegistry;
use identity::IdentityStore;
use metrics::ApiMetrics;
use rate_limit::RateLimiter;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Everything a request handler needs, injected once at startup
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ModelRegistry>,
    pub backend: Arc<dyn ModelBackend>,
    pub store: Arc<dyn SharedStore>,
    pub identities: Arc<dyn IdentityStore>,
    pub limiter: RateLimiter,
    pub metrics: ApiMetrics,
    pub validation: ValidationContext,
    pub config: Arc<GatewayConfig>,
}

impl AppState {
    pub fn new(
        config: GatewayConfig,
        backend: Arc<dyn ModelBackend>,
        store: Arc<dyn SharedStore>,
        identities: Arc<dyn IdentityStore>,
    ) -> Result<Self, prometheus::Error> {
        let limiter = RateLimiter::new(
            store.clone(),
            config.anonymous_rate,
            config.authenticated_rate,
        )
        .exempt_tokens(config.exempt_tokens);
        Ok(Self {
            registry: Arc::new(ModelRegistry::crashstats()),
            backend,
            store,
            identities,
            limiter,
            metrics: ApiMetrics::new()?,
            validation: ValidationContext {
                default_product: config.default_product.clone(),
            },
            config: Arc::new(config),
        })
    }
}

pub fn create_app(state: AppState) -> Router {
    let models = Router::new()
        .route(
            "/api/{model_name}/",
            get(handlers::model_wrapper).post(handlers::model_wrapper),
        )
        .route(
            "/api/{model_name}",
            get(handlers::model_wrapper).post(handlers::model_wrapper),
        )
        .route_layer(from_fn_with_state(state.clone(), middleware::identify_and_limit));

    Router::new()
        .route("/api/", get(handlers::documentation))
        .route("/api/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .merge(models)
        .layer(middleware::cors())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(state: AppState) -> std::io::Result<()> {
    let addr = state.config.bind_addr;
    let app = create_app(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Crash-stats API listening on {}", addr);
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await
}
