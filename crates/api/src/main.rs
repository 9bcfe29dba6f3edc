//! Ledgerlens API server.
//!
//! Wallet transaction history for tracked wallets. Requests are answered from the local event
//! store, an in-memory hot cache kept warm for the most-watched wallets, a short-lived request
//! cache, or a live block-explorer call. The hot-cache refresh loop runs as a background task in
//! the same process.
//!
//! Configuration is read from the environment (see `ledgerlens_shared::config`). `RUST_LOG`
//! controls the tracing filter.

mod limiter;
mod orchestrator;
mod routes;
mod state;

use std::sync::Arc;

use axum::http::Method;
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;
use utoipa_swagger_ui::SwaggerUi;

use ledgerlens_refresh::HotCacheRefreshEngine;
use ledgerlens_shared::cache::HotCache;
use ledgerlens_shared::clock::{Clock, SystemClock};
use ledgerlens_shared::config::Settings;
use ledgerlens_shared::db::{self, PgHistoryStore};
use ledgerlens_shared::etherscan::EtherscanClient;
use ledgerlens_shared::explorer::ExplorerRouter;
use ledgerlens_shared::stats::CacheStatsRegistry;

use crate::limiter::UserRateLimiter;
use crate::orchestrator::{HistoryRequestOrchestrator, RequestCache};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Ledgerlens API",
        description = "Cached wallet transaction history for tracked wallets",
        version = "1.0.0",
        license(name = "MIT")
    ),
    tags(
        (name = "Chains", description = "Chain information endpoints"),
        (name = "History", description = "Wallet history endpoints"),
        (name = "Status", description = "Cache status endpoints")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let settings = Settings::from_env();
    let metrics = PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install metrics recorder");

    let database_url = settings
        .database_url
        .as_deref()
        .expect("DATABASE_URL must be set");
    let pool = db::create_pool(database_url)
        .await
        .expect("failed to connect to database");
    let store = Arc::new(PgHistoryStore::new(pool));

    tracing::info!("database pool created");

    let mut explorer = ExplorerRouter::new(settings.explorer_timeout);
    match settings.etherscan_api_key.as_deref() {
        Some(key) => {
            let client = EtherscanClient::new(key, settings.explorer_timeout)
                .expect("failed to build etherscan client");
            explorer = explorer.with_adapter("eth", Arc::new(client));
        }
        None => tracing::warn!("ETHERSCAN_API_KEY not set, live eth lookups disabled"),
    }
    tracing::info!(chains = ?explorer.chain_keys(), "explorer adapters configured");
    let explorer = Arc::new(explorer);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let hot_cache = Arc::new(HotCache::new(
        settings.hot_cache.fresh_ttl_secs,
        settings.hot_cache.stale_ttl_secs,
        Some(settings.hot_cache.max_keys),
        clock.clone(),
    ));
    let request_cache = Arc::new(RequestCache::new(
        settings.requests.cache_fresh_ttl_secs,
        settings.requests.cache_stale_ttl_secs,
        Some(settings.requests.cache_max_keys),
        clock.clone(),
    ));

    let registry = CacheStatsRegistry::new();
    registry.register("hot_cache", hot_cache.clone());
    registry.register("request_cache", request_cache.clone());

    let orchestrator = Arc::new(HistoryRequestOrchestrator::new(
        hot_cache.clone(),
        request_cache,
        store.clone(),
        explorer.clone(),
        Arc::new(UserRateLimiter::new(settings.requests.requests_per_minute)),
    ));
    let state = AppState::new(orchestrator, registry);

    // graceful shutdown: ctrl-c signals both the server and the refresh loop
    let shutdown = tokio::signal::ctrl_c();
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    if settings.hot_cache.enabled {
        let interval_secs = settings.hot_cache.refresh_interval_secs;
        let engine = Arc::new(HotCacheRefreshEngine::new(
            settings.hot_cache.clone(),
            hot_cache,
            store.clone(),
            store,
            explorer,
            clock,
        ));
        tokio::spawn(async move {
            ledgerlens_refresh::run_refresh_loop(engine, interval_secs, shutdown_rx).await;
        });
    } else {
        tracing::info!("hot cache refresh disabled");
    }

    let cors = CorsLayer::new()
        .allow_methods([Method::GET])
        .allow_origin(Any);

    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .routes(routes!(routes::chains::list_chains))
        .routes(routes!(routes::chains::get_chain))
        .routes(routes!(routes::history::wallet_history))
        .routes(routes!(routes::cache_stats::cache_stats))
        .with_state(state)
        .split_for_parts();

    let app = router
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", api))
        .route("/health", get(|| async { "ok" }))
        .route(
            "/metrics",
            get(move || std::future::ready(metrics.render())),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", settings.port))
        .await
        .expect("failed to bind");

    tracing::info!(port = settings.port, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.await;
            let _ = shutdown_tx.send(());
            tracing::info!("shutdown signal received");
        })
        .await
        .expect("server error");
}
