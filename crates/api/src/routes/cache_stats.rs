//! Cache introspection endpoint.

use axum::extract::State;
use axum::Json;

use ledgerlens_shared::models::NamedCacheStats;

use crate::state::AppState;

/// Returns key counts and hit/miss counters for every registered cache, ordered by name.
#[utoipa::path(
    get,
    path = "/v1/cache-stats",
    tag = "Status",
    summary = "Cache statistics",
    responses(
        (status = 200, description = "Per-cache statistics", body = Vec<NamedCacheStats>)
    )
)]
pub async fn cache_stats(State(state): State<AppState>) -> Json<Vec<NamedCacheStats>> {
    let stats = state
        .registry
        .snapshot()
        .into_iter()
        .map(|(name, s)| NamedCacheStats {
            name,
            keys: s.keys,
            hits: s.hits,
            misses: s.misses,
        })
        .collect();
    Json(stats)
}
