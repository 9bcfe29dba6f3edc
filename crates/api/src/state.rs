//! Shared application state for the axum server.
//!
//! Holds the history orchestrator (which owns the hot and request caches) and the registry
//! those caches report their statistics to.

use std::sync::Arc;

use ledgerlens_shared::stats::CacheStatsRegistry;

use crate::orchestrator::HistoryRequestOrchestrator;

/// Shared state passed to all axum handlers via `State<AppState>`.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<HistoryRequestOrchestrator>,
    pub registry: CacheStatsRegistry,
}

impl AppState {
    pub fn new(orchestrator: Arc<HistoryRequestOrchestrator>, registry: CacheStatsRegistry) -> Self {
        Self {
            orchestrator,
            registry,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use ledgerlens_shared::cache::HotCache;
    use ledgerlens_shared::clock::ManualClock;
    use ledgerlens_shared::testing::{FakeExplorer, FakeWalletStore};

    use crate::limiter::UserRateLimiter;
    use crate::orchestrator::RequestCache;

    use super::*;

    pub(crate) const T0: i64 = 1_700_000_000_000;

    /// State over in-memory collaborators, with both caches registered.
    pub(crate) struct TestState {
        pub state: AppState,
        pub hot: Arc<HotCache>,
        pub explorer: Arc<FakeExplorer>,
        pub clock: Arc<ManualClock>,
    }

    pub(crate) fn test_state(store: FakeWalletStore, requests_per_minute: u32) -> TestState {
        let clock = Arc::new(ManualClock::new(T0));
        let hot = Arc::new(HotCache::new(60, 600, Some(100), clock.clone()));
        let requests = Arc::new(RequestCache::new(30, 300, Some(100), clock.clone()));
        let explorer = Arc::new(FakeExplorer::default());

        let registry = CacheStatsRegistry::new();
        registry.register("hot_cache", hot.clone());
        registry.register("request_cache", requests.clone());

        let orchestrator = Arc::new(HistoryRequestOrchestrator::new(
            hot.clone(),
            requests,
            Arc::new(store),
            explorer.clone(),
            Arc::new(UserRateLimiter::new(requests_per_minute)),
        ));

        TestState {
            state: AppState::new(orchestrator, registry),
            hot,
            explorer,
            clock,
        }
    }
}
