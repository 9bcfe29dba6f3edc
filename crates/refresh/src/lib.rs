//! Background hot-cache refresh for the most-watched wallets.
//!
//! Runs as a tokio task alongside the API server. A single interval timer fires every
//! `refresh_interval_secs`; each tick spawns one refresh cycle. A tick that lands while the
//! previous cycle is still running is dropped by the engine's in-progress flag, so cycles
//! never overlap and never pile up.

mod engine;
mod merge;
mod report;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;

pub use engine::HotCacheRefreshEngine;
pub use merge::{merge_fetched, MergeOutcome};
pub use report::{CycleReport, RefreshCounters};

/// Main refresh loop. Runs until the shutdown signal is received.
///
/// The first tick fires immediately so the cache starts warming at boot. A cycle already in
/// flight when shutdown arrives is left to finish its current wallet on its own task.
pub async fn run_refresh_loop(
    engine: Arc<HotCacheRefreshEngine>,
    interval_secs: u64,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(interval_secs = interval_secs, "hot cache refresh loop started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let engine = engine.clone();
                tokio::spawn(async move {
                    engine.run_cycle().await;
                });
            }
            _ = &mut shutdown => {
                tracing::info!("hot cache refresh loop shutting down");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use ledgerlens_shared::cache::HotCache;
    use ledgerlens_shared::clock::SystemClock;
    use ledgerlens_shared::config::HotCacheSettings;
    use ledgerlens_shared::testing::{popular_wallet, FakeExplorer, FakeWalletStore};

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn loop_ticks_until_shutdown() {
        let clock = Arc::new(SystemClock);
        let store = Arc::new(
            FakeWalletStore::default().with_wallets(vec![popular_wallet(1, "eth", "0xwallet")]),
        );
        let explorer = Arc::new(FakeExplorer::default());
        let engine = Arc::new(HotCacheRefreshEngine::new(
            HotCacheSettings::default(),
            Arc::new(HotCache::new(60, 600, None, clock.clone())),
            store.clone(),
            store,
            explorer.clone(),
            clock,
        ));

        let (tx, rx) = oneshot::channel();
        let handle = tokio::spawn(run_refresh_loop(engine, 10, rx));

        tokio::time::sleep(Duration::from_secs(25)).await;
        tx.send(()).unwrap();
        handle.await.unwrap();

        // ticks at 0s, 10s and 20s
        assert_eq!(explorer.calls(), 3);
    }
}
