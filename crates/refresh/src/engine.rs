//! Hot-cache refresh engine.
//!
//! Each cycle walks the most-subscribed wallets one at a time, fetches the first explorer
//! page for each, merges it into the wallet's cached timeline and writes the result back to
//! the hot cache. The engine is the only writer of that cache.
//!
//! Wallet failures are logged and counted; they never abort the cycle. Rate-limit failures
//! put the wallet's chain into a cooldown that makes later wallets (and later cycles) on that
//! chain skip the explorer until it expires.
//!
//! Wide event logging: one structured event per wallet, plus one summary event per cycle.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use metrics::histogram;
use parking_lot::Mutex;

use ledgerlens_shared::cache::HotCache;
use ledgerlens_shared::clock::Clock;
use ledgerlens_shared::config::HotCacheSettings;
use ledgerlens_shared::error::AppError;
use ledgerlens_shared::explorer::{ExplorerQuery, HistoryExplorerAdapter};
use ledgerlens_shared::filters::drop_zero_value;
use ledgerlens_shared::models::{HistoryItem, HotCacheEntry, HotCacheKey, PopularWalletRef};
use ledgerlens_shared::sources::{PersistedHistorySource, PopularWalletSource};

use crate::merge::{merge_fetched, MergeOutcome};
use crate::report::CycleReport;

/// Clears the in-progress flag when a cycle ends, however it ends.
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct HotCacheRefreshEngine {
    settings: HotCacheSettings,
    cache: Arc<HotCache>,
    wallets: Arc<dyn PopularWalletSource>,
    history: Arc<dyn PersistedHistorySource>,
    explorer: Arc<dyn HistoryExplorerAdapter>,
    clock: Arc<dyn Clock>,
    /// chain_key -> cooldown deadline (unix ms). Only this engine reads or writes it.
    cooldowns: Mutex<HashMap<String, i64>>,
    running: AtomicBool,
    cycles: AtomicU64,
}

impl HotCacheRefreshEngine {
    pub fn new(
        settings: HotCacheSettings,
        cache: Arc<HotCache>,
        wallets: Arc<dyn PopularWalletSource>,
        history: Arc<dyn PersistedHistorySource>,
        explorer: Arc<dyn HistoryExplorerAdapter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            settings,
            cache,
            wallets,
            history,
            explorer,
            clock,
            cooldowns: Mutex::new(HashMap::new()),
            running: AtomicBool::new(false),
            cycles: AtomicU64::new(0),
        }
    }

    pub fn cache(&self) -> &Arc<HotCache> {
        &self.cache
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Active cooldown deadline for a chain, if any.
    pub fn cooldown_until(&self, chain_key: &str) -> Option<i64> {
        let now = self.clock.now_ms();
        self.cooldowns
            .lock()
            .get(chain_key)
            .copied()
            .filter(|until| *until > now)
    }

    /// Runs one refresh cycle.
    ///
    /// Returns `None` without doing anything when another cycle is still in progress: busy
    /// ticks are dropped, never queued.
    pub async fn run_cycle(&self) -> Option<CycleReport> {
        let Some(_guard) = RunGuard::acquire(&self.running) else {
            tracing::debug!(job = "hot_cache", "refresh cycle still running, tick skipped");
            return None;
        };

        let cycle = self.cycles.fetch_add(1, Ordering::Relaxed) + 1;
        let cycle_start = Instant::now();
        let mut report = CycleReport {
            cycle,
            ..CycleReport::default()
        };

        let wallets = match self
            .wallets
            .list_most_popular_tracked_wallets(self.settings.top_wallets)
            .await
        {
            Ok(wallets) => wallets,
            Err(e) => {
                tracing::error!(
                    job = "hot_cache",
                    cycle = cycle,
                    outcome = "error",
                    error = %e,
                    "failed to list popular wallets"
                );
                Vec::new()
            }
        };
        report.wallets_listed = wallets.len();

        for wallet in &wallets {
            if let Some(until) = self.cooldown_until(&wallet.chain_key) {
                report.record_skip(&wallet.chain_key);
                tracing::info!(
                    job = "hot_cache",
                    chain_key = %wallet.chain_key,
                    address = %wallet.address,
                    cooldown_until_ms = until,
                    outcome = "skipped",
                    "chain cooling down, wallet skipped"
                );
                continue;
            }

            let start = Instant::now();
            let result = self.refresh_wallet(wallet).await;
            let duration_ms = start.elapsed().as_millis() as u64;
            histogram!("hot_cache_wallet_refresh_duration_ms", "chain" => wallet.chain_key.clone())
                .record(duration_ms as f64);

            match result {
                Ok((merge, cached_items)) => {
                    report.record_success(
                        &wallet.chain_key,
                        merge.new_items,
                        merge.duplicate_items,
                        duration_ms,
                    );
                    tracing::info!(
                        job = "hot_cache",
                        chain_key = %wallet.chain_key,
                        address = %wallet.address,
                        subscribers = wallet.subscriber_count,
                        new_items = merge.new_items,
                        duplicate_items = merge.duplicate_items,
                        cached_items = cached_items,
                        duration_ms = duration_ms,
                        outcome = "success",
                    );
                }
                Err(e) => {
                    report.record_failure(&wallet.chain_key, duration_ms);
                    tracing::error!(
                        job = "hot_cache",
                        chain_key = %wallet.chain_key,
                        address = %wallet.address,
                        duration_ms = duration_ms,
                        outcome = "error",
                        error = %e,
                        "wallet refresh failed"
                    );
                    if e.is_rate_limit() {
                        self.extend_cooldown(&wallet.chain_key, &e);
                    }
                }
            }
        }

        self.fill_cache_gauges(&mut report);
        report.duration_ms = cycle_start.elapsed().as_millis() as u64;
        report.emit_metrics();

        let totals = report.totals();
        tracing::info!(
            job = "schedule",
            cycle = cycle,
            wallets = report.wallets_listed,
            processed = totals.processed,
            success = totals.success,
            failed = totals.failed,
            skipped = totals.skipped,
            new_items = totals.new_items,
            duplicate_items = totals.duplicate_items,
            wallets_in_cache = report.wallets_in_cache,
            duration_ms = report.duration_ms,
        );

        Some(report)
    }

    /// Refreshes one wallet. Returns the merge counters and the cached item count.
    async fn refresh_wallet(
        &self,
        wallet: &PopularWalletRef,
    ) -> Result<(MergeOutcome, usize), AppError> {
        let key = HotCacheKey::new(&wallet.chain_key, &wallet.address);

        // background reads are not cache traffic
        let (baseline, created_at_ms) = match self.cache.peek_stale(&key) {
            Some(entry) => (entry.items.clone(), entry.created_at_ms),
            None => (self.seed_baseline(wallet).await, self.clock.now_ms()),
        };

        let query = ExplorerQuery::first_page(
            &wallet.chain_key,
            &wallet.address,
            self.settings.page_limit,
        );
        let page = self.explorer.load_recent_transactions(&query).await?;
        let explorer_has_more = page.next_offset.is_some();

        let merge = merge_fetched(baseline, page.items, self.settings.max_items_per_wallet);
        let cached_items = merge.items.len();

        let now = self.clock.now_ms();
        let entry = HotCacheEntry {
            key: key.clone(),
            created_at_ms,
            fresh_until_ms: now.saturating_add(self.cache.fresh_ttl_ms()),
            stale_until_ms: now.saturating_add(self.cache.stale_ttl_ms()),
            items: merge.items.clone(),
            has_more: explorer_has_more || merge.truncated,
        };
        self.cache.set(key, Arc::new(entry));

        Ok((merge, cached_items))
    }

    /// Cold start only: the persisted store provides the first baseline for a wallet.
    async fn seed_baseline(&self, wallet: &PopularWalletRef) -> Vec<HistoryItem> {
        match self
            .history
            .list_recent_by_tracked_address(
                &wallet.chain_key,
                &wallet.address,
                self.settings.max_items_per_wallet,
                0,
            )
            .await
        {
            Ok(items) => drop_zero_value(items),
            Err(e) => {
                tracing::warn!(
                    job = "hot_cache",
                    chain_key = %wallet.chain_key,
                    address = %wallet.address,
                    error = %e,
                    "failed to seed baseline from persisted history"
                );
                Vec::new()
            }
        }
    }

    /// Pushes the chain's cooldown out. Deadlines only ever move later.
    fn extend_cooldown(&self, chain_key: &str, cause: &AppError) -> Option<i64> {
        let cooldown_ms =
            i64::try_from(self.settings.rate_limit_cooldown_secs.saturating_mul(1000))
                .unwrap_or(i64::MAX);
        let until = self.clock.now_ms().saturating_add(cooldown_ms);

        let mut cooldowns = self.cooldowns.lock();
        if cooldowns.get(chain_key).is_some_and(|existing| *existing >= until) {
            return None;
        }
        cooldowns.insert(chain_key.to_string(), until);
        drop(cooldowns);

        tracing::warn!(
            job = "hot_cache",
            chain_key = %chain_key,
            cooldown_until_ms = until,
            cooldown_secs = self.settings.rate_limit_cooldown_secs,
            error = %cause,
            "chain rate limited, cooldown extended"
        );
        Some(until)
    }

    fn fill_cache_gauges(&self, report: &mut CycleReport) {
        let mut per_chain: BTreeMap<String, (usize, usize)> = BTreeMap::new();
        for key in self.cache.keys() {
            if let Some(entry) = self.cache.peek_stale(&key) {
                let slot = per_chain.entry(key.chain_key.clone()).or_default();
                slot.0 += 1;
                slot.1 += entry.items.len();
            }
        }

        report.wallets_in_cache = per_chain.values().map(|(wallets, _)| wallets).sum();
        report.avg_items_per_chain = per_chain
            .into_iter()
            .map(|(chain, (wallets, items))| (chain, items as f64 / wallets as f64))
            .collect();
    }
}
