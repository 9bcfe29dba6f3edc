//! Per-request history waterfall.
//!
//! Sources are tried cheapest first:
//! 1. admission check (quota exhausted → stale data or `Throttled`)
//! 2. persisted events from the local ingester
//! 3. the background-warmed hot cache, if fresh
//! 4. the request cache, if fresh
//! 5. a live explorer call, whose result goes into the request cache
//! 6. on a transient explorer failure, stale request-cache or hot-cache data
//!
//! The hot cache is only ever read here; the refresh engine is its sole writer.

use std::sync::Arc;

use metrics::counter;

use ledgerlens_shared::cache::{HotCache, TieredCache};
use ledgerlens_shared::chains::{self, ChainConfig};
use ledgerlens_shared::error::AppError;
use ledgerlens_shared::explorer::{ExplorerQuery, HistoryExplorerAdapter};
use ledgerlens_shared::filters::{drop_zero_value, filter_items, page_from_items};
use ledgerlens_shared::models::{DirectionFilter, HistoryPage, HotCacheKey, KindFilter};
use ledgerlens_shared::sources::PersistedHistorySource;

use crate::limiter::AdmissionControl;

pub const MAX_PAGE_LIMIT: usize = 100;
pub const DEFAULT_PAGE_LIMIT: usize = 10;

/// Local reads fetch this many times the requested window when filters are active, since
/// filtering happens after the read.
const LOCAL_OVERFETCH: usize = 3;
const LOCAL_FETCH_CAP: usize = 500;

/// One history request as received from a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRequest {
    pub user: String,
    pub chain_key: String,
    pub address: String,
    pub limit: usize,
    pub offset: usize,
    pub kind: KindFilter,
    pub direction: DirectionFilter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    /// Served from an aged cache entry because the live path was unavailable.
    Stale,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryResponse {
    pub page: HistoryPage,
    pub freshness: Freshness,
}

impl HistoryResponse {
    fn fresh(page: HistoryPage) -> Self {
        Self {
            page,
            freshness: Freshness::Fresh,
        }
    }

    fn stale(page: HistoryPage) -> Self {
        Self {
            page,
            freshness: Freshness::Stale,
        }
    }
}

/// Identifies one exact live answer in the request cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestCacheKey {
    pub chain_key: String,
    pub address: String,
    pub limit: usize,
    pub offset: usize,
    pub kind: KindFilter,
    pub direction: DirectionFilter,
}

/// Short-lived cache of live explorer answers, written only by the orchestrator.
pub type RequestCache = TieredCache<RequestCacheKey, HistoryPage>;

/// A validated request.
struct View<'a> {
    chain: &'static ChainConfig,
    address: &'a str,
    limit: usize,
    offset: usize,
    kind: KindFilter,
    direction: DirectionFilter,
}

impl View<'_> {
    fn hot_key(&self) -> HotCacheKey {
        HotCacheKey::new(self.chain.key, self.address)
    }

    fn request_key(&self) -> RequestCacheKey {
        RequestCacheKey {
            chain_key: self.chain.key.to_string(),
            address: self.address.to_lowercase(),
            limit: self.limit,
            offset: self.offset,
            kind: self.kind,
            direction: self.direction,
        }
    }
}

pub struct HistoryRequestOrchestrator {
    hot_cache: Arc<HotCache>,
    request_cache: Arc<RequestCache>,
    history: Arc<dyn PersistedHistorySource>,
    explorer: Arc<dyn HistoryExplorerAdapter>,
    limiter: Arc<dyn AdmissionControl>,
}

impl HistoryRequestOrchestrator {
    pub fn new(
        hot_cache: Arc<HotCache>,
        request_cache: Arc<RequestCache>,
        history: Arc<dyn PersistedHistorySource>,
        explorer: Arc<dyn HistoryExplorerAdapter>,
        limiter: Arc<dyn AdmissionControl>,
    ) -> Self {
        Self {
            hot_cache,
            request_cache,
            history,
            explorer,
            limiter,
        }
    }

    /// Answers a history request, fresh when possible and stale when upstream is unavailable.
    ///
    /// Errors other than transient upstream failures are returned unchanged.
    pub async fn load_history(&self, req: &HistoryRequest) -> Result<HistoryResponse, AppError> {
        let chain = chains::chain_by_key(&req.chain_key)
            .ok_or_else(|| AppError::ChainNotFound(req.chain_key.clone()))?;
        let address = req.address.trim();
        if address.is_empty() {
            return Err(AppError::InvalidQuery("address must not be empty".into()));
        }

        let view = View {
            chain,
            address,
            limit: req.limit.clamp(1, MAX_PAGE_LIMIT),
            offset: req.offset,
            kind: req.kind,
            direction: req.direction,
        };

        let result = self.waterfall(&req.user, &view).await;
        let outcome = match &result {
            Ok(r) if r.freshness == Freshness::Fresh => "fresh",
            Ok(_) => "stale",
            Err(_) => "error",
        };
        counter!("history_requests_total", "outcome" => outcome).increment(1);
        result
    }

    async fn waterfall(&self, user: &str, view: &View<'_>) -> Result<HistoryResponse, AppError> {
        if !self.limiter.admit(user).await {
            return match self.serve_stale(view) {
                Some(page) => {
                    tracing::info!(
                        user = %user,
                        chain_key = view.chain.key,
                        address = %view.address,
                        "quota exhausted, serving stale history"
                    );
                    Ok(HistoryResponse::stale(page))
                }
                None => Err(AppError::Throttled(user.to_string())),
            };
        }

        if let Some(page) = self.from_local_store(view).await {
            tracing::debug!(chain_key = view.chain.key, source = "local", "history served");
            return Ok(HistoryResponse::fresh(page));
        }

        if let Some(page) = self.from_hot_cache(view, false) {
            tracing::debug!(chain_key = view.chain.key, source = "hot_cache", "history served");
            return Ok(HistoryResponse::fresh(page));
        }

        let request_key = view.request_key();
        if let Some(page) = self.request_cache.get_fresh(&request_key) {
            tracing::debug!(chain_key = view.chain.key, source = "request_cache", "history served");
            return Ok(HistoryResponse::fresh(page));
        }

        let query = ExplorerQuery {
            chain_key: view.chain.key.to_string(),
            address: view.address.to_string(),
            limit: view.limit,
            offset: view.offset,
            kind: view.kind,
            direction: view.direction,
            min_amount_usd: None,
        };

        match self.explorer.load_recent_transactions(&query).await {
            Ok(page) => {
                let page = HistoryPage {
                    items: drop_zero_value(page.items),
                    next_offset: page.next_offset,
                };
                self.request_cache.set(request_key, page.clone());
                tracing::debug!(chain_key = view.chain.key, source = "explorer", "history served");
                Ok(HistoryResponse::fresh(page))
            }
            Err(e) if e.is_transient() => match self.serve_stale(view) {
                Some(page) => {
                    tracing::warn!(
                        chain_key = view.chain.key,
                        address = %view.address,
                        error = %e,
                        "explorer unavailable, serving stale history"
                    );
                    Ok(HistoryResponse::stale(page))
                }
                None => Err(e),
            },
            Err(e) => Err(e),
        }
    }

    /// Persisted events, filtered after a bounded read.
    ///
    /// `None` means "fall through": nothing usable, a read error, or a short first page from a
    /// chain whose local ingester is not authoritative.
    async fn from_local_store(&self, view: &View<'_>) -> Option<HistoryPage> {
        let needed = view.offset.saturating_add(view.limit).saturating_add(1);
        let filtered = view.kind != KindFilter::All || view.direction != DirectionFilter::All;
        let window = if filtered {
            needed
                .saturating_mul(LOCAL_OVERFETCH)
                .min(LOCAL_FETCH_CAP)
                .max(needed)
        } else {
            needed
        };

        let rows = match self
            .history
            .list_recent_by_tracked_address(view.chain.key, view.address, window, 0)
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(
                    chain_key = view.chain.key,
                    address = %view.address,
                    error = %e,
                    "local history read failed, falling through"
                );
                return None;
            }
        };

        let truncated = rows.len() >= window;
        let items = filter_items(view.chain, &rows, view.kind, view.direction)
            .cloned()
            .collect();
        let page = page_from_items(items, view.offset, view.limit, truncated);

        if page.items.is_empty() {
            return None;
        }
        if !view.chain.local_store_authoritative
            && view.offset == 0
            && page.items.len() < view.limit
        {
            tracing::debug!(
                chain_key = view.chain.key,
                items = page.items.len(),
                limit = view.limit,
                "short local first page treated as inconclusive"
            );
            return None;
        }
        Some(page)
    }

    fn from_hot_cache(&self, view: &View<'_>, allow_stale: bool) -> Option<HistoryPage> {
        let key = view.hot_key();
        let entry = if allow_stale {
            self.hot_cache.get_stale(&key)
        } else {
            self.hot_cache.get_fresh(&key)
        }?;

        let items = filter_items(view.chain, &entry.items, view.kind, view.direction)
            .cloned()
            .collect();
        let page = page_from_items(items, view.offset, view.limit, entry.has_more);
        (!page.items.is_empty()).then_some(page)
    }

    /// Stale request-cache answer for this exact request, else a stale hot-cache view.
    fn serve_stale(&self, view: &View<'_>) -> Option<HistoryPage> {
        self.request_cache
            .get_stale(&view.request_key())
            .or_else(|| self.from_hot_cache(view, true))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;

    use ledgerlens_shared::clock::ManualClock;
    use ledgerlens_shared::models::{Direction, HistoryItem, HotCacheEntry};
    use ledgerlens_shared::testing::{history_item, FakeExplorer, FakeWalletStore};

    use super::*;

    const T0: i64 = 1_700_000_000_000;

    /// Admission switch for tests.
    struct Gate(AtomicBool);

    #[async_trait]
    impl AdmissionControl for Gate {
        async fn admit(&self, _user: &str) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    struct Harness {
        orchestrator: HistoryRequestOrchestrator,
        hot: Arc<HotCache>,
        requests: Arc<RequestCache>,
        explorer: Arc<FakeExplorer>,
        gate: Arc<Gate>,
        clock: Arc<ManualClock>,
    }

    fn harness(store: FakeWalletStore) -> Harness {
        let clock = Arc::new(ManualClock::new(T0));
        let hot = Arc::new(HotCache::new(60, 600, None, clock.clone()));
        let requests = Arc::new(RequestCache::new(30, 300, None, clock.clone()));
        let explorer = Arc::new(FakeExplorer::default());
        let gate = Arc::new(Gate(AtomicBool::new(true)));
        let orchestrator = HistoryRequestOrchestrator::new(
            hot.clone(),
            requests.clone(),
            Arc::new(store),
            explorer.clone(),
            gate.clone(),
        );
        Harness {
            orchestrator,
            hot,
            requests,
            explorer,
            gate,
            clock,
        }
    }

    fn request(chain: &str, address: &str, limit: usize, offset: usize) -> HistoryRequest {
        HistoryRequest {
            user: "alice".into(),
            chain_key: chain.into(),
            address: address.into(),
            limit,
            offset,
            kind: KindFilter::All,
            direction: DirectionFilter::All,
        }
    }

    fn items(prefix: &str, n: i64) -> Vec<HistoryItem> {
        (0..n)
            .map(|i| history_item(&format!("{prefix}{i}"), 1_000 - i, "ETH", Direction::In, "1"))
            .collect()
    }

    fn warm(hot: &HotCache, chain: &str, address: &str, items: Vec<HistoryItem>) {
        warm_with(hot, chain, address, items, false);
    }

    fn warm_with(
        hot: &HotCache,
        chain: &str,
        address: &str,
        items: Vec<HistoryItem>,
        has_more: bool,
    ) {
        let key = HotCacheKey::new(chain, address);
        hot.set(
            key.clone(),
            Arc::new(HotCacheEntry {
                key,
                created_at_ms: T0,
                fresh_until_ms: T0 + 60_000,
                stale_until_ms: T0 + 600_000,
                items,
                has_more,
            }),
        );
    }

    fn live_page(items: Vec<HistoryItem>, next_offset: Option<usize>) -> HistoryPage {
        HistoryPage { items, next_offset }
    }

    #[tokio::test]
    async fn fresh_hot_cache_short_circuits_explorer() {
        let h = harness(FakeWalletStore::default());
        warm(&h.hot, "eth", "0xwallet", items("0xh", 3));

        let resp = h
            .orchestrator
            .load_history(&request("eth", "0xWallet", 2, 0))
            .await
            .unwrap();

        assert_eq!(resp.freshness, Freshness::Fresh);
        assert_eq!(resp.page.items.len(), 2);
        assert_eq!(resp.page.next_offset, Some(2));
        assert_eq!(h.explorer.calls(), 0);
    }

    #[tokio::test]
    async fn capped_hot_timeline_still_offers_next_page() {
        let h = harness(FakeWalletStore::default());
        warm_with(&h.hot, "eth", "0xwallet", items("0xh", 3), true);

        let first = h
            .orchestrator
            .load_history(&request("eth", "0xwallet", 3, 0))
            .await
            .unwrap();
        assert_eq!(first.page.items.len(), 3);
        assert_eq!(first.page.next_offset, Some(3));

        let second = h
            .orchestrator
            .load_history(&request("eth", "0xwallet", 3, 3))
            .await
            .unwrap();
        assert_eq!(h.explorer.calls(), 1, "past the cached timeline goes live");
        assert_eq!(second.freshness, Freshness::Fresh);
    }

    #[tokio::test]
    async fn complete_hot_timeline_ends_pagination() {
        let h = harness(FakeWalletStore::default());
        warm(&h.hot, "eth", "0xwallet", items("0xh", 3));

        let resp = h
            .orchestrator
            .load_history(&request("eth", "0xwallet", 3, 0))
            .await
            .unwrap();

        assert_eq!(resp.page.next_offset, None);
    }

    #[tokio::test]
    async fn rate_limited_explorer_falls_back_to_stale_hot_cache() {
        let h = harness(FakeWalletStore::default());
        warm(&h.hot, "eth", "0xwallet", items("0xh", 3));
        h.clock.advance_secs(120);
        h.explorer.fail_with("HTTP 429 Too Many Requests");

        let resp = h
            .orchestrator
            .load_history(&request("eth", "0xwallet", 10, 0))
            .await
            .unwrap();

        assert_eq!(resp.freshness, Freshness::Stale);
        assert_eq!(resp.page.items.len(), 3);
        assert_eq!(resp.page.next_offset, None);
        assert_eq!(h.explorer.calls(), 1);
    }

    #[tokio::test]
    async fn timeout_prefers_stale_request_cache_over_hot_cache() {
        let h = harness(FakeWalletStore::default());
        h.explorer
            .set_page("0xwallet", live_page(items("0xlive", 2), Some(2)));
        h.orchestrator
            .load_history(&request("sol", "0xwallet", 2, 0))
            .await
            .unwrap();
        warm(&h.hot, "sol", "0xwallet", items("0xhot", 5));

        h.clock.advance_secs(100);
        h.explorer.fail_with("operation timed out");
        let resp = h
            .orchestrator
            .load_history(&request("sol", "0xwallet", 2, 0))
            .await
            .unwrap();

        assert_eq!(resp.freshness, Freshness::Stale);
        assert_eq!(resp.page.items[0].tx_hash, "0xlive0");
        assert_eq!(resp.page.next_offset, Some(2));
    }

    #[tokio::test]
    async fn transient_error_without_stale_data_fails() {
        let h = harness(FakeWalletStore::default());
        h.explorer.fail_with("HTTP 429");

        let err = h
            .orchestrator
            .load_history(&request("eth", "0xwallet", 10, 0))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::RateLimited(_)));
    }

    #[tokio::test]
    async fn fatal_errors_propagate_even_with_stale_data() {
        let h = harness(FakeWalletStore::default());
        warm(&h.hot, "eth", "0xwallet", items("0xh", 3));
        h.clock.advance_secs(120);
        h.explorer.fail_with("invalid address checksum");

        let err = h
            .orchestrator
            .load_history(&request("eth", "0xwallet", 10, 0))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Upstream(ref m) if m == "invalid address checksum"));
    }

    #[tokio::test]
    async fn local_store_answers_first() {
        let store = FakeWalletStore::default().with_events("eth", "0xwallet", items("0xdb", 1));
        let h = harness(store);
        warm(&h.hot, "eth", "0xwallet", items("0xh", 3));

        let resp = h
            .orchestrator
            .load_history(&request("eth", "0xwallet", 5, 0))
            .await
            .unwrap();

        assert_eq!(resp.page.items.len(), 1, "short page is fine on ethereum");
        assert_eq!(resp.page.items[0].tx_hash, "0xdb0");
        assert_eq!(resp.page.next_offset, None);
        assert_eq!(h.explorer.calls(), 0);
    }

    #[tokio::test]
    async fn short_local_first_page_falls_through_off_ethereum() {
        let store = FakeWalletStore::default().with_events("sol", "solwallet", items("0xdb", 1));
        let h = harness(store);
        h.explorer
            .set_page("solwallet", live_page(items("0xlive", 5), Some(5)));

        let resp = h
            .orchestrator
            .load_history(&request("sol", "SolWallet", 5, 0))
            .await
            .unwrap();

        assert_eq!(h.explorer.calls(), 1);
        assert_eq!(resp.page.items[0].tx_hash, "0xlive0");
        assert_eq!(resp.page.next_offset, Some(5));
    }

    #[tokio::test]
    async fn short_local_offset_page_is_kept_off_ethereum() {
        let store = FakeWalletStore::default().with_events("sol", "solwallet", items("0xdb", 7));
        let h = harness(store);

        let resp = h
            .orchestrator
            .load_history(&request("sol", "solwallet", 5, 5))
            .await
            .unwrap();

        assert_eq!(h.explorer.calls(), 0);
        assert_eq!(resp.page.items.len(), 2);
        assert_eq!(resp.page.next_offset, None);
    }

    #[tokio::test]
    async fn full_local_page_reports_more() {
        let store = FakeWalletStore::default().with_events("sol", "solwallet", items("0xdb", 12));
        let h = harness(store);

        let resp = h
            .orchestrator
            .load_history(&request("sol", "solwallet", 5, 0))
            .await
            .unwrap();

        assert_eq!(resp.page.items.len(), 5);
        assert_eq!(resp.page.next_offset, Some(5));
    }

    #[tokio::test]
    async fn local_read_error_falls_through() {
        let store = FakeWalletStore::default();
        store.fail_history_with("connection refused");
        let h = harness(store);
        warm(&h.hot, "eth", "0xwallet", items("0xh", 2));

        let resp = h
            .orchestrator
            .load_history(&request("eth", "0xwallet", 5, 0))
            .await
            .unwrap();

        assert_eq!(resp.page.items[0].tx_hash, "0xh0");
    }

    #[tokio::test]
    async fn live_answers_go_to_request_cache_only() {
        let h = harness(FakeWalletStore::default());
        h.explorer.set_page(
            "0xwallet",
            live_page(
                vec![
                    history_item("0xapproval", 10, "USDT", Direction::Out, "0"),
                    history_item("0xreal", 9, "ETH", Direction::In, "4"),
                ],
                None,
            ),
        );
        let req = request("eth", "0xwallet", 10, 0);

        let first = h.orchestrator.load_history(&req).await.unwrap();
        let second = h.orchestrator.load_history(&req).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.page.items.len(), 1, "zero-value item dropped");
        assert_eq!(h.explorer.calls(), 1);
        assert_eq!(h.requests.len(), 1);
        assert!(h.hot.is_empty(), "orchestrator never writes the hot cache");
    }

    #[tokio::test]
    async fn request_cache_expires_after_fresh_window() {
        let h = harness(FakeWalletStore::default());
        h.explorer
            .set_page("0xwallet", live_page(items("0xlive", 1), None));
        let req = request("eth", "0xwallet", 10, 0);

        h.orchestrator.load_history(&req).await.unwrap();
        h.clock.advance_secs(31);
        h.orchestrator.load_history(&req).await.unwrap();

        assert_eq!(h.explorer.calls(), 2);
    }

    #[tokio::test]
    async fn hot_cache_view_respects_filters_and_offset() {
        let h = harness(FakeWalletStore::default());
        warm(
            &h.hot,
            "eth",
            "0xwallet",
            vec![
                history_item("0x1", 50, "ETH", Direction::In, "1"),
                history_item("0x2", 40, "USDC", Direction::In, "1"),
                history_item("0x3", 30, "ETH", Direction::Out, "1"),
                history_item("0x4", 20, "ETH", Direction::In, "1"),
                history_item("0x5", 10, "ETH", Direction::In, "1"),
            ],
        );
        let mut req = request("eth", "0xwallet", 1, 1);
        req.kind = KindFilter::Native;
        req.direction = DirectionFilter::In;

        let resp = h.orchestrator.load_history(&req).await.unwrap();

        assert_eq!(resp.page.items[0].tx_hash, "0x4");
        assert_eq!(resp.page.next_offset, Some(2));
    }

    #[tokio::test]
    async fn empty_hot_view_falls_through_to_explorer() {
        let h = harness(FakeWalletStore::default());
        warm(&h.hot, "eth", "0xwallet", items("0xh", 2));

        let mut req = request("eth", "0xwallet", 5, 0);
        req.kind = KindFilter::Token;
        h.orchestrator.load_history(&req).await.unwrap();

        assert_eq!(h.explorer.calls(), 1);
        let query = &h.explorer.queries()[0];
        assert_eq!(query.kind, KindFilter::Token);
        assert_eq!(query.limit, 5);
    }

    #[tokio::test]
    async fn throttled_user_gets_stale_data() {
        let h = harness(FakeWalletStore::default());
        warm(&h.hot, "eth", "0xwallet", items("0xh", 2));
        h.gate.0.store(false, Ordering::SeqCst);

        let resp = h
            .orchestrator
            .load_history(&request("eth", "0xwallet", 5, 0))
            .await
            .unwrap();

        assert_eq!(resp.freshness, Freshness::Stale);
        assert_eq!(h.explorer.calls(), 0);
    }

    #[tokio::test]
    async fn throttled_user_without_stale_data_fails() {
        let h = harness(FakeWalletStore::default());
        h.gate.0.store(false, Ordering::SeqCst);

        let err = h
            .orchestrator
            .load_history(&request("eth", "0xwallet", 5, 0))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Throttled(ref u) if u == "alice"));
    }

    #[tokio::test]
    async fn rejects_unknown_chain_and_empty_address() {
        let h = harness(FakeWalletStore::default());

        let err = h
            .orchestrator
            .load_history(&request("doge", "D123", 5, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ChainNotFound(_)));

        let err = h
            .orchestrator
            .load_history(&request("eth", "  ", 5, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidQuery(_)));
    }

    #[tokio::test]
    async fn limit_is_clamped() {
        let h = harness(FakeWalletStore::default());
        h.orchestrator
            .load_history(&request("eth", "0xwallet", 10_000, 0))
            .await
            .unwrap();
        h.orchestrator
            .load_history(&request("eth", "0xother", 0, 0))
            .await
            .unwrap();

        let queries = h.explorer.queries();
        assert_eq!(queries[0].limit, MAX_PAGE_LIMIT);
        assert_eq!(queries[1].limit, 1);
    }
}
