//! In-memory collaborators for tests. Enabled for dependents through the `testing` feature.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::AppError;
use crate::explorer::{ExplorerQuery, HistoryExplorerAdapter};
use crate::models::{Direction, HistoryItem, HistoryPage, PopularWalletRef};
use crate::sources::{PersistedHistorySource, PopularWalletSource};

/// Builds a history item with throwaway addresses and link.
pub fn history_item(
    tx_hash: &str,
    timestamp_sec: i64,
    asset_symbol: &str,
    direction: Direction,
    value_raw: &str,
) -> HistoryItem {
    HistoryItem {
        tx_hash: tx_hash.to_string(),
        timestamp_sec,
        from: "0xfrom".to_string(),
        to: "0xto".to_string(),
        value_raw: value_raw.to_string(),
        is_error: false,
        asset_symbol: asset_symbol.to_string(),
        asset_decimals: 18,
        direction,
        tx_link: format!("https://example.test/tx/{tx_hash}"),
    }
}

pub fn popular_wallet(wallet_id: i64, chain_key: &str, address: &str) -> PopularWalletRef {
    PopularWalletRef {
        wallet_id,
        chain_key: chain_key.to_string(),
        address: address.to_string(),
        subscriber_count: 100 - wallet_id,
    }
}

/// Explorer returning canned pages per address, or failing with a classified message.
#[derive(Default)]
pub struct FakeExplorer {
    pages: Mutex<HashMap<String, HistoryPage>>,
    failure: Mutex<Option<String>>,
    delay: Option<Duration>,
    queries: Mutex<Vec<ExplorerQuery>>,
    calls: AtomicUsize,
}

impl FakeExplorer {
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_page(self, address: &str, page: HistoryPage) -> Self {
        self.set_page(address, page);
        self
    }

    pub fn set_page(&self, address: &str, page: HistoryPage) {
        self.pages.lock().insert(address.to_lowercase(), page);
    }

    /// Every later call fails with `message`, classified like a real adapter error.
    pub fn fail_with(&self, message: &str) {
        *self.failure.lock() = Some(message.to_string());
    }

    pub fn succeed(&self) {
        *self.failure.lock() = None;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> Vec<ExplorerQuery> {
        self.queries.lock().clone()
    }
}

#[async_trait]
impl HistoryExplorerAdapter for FakeExplorer {
    async fn load_recent_transactions(
        &self,
        query: &ExplorerQuery,
    ) -> Result<HistoryPage, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().push(query.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(message) = self.failure.lock().clone() {
            return Err(AppError::from_upstream_message(message));
        }

        Ok(self
            .pages
            .lock()
            .get(&query.address.to_lowercase())
            .cloned()
            .unwrap_or_default())
    }
}

/// Tracked-wallet store backed by plain vectors.
#[derive(Default)]
pub struct FakeWalletStore {
    wallets: Mutex<Vec<PopularWalletRef>>,
    events: Mutex<HashMap<(String, String), Vec<HistoryItem>>>,
    history_failure: Mutex<Option<String>>,
    history_calls: AtomicUsize,
}

impl FakeWalletStore {
    pub fn with_wallets(self, wallets: Vec<PopularWalletRef>) -> Self {
        *self.wallets.lock() = wallets;
        self
    }

    /// Events must be given newest first.
    pub fn with_events(self, chain_key: &str, address: &str, events: Vec<HistoryItem>) -> Self {
        self.events
            .lock()
            .insert((chain_key.to_string(), address.to_lowercase()), events);
        self
    }

    pub fn fail_history_with(&self, message: &str) {
        *self.history_failure.lock() = Some(message.to_string());
    }

    pub fn history_calls(&self) -> usize {
        self.history_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PopularWalletSource for FakeWalletStore {
    async fn list_most_popular_tracked_wallets(
        &self,
        limit: usize,
    ) -> Result<Vec<PopularWalletRef>, AppError> {
        let mut wallets = self.wallets.lock().clone();
        wallets.sort_by(|a, b| b.subscriber_count.cmp(&a.subscriber_count));
        wallets.truncate(limit);
        Ok(wallets)
    }
}

#[async_trait]
impl PersistedHistorySource for FakeWalletStore {
    async fn list_recent_by_tracked_address(
        &self,
        chain_key: &str,
        address: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<HistoryItem>, AppError> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.history_failure.lock().clone() {
            return Err(AppError::Upstream(message));
        }

        Ok(self
            .events
            .lock()
            .get(&(chain_key.to_string(), address.to_lowercase()))
            .map(|events| events.iter().skip(offset).take(limit).cloned().collect())
            .unwrap_or_default())
    }
}
