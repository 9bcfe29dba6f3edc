//! Explorer adapter contract and the per-chain router.
//!
//! Every chain integration implements [`HistoryExplorerAdapter`]. The router is a plain lookup
//! table built once at startup and is the only place that enforces the per-call timeout, so a
//! slow upstream surfaces as [`AppError::Timeout`] regardless of the adapter.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::AppError;
use crate::models::{DirectionFilter, HistoryPage, KindFilter};

/// Parameters for one explorer history call.
#[derive(Debug, Clone, PartialEq)]
pub struct ExplorerQuery {
    pub chain_key: String,
    pub address: String,
    pub limit: usize,
    pub offset: usize,
    pub kind: KindFilter,
    pub direction: DirectionFilter,
    /// Adapters without price data ignore this.
    pub min_amount_usd: Option<f64>,
}

impl ExplorerQuery {
    /// First page of everything, as requested by the refresh engine.
    pub fn first_page(chain_key: &str, address: &str, limit: usize) -> Self {
        Self {
            chain_key: chain_key.to_string(),
            address: address.to_string(),
            limit,
            offset: 0,
            kind: KindFilter::All,
            direction: DirectionFilter::All,
            min_amount_usd: None,
        }
    }
}

/// Loads recent wallet activity from a chain explorer.
///
/// Failures must be classified through [`AppError`]'s upstream variants (or
/// [`AppError::from_upstream_message`]) so callers can tell transient from fatal errors.
#[async_trait]
pub trait HistoryExplorerAdapter: Send + Sync {
    async fn load_recent_transactions(&self, query: &ExplorerQuery)
        -> Result<HistoryPage, AppError>;
}

/// Routes explorer calls to the adapter registered for the query's chain.
#[derive(Clone)]
pub struct ExplorerRouter {
    adapters: HashMap<String, Arc<dyn HistoryExplorerAdapter>>,
    timeout: Duration,
}

impl ExplorerRouter {
    pub fn new(timeout: Duration) -> Self {
        Self {
            adapters: HashMap::new(),
            timeout,
        }
    }

    pub fn with_adapter(
        mut self,
        chain_key: impl Into<String>,
        adapter: Arc<dyn HistoryExplorerAdapter>,
    ) -> Self {
        self.adapters.insert(chain_key.into(), adapter);
        self
    }

    pub fn supports(&self, chain_key: &str) -> bool {
        self.adapters.contains_key(chain_key)
    }

    pub fn chain_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.adapters.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }
}

#[async_trait]
impl HistoryExplorerAdapter for ExplorerRouter {
    async fn load_recent_transactions(
        &self,
        query: &ExplorerQuery,
    ) -> Result<HistoryPage, AppError> {
        let adapter = self
            .adapters
            .get(&query.chain_key)
            .ok_or_else(|| AppError::UnsupportedChain(query.chain_key.clone()))?;

        match tokio::time::timeout(self.timeout, adapter.load_recent_transactions(query)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Timeout(format!(
                "explorer call for {} timed out after {}ms",
                query.chain_key,
                self.timeout.as_millis()
            ))),
        }
    }
}
