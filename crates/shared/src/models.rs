//! History data model plus API response types.
//!
//! All wire types use `camelCase` field names for the JSON format.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Direction of an asset movement relative to the queried wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    In,
    Out,
    Unknown,
}

/// One asset movement touching a wallet.
///
/// A single transaction can produce several items (e.g. both legs of a swap), which is why
/// identity is the composite in [`crate::filters::ItemIdentity`] rather than `tx_hash` alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    pub tx_hash: String,
    /// Unix seconds.
    pub timestamp_sec: i64,
    pub from: String,
    pub to: String,
    /// Integer amount in the asset's smallest unit, as a decimal string.
    pub value_raw: String,
    pub is_error: bool,
    pub asset_symbol: String,
    pub asset_decimals: u8,
    pub direction: Direction,
    pub tx_link: String,
}

/// A page of history items.
///
/// `next_offset` is a plain offset into the filtered sequence. `None` means no further items
/// are known, not that the total count is `offset + limit`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPage {
    pub items: Vec<HistoryItem>,
    pub next_offset: Option<usize>,
}

/// Which assets a history query is interested in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum KindFilter {
    #[default]
    All,
    Native,
    Token,
}

/// Which direction of movement a history query is interested in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DirectionFilter {
    #[default]
    All,
    In,
    Out,
}

/// A tracked wallet ranked by how many users follow it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopularWalletRef {
    pub wallet_id: i64,
    pub chain_key: String,
    pub address: String,
    pub subscriber_count: i64,
}

/// Identifies one wallet's cached timeline. Addresses are stored lowercased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HotCacheKey {
    pub chain_key: String,
    pub address: String,
}

impl HotCacheKey {
    pub fn new(chain_key: &str, address: &str) -> Self {
        Self {
            chain_key: chain_key.to_string(),
            address: address.to_lowercase(),
        }
    }
}

/// A wallet's warmed history, newest first and capped at the configured item count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotCacheEntry {
    pub key: HotCacheKey,
    pub created_at_ms: i64,
    pub fresh_until_ms: i64,
    pub stale_until_ms: i64,
    pub items: Vec<HistoryItem>,
    /// The explorer reported more rows past its first page, or the timeline was cut at the
    /// item cap. Readers must not treat the end of `items` as the end of history.
    pub has_more: bool,
}

/// Response for chain information endpoints.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChainResponse {
    /// Short chain key used in routes (e.g. "eth").
    pub key: &'static str,
    /// Human-readable chain name.
    pub name: &'static str,
    /// Native asset symbols used by the `native` kind filter.
    pub native_symbols: Vec<&'static str>,
}

/// Response for the wallet history endpoint.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponseBody {
    pub items: Vec<HistoryItem>,
    pub next_offset: Option<usize>,
    /// True when the answer came from an aged cache entry because upstream was unavailable.
    pub stale: bool,
}

/// Live statistics for one named cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// Entries physically present, including expired ones not yet dropped.
    pub keys: usize,
    pub hits: u64,
    pub misses: u64,
}

/// One row of the cache-stats endpoint.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NamedCacheStats {
    /// Registry name (e.g. "hot_cache").
    pub name: String,
    pub keys: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Top-level error response body.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Inner error detail with machine-readable code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g. "CHAIN_NOT_FOUND", "TOO_MANY_REQUESTS").
    pub code: String,
    /// Human-readable error description.
    pub message: String,
}
