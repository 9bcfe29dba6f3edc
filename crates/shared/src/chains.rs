//! Static chain configuration for every supported network.
//!
//! Chains are compile-time constants looked up by their short key (`eth`, `sol`, `tron`).

use std::collections::HashMap;
use std::sync::LazyLock;

/// Configuration for a single chain.
///
/// All fields are `&'static` or Copy types, so lookups never allocate.
#[derive(Debug, Clone, Copy)]
pub struct ChainConfig {
    /// Short key used in routes, cache keys and the persisted store.
    pub key: &'static str,
    /// Human-readable chain name (e.g. "Ethereum").
    pub name: &'static str,
    /// Asset symbols that count as the chain's native currency for kind filtering.
    pub native_symbols: &'static [&'static str],
    /// Whether the local event ingester is trusted to hold complete first pages.
    ///
    /// When false, a short first page from the persisted store is treated as inconclusive
    /// and the request falls through to the cache/explorer tiers.
    pub local_store_authoritative: bool,
    /// Explorer URL prefix for transaction links.
    pub tx_link_prefix: &'static str,
}

impl ChainConfig {
    /// Case-insensitive match against the native symbol set.
    pub fn is_native_symbol(&self, symbol: &str) -> bool {
        self.native_symbols
            .iter()
            .any(|s| s.eq_ignore_ascii_case(symbol))
    }

    pub fn tx_link(&self, tx_hash: &str) -> String {
        format!("{}{tx_hash}", self.tx_link_prefix)
    }
}

pub static CHAINS: &[ChainConfig] = &[
    ChainConfig {
        key: "eth",
        name: "Ethereum",
        native_symbols: &["ETH"],
        local_store_authoritative: true,
        tx_link_prefix: "https://etherscan.io/tx/",
    },
    ChainConfig {
        key: "sol",
        name: "Solana",
        native_symbols: &["SOL"],
        local_store_authoritative: false,
        tx_link_prefix: "https://solscan.io/tx/",
    },
    ChainConfig {
        key: "tron",
        name: "TRON",
        native_symbols: &["TRX"],
        local_store_authoritative: false,
        tx_link_prefix: "https://tronscan.org/#/transaction/",
    },
];

/// Lookup table from key -> ChainConfig, built once on first access.
static CHAIN_BY_KEY: LazyLock<HashMap<&'static str, &'static ChainConfig>> =
    LazyLock::new(|| CHAINS.iter().map(|c| (c.key, c)).collect());

/// Returns the chain config for a chain key, or `None` if unsupported.
pub fn chain_by_key(key: &str) -> Option<&'static ChainConfig> {
    CHAIN_BY_KEY.get(key).copied()
}
