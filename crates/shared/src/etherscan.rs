//! Etherscan explorer adapter for Ethereum mainnet.
//!
//! Native transfers come from `account/txlist`, ERC-20 transfers from `account/tokentx`.
//! Etherscan pages by `page`/`offset` (page size), so the adapter always reads the first
//! `offset + limit + 1` rows newest-first and slices locally; that keeps arbitrary offsets
//! working and tells us whether anything lies past the requested page.
//!
//! A semaphore (5 permits) keeps us inside the free-tier limit of 5 calls per second.
//!
//! See: <https://docs.etherscan.io/etherscan-v2/api-endpoints/accounts>

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio::sync::Semaphore;

use crate::chains::{self, ChainConfig};
use crate::error::AppError;
use crate::explorer::{ExplorerQuery, HistoryExplorerAdapter};
use crate::filters::{matches_direction, page_from_items};
use crate::models::{Direction, HistoryItem, HistoryPage, KindFilter};

const ETHERSCAN_API_BASE: &str = "https://api.etherscan.io/v2/api";
const ETHEREUM_CHAIN_ID: u32 = 1;
/// Etherscan refuses `page * offset` above 10k.
const MAX_WINDOW: usize = 10_000;

#[derive(Debug, Deserialize)]
struct EtherscanResponse {
    status: String,
    message: String,
    result: serde_json::Value,
}

/// One row of `txlist` or `tokentx`. Token fields are absent on native rows.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTransfer {
    hash: String,
    time_stamp: String,
    from: String,
    #[serde(default)]
    to: String,
    value: String,
    #[serde(default)]
    is_error: Option<String>,
    #[serde(default)]
    token_symbol: Option<String>,
    #[serde(default)]
    token_decimal: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    NativeTransfers,
    TokenTransfers,
}

impl Action {
    fn as_str(self) -> &'static str {
        match self {
            Self::NativeTransfers => "txlist",
            Self::TokenTransfers => "tokentx",
        }
    }
}

/// HTTP client for the Etherscan accounts API.
pub struct EtherscanClient {
    client: Client,
    api_key: String,
    semaphore: Arc<Semaphore>,
    chain: &'static ChainConfig,
}

impl EtherscanClient {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, AppError> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(AppError::NoEndpoint("etherscan api key is empty".into()));
        }
        let chain = chains::chain_by_key("eth")
            .ok_or_else(|| AppError::NoEndpoint("ethereum chain config missing".into()))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::NoEndpoint(e.to_string()))?;

        Ok(Self {
            client,
            api_key,
            semaphore: Arc::new(Semaphore::new(5)),
            chain,
        })
    }

    async fn fetch(
        &self,
        action: Action,
        address: &str,
        window: usize,
    ) -> Result<Vec<HistoryItem>, AppError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| AppError::Aborted("etherscan client shut down".into()))?;

        let resp = self
            .client
            .get(ETHERSCAN_API_BASE)
            .query(&[
                ("chainid", ETHEREUM_CHAIN_ID.to_string()),
                ("module", "account".to_string()),
                ("action", action.as_str().to_string()),
                ("address", address.to_string()),
                ("startblock", "0".to_string()),
                ("endblock", "99999999".to_string()),
                ("page", "1".to_string()),
                ("offset", window.to_string()),
                ("sort", "desc".to_string()),
                ("apikey", self.api_key.clone()),
            ])
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(AppError::RateLimited(format!(
                "etherscan {} returned HTTP 429",
                action.as_str()
            )));
        }
        if !status.is_success() {
            return Err(AppError::from_upstream_message(format!(
                "etherscan {} returned HTTP {}",
                action.as_str(),
                status.as_u16()
            )));
        }

        let body = resp.text().await.map_err(map_transport_error)?;
        parse_response(&body, self.chain, address, action)
    }
}

#[async_trait]
impl HistoryExplorerAdapter for EtherscanClient {
    async fn load_recent_transactions(
        &self,
        query: &ExplorerQuery,
    ) -> Result<HistoryPage, AppError> {
        if query.chain_key != self.chain.key {
            return Err(AppError::UnsupportedChain(query.chain_key.clone()));
        }

        let window = query
            .offset
            .saturating_add(query.limit)
            .saturating_add(1)
            .min(MAX_WINDOW);

        let mut items = Vec::new();
        let mut truncated = false;
        if query.kind != KindFilter::Token {
            let native = self
                .fetch(Action::NativeTransfers, &query.address, window)
                .await?;
            truncated |= native.len() >= window;
            items.extend(native);
        }
        if query.kind != KindFilter::Native {
            let tokens = self
                .fetch(Action::TokenTransfers, &query.address, window)
                .await?;
            truncated |= tokens.len() >= window;
            items.extend(tokens);
        }

        items.sort_by(|a, b| b.timestamp_sec.cmp(&a.timestamp_sec));
        let filtered: Vec<HistoryItem> = items
            .into_iter()
            .filter(|item| matches_direction(item, query.direction))
            .collect();

        Ok(page_from_items(
            filtered,
            query.offset,
            query.limit,
            truncated,
        ))
    }
}

fn map_transport_error(e: reqwest::Error) -> AppError {
    if e.is_timeout() {
        AppError::Timeout(e.to_string())
    } else if e.status() == Some(StatusCode::TOO_MANY_REQUESTS) {
        AppError::RateLimited(e.to_string())
    } else {
        AppError::from_upstream_message(e.to_string())
    }
}

/// Parses an Etherscan accounts response into history items for `address`.
///
/// Etherscan reports errors with `status: "0"` and a string `result`; an empty history is
/// also `status: "0"` but with `message: "No transactions found"` and an empty array.
fn parse_response(
    body: &str,
    chain: &ChainConfig,
    address: &str,
    action: Action,
) -> Result<Vec<HistoryItem>, AppError> {
    let resp: EtherscanResponse = serde_json::from_str(body)
        .map_err(|e| AppError::Upstream(format!("malformed etherscan response: {e}")))?;

    let rows = match resp.result {
        serde_json::Value::Array(rows) => rows,
        serde_json::Value::String(reason) if resp.status != "1" => {
            return Err(AppError::from_upstream_message(reason));
        }
        other if resp.status != "1" => {
            return Err(AppError::from_upstream_message(format!(
                "{}: {other}",
                resp.message
            )));
        }
        other => {
            return Err(AppError::Upstream(format!(
                "unexpected etherscan result: {other}"
            )))
        }
    };

    let address = address.to_lowercase();
    rows.into_iter()
        .map(|row| {
            let raw: RawTransfer = serde_json::from_value(row)
                .map_err(|e| AppError::Upstream(format!("malformed etherscan row: {e}")))?;
            Ok(to_history_item(chain, &address, action, raw))
        })
        .collect()
}

fn to_history_item(
    chain: &ChainConfig,
    address: &str,
    action: Action,
    raw: RawTransfer,
) -> HistoryItem {
    let direction = if raw.to.eq_ignore_ascii_case(address) {
        Direction::In
    } else if raw.from.eq_ignore_ascii_case(address) {
        Direction::Out
    } else {
        Direction::Unknown
    };

    let (asset_symbol, asset_decimals) = match action {
        Action::NativeTransfers => (chain.native_symbols[0].to_string(), 18),
        Action::TokenTransfers => (
            raw.token_symbol.unwrap_or_default(),
            raw.token_decimal
                .and_then(|d| d.parse().ok())
                .unwrap_or(0),
        ),
    };

    HistoryItem {
        tx_link: chain.tx_link(&raw.hash),
        timestamp_sec: raw.time_stamp.parse().unwrap_or(0),
        is_error: raw.is_error.as_deref() == Some("1"),
        tx_hash: raw.hash,
        from: raw.from,
        to: raw.to,
        value_raw: raw.value,
        asset_symbol,
        asset_decimals,
        direction,
    }
}
