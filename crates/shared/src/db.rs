//! Read-only Postgres access to the tracked-wallet store.
//!
//! The schema is owned and migrated by the ingester; this module only queries
//! `tracked_wallets`, `wallet_subscriptions` and `wallet_events`.

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::chains;
use crate::error::AppError;
use crate::models::{Direction, HistoryItem, PopularWalletRef};
use crate::sources::{PersistedHistorySource, PopularWalletSource};

/// Creates a connection pool with up to 10 connections.
pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
}

/// `(tx_hash, timestamp_sec, from, to, value_raw, is_error, asset_symbol, asset_decimals,
/// direction, tx_link)` as selected from `wallet_events`.
type EventRow = (
    String,
    i64,
    String,
    String,
    String,
    bool,
    String,
    i32,
    String,
    Option<String>,
);

#[derive(Clone)]
pub struct PgHistoryStore {
    pool: PgPool,
}

impl PgHistoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PopularWalletSource for PgHistoryStore {
    async fn list_most_popular_tracked_wallets(
        &self,
        limit: usize,
    ) -> Result<Vec<PopularWalletRef>, AppError> {
        let rows: Vec<(i64, String, String, i64)> = sqlx::query_as(
            "SELECT w.id, w.chain_key, w.address, COUNT(s.user_id) AS subscriber_count \
             FROM tracked_wallets w \
             JOIN wallet_subscriptions s ON s.wallet_id = w.id \
             GROUP BY w.id, w.chain_key, w.address \
             ORDER BY subscriber_count DESC, w.id ASC \
             LIMIT $1",
        )
        .bind(to_i64(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(wallet_id, chain_key, address, subscriber_count)| PopularWalletRef {
                    wallet_id,
                    chain_key,
                    address,
                    subscriber_count,
                },
            )
            .collect())
    }
}

#[async_trait]
impl PersistedHistorySource for PgHistoryStore {
    async fn list_recent_by_tracked_address(
        &self,
        chain_key: &str,
        address: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<HistoryItem>, AppError> {
        let rows: Vec<EventRow> = sqlx::query_as(
            "SELECT tx_hash, timestamp_sec, from_address, to_address, value_raw, is_error, \
                    asset_symbol, asset_decimals, direction, tx_link \
             FROM wallet_events \
             WHERE chain_key = $1 AND lower(tracked_address) = $2 \
             ORDER BY timestamp_sec DESC, id DESC \
             LIMIT $3 OFFSET $4",
        )
        .bind(chain_key)
        .bind(address.to_lowercase())
        .bind(to_i64(limit))
        .bind(to_i64(offset))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| event_row_to_item(chain_key, row))
            .collect())
    }
}

fn event_row_to_item(chain_key: &str, row: EventRow) -> HistoryItem {
    let (
        tx_hash,
        timestamp_sec,
        from,
        to,
        value_raw,
        is_error,
        asset_symbol,
        asset_decimals,
        direction,
        tx_link,
    ) = row;

    let tx_link = tx_link
        .filter(|l| !l.is_empty())
        .or_else(|| chains::chain_by_key(chain_key).map(|c| c.tx_link(&tx_hash)))
        .unwrap_or_default();

    HistoryItem {
        timestamp_sec,
        from,
        to,
        value_raw,
        is_error,
        asset_symbol,
        asset_decimals: u8::try_from(asset_decimals.clamp(0, 255)).unwrap_or(0),
        direction: parse_direction(&direction),
        tx_link,
        tx_hash,
    }
}

fn parse_direction(raw: &str) -> Direction {
    match raw.trim().to_ascii_uppercase().as_str() {
        "IN" => Direction::In,
        "OUT" => Direction::Out,
        _ => Direction::Unknown,
    }
}

fn to_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}
