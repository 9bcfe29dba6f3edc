//! Read-only collaborator contracts for the tracked-wallet store.

use async_trait::async_trait;

use crate::error::AppError;
use crate::models::{HistoryItem, PopularWalletRef};

/// Ranks tracked wallets by subscriber count.
#[async_trait]
pub trait PopularWalletSource: Send + Sync {
    /// At most `limit` wallets, most subscribed first.
    async fn list_most_popular_tracked_wallets(
        &self,
        limit: usize,
    ) -> Result<Vec<PopularWalletRef>, AppError>;
}

/// Events already persisted by the local ingester.
#[async_trait]
pub trait PersistedHistorySource: Send + Sync {
    /// Newest first.
    async fn list_recent_by_tracked_address(
        &self,
        chain_key: &str,
        address: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<HistoryItem>, AppError>;
}
