// Storage seams used by the trading core
pub mod memory;
pub mod redis;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{NewPosition, NewSell, Position, PricePoint, Sell, TradingPair};
use crate::Result;

pub use memory::InMemoryStore;
pub use self::redis::RedisPersistence;

/// Append-only price history
#[async_trait]
pub trait PriceStore: Send + Sync {
    /// Record a freshly ingested price, timestamped now
    async fn create_price(&self, token_id: i32, price: f64) -> Result<PricePoint>;

    /// Most recent stored price for a token
    async fn get_latest_price(&self, token_id: i32) -> Result<Option<f64>>;

    /// Prices at or after `since`, oldest first
    async fn get_recent_prices(
        &self,
        token_id: i32,
        since: DateTime<Utc>,
    ) -> Result<Vec<PricePoint>>;

    /// Drop prices older than `before`; returns how many were removed
    async fn prune_prices(&self, token_id: i32, before: DateTime<Utc>) -> Result<usize>;
}

/// Buy orders (positions) and the sells that close them
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn create_position(&self, position: NewPosition) -> Result<Position>;

    async fn create_sell(&self, sell: NewSell) -> Result<Sell>;

    /// Positions on `target_token_id` with no referencing sell
    async fn get_open_positions(&self, target_token_id: i32) -> Result<Vec<Position>>;

    /// Positions on `target_token_id` created at or after `since`, open or not
    async fn get_recent_position_count(
        &self,
        target_token_id: i32,
        since: DateTime<Utc>,
    ) -> Result<usize>;
}

/// Source of per-pair trading settings
#[async_trait]
pub trait SettingsSource: Send + Sync {
    async fn active_pairs(&self) -> Result<Vec<TradingPair>>;
}

/// A submitted swap whose outcome has not been settled yet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub signature: String,
    pub pair_id: i32,
    pub description: String,
    #[serde(default)]
    pub position_id: Option<Uuid>, // set for sells
    pub submitted_at: DateTime<Utc>,
}

/// Write-ahead record of submitted swaps
///
/// An entry is written as soon as the RPC node accepts a transaction and
/// resolved once the swap is known to have failed or its order is
/// persisted. Entries left unresolved (unknown outcome, crash) are surfaced
/// for manual reconciliation; nothing is replayed automatically.
#[async_trait]
pub trait SwapJournal: Send + Sync {
    async fn record(&self, entry: JournalEntry) -> Result<()>;

    async fn resolve(&self, signature: &str) -> Result<()>;

    async fn unresolved(&self) -> Result<Vec<JournalEntry>>;
}
