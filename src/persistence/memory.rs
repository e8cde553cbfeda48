use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::{JournalEntry, OrderStore, PriceStore, SettingsSource, SwapJournal};
use crate::models::{NewPosition, NewSell, Position, PricePoint, Sell, TradingPair};
use crate::Result;

#[derive(Default)]
struct Inner {
    prices: Vec<PricePoint>,
    positions: Vec<Position>,
    sells: Vec<Sell>,
    pairs: Vec<TradingPair>,
    journal: Vec<JournalEntry>,
}

/// Process-local store implementing every storage seam
///
/// Backs the integration tests; nothing survives a restart.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pairs(pairs: Vec<TradingPair>) -> Self {
        let store = Self::default();
        if let Ok(mut inner) = store.inner.lock() {
            inner.pairs = pairs;
        }
        store
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|e| format!("In-memory store poisoned: {}", e).into())
    }

    /// Insert a price point with an explicit timestamp (history seeding)
    pub fn insert_price_point(&self, point: PricePoint) -> Result<()> {
        let mut inner = self.lock()?;
        // Keep history ordered even if seeded out of order
        let idx = inner
            .prices
            .partition_point(|p| p.timestamp <= point.timestamp);
        inner.prices.insert(idx, point);
        Ok(())
    }

    /// Insert a position with an explicit creation time
    pub fn insert_position(&self, position: Position) -> Result<()> {
        self.lock()?.positions.push(position);
        Ok(())
    }

    pub fn positions(&self) -> Result<Vec<Position>> {
        Ok(self.lock()?.positions.clone())
    }

    pub fn sells(&self) -> Result<Vec<Sell>> {
        Ok(self.lock()?.sells.clone())
    }
}

#[async_trait]
impl PriceStore for InMemoryStore {
    async fn create_price(&self, token_id: i32, price: f64) -> Result<PricePoint> {
        let point = PricePoint {
            token_id,
            price,
            timestamp: Utc::now(),
        };
        self.insert_price_point(point.clone())?;
        Ok(point)
    }

    async fn get_latest_price(&self, token_id: i32) -> Result<Option<f64>> {
        Ok(self
            .lock()?
            .prices
            .iter()
            .rev()
            .find(|p| p.token_id == token_id)
            .map(|p| p.price))
    }

    async fn get_recent_prices(
        &self,
        token_id: i32,
        since: DateTime<Utc>,
    ) -> Result<Vec<PricePoint>> {
        Ok(self
            .lock()?
            .prices
            .iter()
            .filter(|p| p.token_id == token_id && p.timestamp >= since)
            .cloned()
            .collect())
    }

    async fn prune_prices(&self, token_id: i32, before: DateTime<Utc>) -> Result<usize> {
        let mut inner = self.lock()?;
        let len = inner.prices.len();
        inner
            .prices
            .retain(|p| p.token_id != token_id || p.timestamp >= before);
        Ok(len - inner.prices.len())
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn create_position(&self, new: NewPosition) -> Result<Position> {
        let position = Position {
            id: Uuid::new_v4(),
            base_token_id: new.base_token_id,
            target_token_id: new.target_token_id,
            amount_spent: new.amount_spent,
            amount_received: new.amount_received,
            price: new.price,
            created_at: Utc::now(),
        };
        self.lock()?.positions.push(position.clone());
        Ok(position)
    }

    async fn create_sell(&self, new: NewSell) -> Result<Sell> {
        let mut inner = self.lock()?;
        if !inner.positions.iter().any(|p| p.id == new.buy_order_id) {
            return Err(format!("Position {} not found", new.buy_order_id).into());
        }

        let sell = Sell {
            id: Uuid::new_v4(),
            buy_order_id: new.buy_order_id,
            from_token_id: new.from_token_id,
            to_token_id: new.to_token_id,
            amount_sent: new.amount_sent,
            amount_received: new.amount_received,
            price: new.price,
            created_at: Utc::now(),
        };
        inner.sells.push(sell.clone());
        Ok(sell)
    }

    async fn get_open_positions(&self, target_token_id: i32) -> Result<Vec<Position>> {
        let inner = self.lock()?;
        Ok(inner
            .positions
            .iter()
            .filter(|p| p.target_token_id == target_token_id)
            .filter(|p| !inner.sells.iter().any(|s| s.buy_order_id == p.id))
            .cloned()
            .collect())
    }

    async fn get_recent_position_count(
        &self,
        target_token_id: i32,
        since: DateTime<Utc>,
    ) -> Result<usize> {
        Ok(self
            .lock()?
            .positions
            .iter()
            .filter(|p| p.target_token_id == target_token_id && p.created_at >= since)
            .count())
    }
}

#[async_trait]
impl SettingsSource for InMemoryStore {
    async fn active_pairs(&self) -> Result<Vec<TradingPair>> {
        Ok(self
            .lock()?
            .pairs
            .iter()
            .filter(|p| p.is_active)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SwapJournal for InMemoryStore {
    async fn record(&self, entry: JournalEntry) -> Result<()> {
        self.lock()?.journal.push(entry);
        Ok(())
    }

    async fn resolve(&self, signature: &str) -> Result<()> {
        self.lock()?.journal.retain(|e| e.signature != signature);
        Ok(())
    }

    async fn unresolved(&self) -> Result<Vec<JournalEntry>> {
        Ok(self.lock()?.journal.clone())
    }
}
