use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use serde::{Deserialize, Serialize};
use tokio::time::{timeout, Duration};

use super::{JournalEntry, PriceStore, SwapJournal};
use crate::models::PricePoint;
use crate::Result;

const JOURNAL_KEY: &str = "swap_journal";

/// Price tick as stored in Redis
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredPrice {
    price: f64,
    timestamp: DateTime<Utc>,
}

/// Redis persistence for price history and the swap journal
///
/// Prices live in sorted sets `prices:{token_id}` scored by timestamp
/// (milliseconds) for time-range queries. The journal is a hash keyed by
/// transaction signature.
#[derive(Clone)]
pub struct RedisPersistence {
    conn: ConnectionManager,
}

impl RedisPersistence {
    /// Connect to Redis
    ///
    /// # Arguments
    /// * `redis_url` - Redis connection URL (e.g., "redis://127.0.0.1:6379")
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;

        // Add 5 second timeout to connection attempt
        let conn = timeout(Duration::from_secs(5), ConnectionManager::new(client))
            .await
            .map_err(|_| "Redis connection timeout after 5 seconds")??;

        tracing::info!("Connected to Redis at {}", redis_url);

        Ok(Self { conn })
    }

    fn price_key(token_id: i32) -> String {
        format!("prices:{}", token_id)
    }

    fn decode(token_id: i32, json_str: &str) -> Result<PricePoint> {
        let stored: StoredPrice = serde_json::from_str(json_str)?;
        Ok(PricePoint {
            token_id,
            price: stored.price,
            timestamp: stored.timestamp,
        })
    }

    /// Insert a price point with an explicit timestamp
    pub async fn save_price(&self, point: &PricePoint) -> Result<()> {
        let stored = StoredPrice {
            price: point.price,
            timestamp: point.timestamp,
        };
        let value = serde_json::to_string(&stored)?;
        let score = point.timestamp.timestamp_millis() as f64;

        let mut conn = self.conn.clone();
        conn.zadd::<_, _, _, ()>(Self::price_key(point.token_id), value, score)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl PriceStore for RedisPersistence {
    async fn create_price(&self, token_id: i32, price: f64) -> Result<PricePoint> {
        let point = PricePoint {
            token_id,
            price,
            timestamp: Utc::now(),
        };
        self.save_price(&point).await?;
        Ok(point)
    }

    async fn get_latest_price(&self, token_id: i32) -> Result<Option<f64>> {
        let mut conn = self.conn.clone();
        let latest: Vec<String> = conn.zrevrange(Self::price_key(token_id), 0, 0).await?;

        latest
            .first()
            .map(|json_str| Self::decode(token_id, json_str).map(|p| p.price))
            .transpose()
    }

    async fn get_recent_prices(
        &self,
        token_id: i32,
        since: DateTime<Utc>,
    ) -> Result<Vec<PricePoint>> {
        let min_score = since.timestamp_millis() as f64;

        let mut conn = self.conn.clone();
        let results: Vec<String> = conn
            .zrangebyscore(Self::price_key(token_id), min_score, "+inf")
            .await?;

        let points = results
            .iter()
            .map(|json_str| Self::decode(token_id, json_str))
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!("Loaded {} prices for token {} from Redis", points.len(), token_id);

        Ok(points)
    }

    async fn prune_prices(&self, token_id: i32, before: DateTime<Utc>) -> Result<usize> {
        // Exclusive upper bound keeps a tick stamped exactly at `before`
        let max_score = format!("({}", before.timestamp_millis());

        let mut conn = self.conn.clone();
        let removed: usize = conn
            .zrembyscore(Self::price_key(token_id), "-inf", max_score)
            .await?;

        if removed > 0 {
            tracing::debug!("Cleaned up {} old prices for token {}", removed, token_id);
        }

        Ok(removed)
    }
}

#[async_trait]
impl SwapJournal for RedisPersistence {
    async fn record(&self, entry: JournalEntry) -> Result<()> {
        let value = serde_json::to_string(&entry)?;
        let mut conn = self.conn.clone();
        conn.hset::<_, _, _, ()>(JOURNAL_KEY, &entry.signature, value)
            .await?;
        Ok(())
    }

    async fn resolve(&self, signature: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.hdel::<_, _, ()>(JOURNAL_KEY, signature).await?;
        Ok(())
    }

    async fn unresolved(&self) -> Result<Vec<JournalEntry>> {
        let mut conn = self.conn.clone();
        let values: Vec<String> = conn.hvals(JOURNAL_KEY).await?;

        let mut entries = values
            .iter()
            .map(|v| serde_json::from_str::<JournalEntry>(v).map_err(Into::into))
            .collect::<Result<Vec<_>>>()?;
        entries.sort_by_key(|e| e.submitted_at);

        Ok(entries)
    }
}
