use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{
    NewPosition, NewSell, Position, Sell, Token, TradingPair, TradingPairSettings,
};
use crate::persistence::{OrderStore, SettingsSource};
use crate::Result;

/// Postgres persistence for orders, tokens and pair settings
#[derive(Clone)]
pub struct PostgresPersistence {
    pool: PgPool,
}

fn to_decimal(value: f64) -> Result<Decimal> {
    Decimal::try_from(value).map_err(|e| format!("Cannot store {} as NUMERIC: {}", value, e).into())
}

fn to_f64(value: Decimal) -> Result<f64> {
    value
        .to_f64()
        .ok_or_else(|| format!("NUMERIC {} out of f64 range", value).into())
}

fn to_bigint(amount: u64) -> Result<i64> {
    Ok(i64::try_from(amount)?)
}

fn to_amount(value: i64) -> Result<u64> {
    Ok(u64::try_from(value)?)
}

fn row_to_position(row: &PgRow) -> Result<Position> {
    Ok(Position {
        id: row.get("id"),
        base_token_id: row.get("from_token_id"),
        target_token_id: row.get("to_token_id"),
        amount_spent: to_amount(row.get("from_token_amount"))?,
        amount_received: to_amount(row.get("to_token_amount"))?,
        price: to_f64(row.get("price"))?,
        created_at: row.get("created_at"),
    })
}

fn row_to_token(row: &PgRow, prefix: &str) -> Token {
    let decimals: i16 = row.get(format!("{}_decimals", prefix).as_str());
    Token {
        id: row.get(format!("{}_id", prefix).as_str()),
        symbol: row.get(format!("{}_symbol", prefix).as_str()),
        mint_address: row.get(format!("{}_mint", prefix).as_str()),
        decimals: decimals as u8,
    }
}

fn row_to_settings(row: &PgRow) -> Result<TradingPairSettings> {
    let max_buy_price: Option<Decimal> = row.get("max_buy_price");
    let short_ema: i32 = row.get("short_ema_time_period");
    let long_ema: i32 = row.get("long_ema_time_period");
    let rsi_period: i32 = row.get("rsi_time_period");
    let max_open: i32 = row.get("buy_max_orders_threshold");
    let max_in_window: i32 = row.get("buy_max_orders_in_last_period");
    let window_minutes: i32 = row.get("buy_check_period_minutes");

    Ok(TradingPairSettings {
        name: row.get("settings_name"),
        take_profit_pct: to_f64(row.get("take_profit_percentage"))?,
        stop_loss_pct: to_f64(row.get("stop_loss_percentage"))?,
        short_ema_period: usize::try_from(short_ema)?,
        long_ema_period: usize::try_from(long_ema)?,
        rsi_period: usize::try_from(rsi_period)?,
        rsi_buy_threshold: to_f64(row.get("rsi_buy_threshold"))?,
        rsi_sell_threshold: to_f64(row.get("rsi_sell_threshold"))?,
        buy_amount: to_f64(row.get("buy_amount"))?,
        max_open_positions: usize::try_from(max_open)?,
        max_new_positions_per_window: usize::try_from(max_in_window)?,
        window_minutes: window_minutes as i64,
        max_drop_pct: to_f64(row.get("max_drop_percentage"))?,
        max_buy_price: max_buy_price.map(to_f64).transpose()?,
        auto_buy_enabled: row.get("auto_buy_enabled"),
        auto_sell_enabled: row.get("auto_sell_enabled"),
    })
}

impl PostgresPersistence {
    /// Connect to Postgres and apply pending migrations
    ///
    /// # Arguments
    /// * `database_url` - Postgres connection URL
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        // Run migrations
        sqlx::migrate!("./migrations").run(&pool).await?;

        tracing::info!("Connected to Postgres at {}", database_url);

        Ok(Self { pool })
    }
}

#[async_trait]
impl OrderStore for PostgresPersistence {
    async fn create_position(&self, new: NewPosition) -> Result<Position> {
        let row = sqlx::query(
            r#"
            INSERT INTO orders_buy (
                id, from_token_id, to_token_id, from_token_amount, to_token_amount, price
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, from_token_id, to_token_id, from_token_amount,
                      to_token_amount, price, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.base_token_id)
        .bind(new.target_token_id)
        .bind(to_bigint(new.amount_spent)?)
        .bind(to_bigint(new.amount_received)?)
        .bind(to_decimal(new.price)?)
        .fetch_one(&self.pool)
        .await?;

        let position = row_to_position(&row)?;
        tracing::debug!("Saved position {} to Postgres", position.id);

        Ok(position)
    }

    async fn create_sell(&self, new: NewSell) -> Result<Sell> {
        let row = sqlx::query(
            r#"
            INSERT INTO orders_sell (
                id, buy_order_id, from_token_id, to_token_id,
                from_token_amount, to_token_amount, price
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.buy_order_id)
        .bind(new.from_token_id)
        .bind(new.to_token_id)
        .bind(to_bigint(new.amount_sent)?)
        .bind(to_bigint(new.amount_received)?)
        .bind(to_decimal(new.price)?)
        .fetch_one(&self.pool)
        .await?;

        let sell = Sell {
            id: row.get("id"),
            buy_order_id: new.buy_order_id,
            from_token_id: new.from_token_id,
            to_token_id: new.to_token_id,
            amount_sent: new.amount_sent,
            amount_received: new.amount_received,
            price: new.price,
            created_at: row.get("created_at"),
        };
        tracing::debug!(
            "Saved sell {} closing position {} to Postgres",
            sell.id,
            sell.buy_order_id
        );

        Ok(sell)
    }

    async fn get_open_positions(&self, target_token_id: i32) -> Result<Vec<Position>> {
        let rows = sqlx::query(
            r#"
            SELECT b.id, b.from_token_id, b.to_token_id, b.from_token_amount,
                   b.to_token_amount, b.price, b.created_at
            FROM orders_buy b
            WHERE b.to_token_id = $1
              AND NOT EXISTS (SELECT 1 FROM orders_sell s WHERE s.buy_order_id = b.id)
            ORDER BY b.created_at ASC
            "#,
        )
        .bind(target_token_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_position).collect()
    }

    async fn get_recent_position_count(
        &self,
        target_token_id: i32,
        since: DateTime<Utc>,
    ) -> Result<usize> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS count
            FROM orders_buy
            WHERE to_token_id = $1 AND created_at >= $2
            "#,
        )
        .bind(target_token_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        let count: i64 = row.get("count");
        Ok(usize::try_from(count)?)
    }
}

#[async_trait]
impl SettingsSource for PostgresPersistence {
    async fn active_pairs(&self) -> Result<Vec<TradingPair>> {
        let rows = sqlx::query(
            r#"
            SELECT p.id AS pair_id, p.is_active,
                   f.id AS base_id, f.symbol AS base_symbol,
                   f.mint_address AS base_mint, f.decimals AS base_decimals,
                   t.id AS target_id, t.symbol AS target_symbol,
                   t.mint_address AS target_mint, t.decimals AS target_decimals,
                   s.name AS settings_name, s.take_profit_percentage, s.stop_loss_percentage,
                   s.short_ema_time_period, s.long_ema_time_period,
                   s.rsi_buy_threshold, s.rsi_sell_threshold, s.rsi_time_period,
                   s.buy_amount, s.buy_max_orders_threshold,
                   s.buy_max_orders_in_last_period, s.buy_check_period_minutes,
                   s.max_drop_percentage, s.max_buy_price,
                   s.auto_buy_enabled, s.auto_sell_enabled
            FROM trading_pairs p
            JOIN tokens f ON f.id = p.from_token_id
            JOIN tokens t ON t.id = p.to_token_id
            JOIN trading_settings s ON s.id = p.trading_setting_id
            WHERE p.is_active = TRUE
            ORDER BY p.id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut pairs = Vec::new();
        for row in rows {
            pairs.push(TradingPair {
                id: row.get("pair_id"),
                base: row_to_token(&row, "base"),
                target: row_to_token(&row, "target"),
                is_active: row.get("is_active"),
                settings: row_to_settings(&row)?,
            });
        }

        tracing::debug!("Loaded {} active pairs from Postgres", pairs.len());

        Ok(pairs)
    }
}
