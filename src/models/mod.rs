use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Wrapped SOL mint; balances for it are held natively in lamports
pub const NATIVE_SOL_MINT: &str = "So11111111111111111111111111111111111111112";
pub const USDC_MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

/// Represents a tradable token
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Token {
    pub id: i32,
    pub symbol: String,
    pub mint_address: String, // Solana mint address
    pub decimals: u8,
}

impl Token {
    /// Number of raw units in one whole token (e.g. 1_000_000_000 lamports per SOL)
    pub fn unit(&self) -> u64 {
        10u64.pow(self.decimals as u32)
    }

    /// Convert a whole-token amount to raw units, truncating dust
    pub fn to_raw(&self, amount: f64) -> u64 {
        (amount * self.unit() as f64) as u64
    }

    /// Convert raw units to a whole-token amount
    pub fn to_ui(&self, raw: u64) -> f64 {
        raw as f64 / self.unit() as f64
    }

    pub fn is_native(&self) -> bool {
        self.mint_address == NATIVE_SOL_MINT
    }
}

/// Per-pair trading configuration. Read-only to the trading core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradingPairSettings {
    pub name: String,
    pub take_profit_pct: f64,
    pub stop_loss_pct: f64,
    pub short_ema_period: usize, // minutes
    pub long_ema_period: usize,  // minutes
    pub rsi_period: usize,
    pub rsi_buy_threshold: f64,
    pub rsi_sell_threshold: f64,
    pub buy_amount: f64, // whole units of the target token
    pub max_open_positions: usize,
    pub max_new_positions_per_window: usize,
    pub window_minutes: i64,
    pub max_drop_pct: f64,             // "market falling" guard
    pub max_buy_price: Option<f64>,    // Optional ceiling on fee-adjusted buy price
    pub auto_buy_enabled: bool,
    pub auto_sell_enabled: bool,
}

impl Default for TradingPairSettings {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            take_profit_pct: 0.05,
            stop_loss_pct: 0.05,
            short_ema_period: 5,
            long_ema_period: 20,
            rsi_period: 14,
            rsi_buy_threshold: 30.0,
            rsi_sell_threshold: 70.0,
            buy_amount: 0.1,
            max_open_positions: 2,
            max_new_positions_per_window: 1,
            window_minutes: 60,
            max_drop_pct: 5.0,
            max_buy_price: None,
            auto_buy_enabled: false,
            auto_sell_enabled: false,
        }
    }
}

impl TradingPairSettings {
    /// Minutes of price history pulled for one analysis cycle
    ///
    /// Wide enough for the slower of the long EMA and RSI (which needs one
    /// bucket more than its period), plus a few minutes of slack for missed
    /// ticks.
    pub fn lookback_minutes(&self) -> i64 {
        let longest = self
            .long_ema_period
            .max(self.short_ema_period)
            .max(self.rsi_period + 1);
        longest as i64 + 5
    }
}

/// A tradable pair: spend `base` (e.g. USDC) to acquire `target` (e.g. SOL)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradingPair {
    pub id: i32,
    pub base: Token,
    pub target: Token,
    pub is_active: bool,
    pub settings: TradingPairSettings,
}

impl TradingPair {
    pub fn label(&self) -> String {
        format!("{}/{}", self.target.symbol, self.base.symbol)
    }
}

/// Raw price tick as ingested from the market
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PricePoint {
    pub token_id: i32,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

/// Average price over all ticks within one minute. Derived, never stored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceBucket {
    pub minute: DateTime<Utc>,
    pub value: f64,
}

/// Trading signal
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

/// Open buy exposure (a buy order)
///
/// Amounts are raw token units. A position is open while no Sell
/// references it; that is always answered by the order store, never stored
/// on the position itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub id: Uuid,
    pub base_token_id: i32,
    pub target_token_id: i32,
    pub amount_spent: u64,    // base token, raw
    pub amount_received: u64, // target token, raw, as confirmed by the exchange
    pub price: f64,           // fee-adjusted execution price
    pub created_at: DateTime<Utc>,
}

/// Closing sell for a position
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sell {
    pub id: Uuid,
    pub buy_order_id: Uuid,
    pub from_token_id: i32,
    pub to_token_id: i32,
    pub amount_sent: u64,
    pub amount_received: u64,
    pub price: f64,
    pub created_at: DateTime<Utc>,
}

/// Fields needed to record a new position
#[derive(Debug, Clone, PartialEq)]
pub struct NewPosition {
    pub base_token_id: i32,
    pub target_token_id: i32,
    pub amount_spent: u64,
    pub amount_received: u64,
    pub price: f64,
}

/// Fields needed to record a sell closing `buy_order_id`
#[derive(Debug, Clone, PartialEq)]
pub struct NewSell {
    pub buy_order_id: Uuid,
    pub from_token_id: i32,
    pub to_token_id: i32,
    pub amount_sent: u64,
    pub amount_received: u64,
    pub price: f64,
}

/// Outcome of a confirmed swap
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionResult {
    pub amount_sent: u64,
    pub amount_received: u64,
    pub price: f64,
    pub signature: String, // Solana transaction signature
}
