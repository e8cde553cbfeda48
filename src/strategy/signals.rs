use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use super::buckets::bucket_by_minute;
use crate::error::AnalysisError;
use crate::indicators::{calculate_ema, calculate_rsi};
use crate::models::{PriceBucket, Signal, TradingPair, TradingPairSettings};
use crate::persistence::PriceStore;

/// Indicator snapshot for one pair at one tick
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub latest_price: f64,
    pub window_mean: Option<f64>, // mean of raw ticks in the lookback window
    pub ema_short: f64,
    pub ema_long: f64,
    pub rsi: f64,
    pub signal: Signal,
}

/// Crossover + threshold rule
///
/// BUY when the short EMA is above the long EMA and RSI is oversold, SELL on
/// the mirror condition, HOLD otherwise.
pub fn decide_signal(
    ema_short: f64,
    ema_long: f64,
    rsi: f64,
    settings: &TradingPairSettings,
) -> Signal {
    if ema_short > ema_long && rsi < settings.rsi_buy_threshold {
        Signal::Buy
    } else if ema_short < ema_long && rsi > settings.rsi_sell_threshold {
        Signal::Sell
    } else {
        Signal::Hold
    }
}

/// Apply the pair's auto-trade switches; `None` means nothing to dispatch
pub fn gate(signal: Signal, settings: &TradingPairSettings) -> Option<Signal> {
    match signal {
        Signal::Buy if settings.auto_buy_enabled => Some(Signal::Buy),
        Signal::Sell if settings.auto_sell_enabled => Some(Signal::Sell),
        Signal::Hold => None,
        disabled => {
            tracing::info!(
                "{:?} signal ignored: auto-{} disabled for settings '{}'",
                disabled,
                if disabled == Signal::Buy { "buy" } else { "sell" },
                settings.name
            );
            None
        }
    }
}

/// Derives BUY / SELL / HOLD from freshly queried price history
pub struct SignalAnalyzer {
    prices: Arc<dyn PriceStore>,
}

impl SignalAnalyzer {
    pub fn new(prices: Arc<dyn PriceStore>) -> Self {
        Self { prices }
    }

    pub async fn analyze(&self, pair: &TradingPair) -> Result<Analysis, AnalysisError> {
        self.analyze_at(pair, Utc::now()).await
    }

    /// Analyze the lookback window ending at `now`
    ///
    /// Any indicator lacking history aborts the whole analysis; no partial
    /// signal is produced.
    pub async fn analyze_at(
        &self,
        pair: &TradingPair,
        now: DateTime<Utc>,
    ) -> Result<Analysis, AnalysisError> {
        let settings = &pair.settings;
        let token_id = pair.target.id;

        let latest_price = self
            .prices
            .get_latest_price(token_id)
            .await
            .map_err(|e| AnalysisError::Store(e.to_string()))?
            .ok_or(AnalysisError::NoPrice(token_id))?;

        let since = now - Duration::minutes(settings.lookback_minutes());
        let ticks = self
            .prices
            .get_recent_prices(token_id, since)
            .await
            .map_err(|e| AnalysisError::Store(e.to_string()))?;

        let window_mean = if ticks.is_empty() {
            None
        } else {
            Some(ticks.iter().map(|t| t.price).sum::<f64>() / ticks.len() as f64)
        };

        let buckets: Vec<PriceBucket> = bucket_by_minute(&ticks).collect();
        tracing::debug!(
            "{}: {} ticks in {} minute buckets since {}",
            pair.label(),
            ticks.len(),
            buckets.len(),
            since
        );

        let ema_short = calculate_ema(&buckets, settings.short_ema_period)?;
        let ema_long = calculate_ema(&buckets, settings.long_ema_period)?;
        let rsi = calculate_rsi(&buckets, settings.rsi_period)?;

        let signal = decide_signal(ema_short, ema_long, rsi, settings);

        tracing::info!(
            "📈 {} price {:.6} | EMA{} {:.6} | EMA{} {:.6} | RSI{} {:.2} => {:?}",
            pair.label(),
            latest_price,
            settings.short_ema_period,
            ema_short,
            settings.long_ema_period,
            ema_long,
            settings.rsi_period,
            rsi,
            signal
        );

        Ok(Analysis {
            latest_price,
            window_mean,
            ema_short,
            ema_long,
            rsi,
            signal,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PricePoint, Token};
    use crate::persistence::InMemoryStore;
    use chrono::TimeZone;

    fn pair(settings: TradingPairSettings) -> TradingPair {
        TradingPair {
            id: 1,
            base: Token {
                id: 2,
                symbol: "USDC".to_string(),
                mint_address: crate::models::USDC_MINT.to_string(),
                decimals: 6,
            },
            target: Token {
                id: 1,
                symbol: "SOL".to_string(),
                mint_address: crate::models::NATIVE_SOL_MINT.to_string(),
                decimals: 9,
            },
            is_active: true,
            settings,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 30).unwrap()
    }

    fn seed(store: &InMemoryStore, prices: &[f64]) {
        let n = prices.len() as i64;
        for (i, &price) in prices.iter().enumerate() {
            store
                .insert_price_point(PricePoint {
                    token_id: 1,
                    price,
                    timestamp: now() - Duration::minutes(n - 1 - i as i64),
                })
                .unwrap();
        }
    }

    #[test]
    fn test_decide_signal() {
        let settings = TradingPairSettings::default();
        assert_eq!(decide_signal(101.0, 100.0, 25.0, &settings), Signal::Buy);
        assert_eq!(decide_signal(99.0, 100.0, 75.0, &settings), Signal::Sell);
        // Crossover without RSI confirmation
        assert_eq!(decide_signal(101.0, 100.0, 50.0, &settings), Signal::Hold);
        assert_eq!(decide_signal(99.0, 100.0, 25.0, &settings), Signal::Hold);
        // Equal EMAs never trade
        assert_eq!(decide_signal(100.0, 100.0, 10.0, &settings), Signal::Hold);
    }

    #[test]
    fn test_gate_respects_auto_flags() {
        let disabled = TradingPairSettings::default();
        assert_eq!(gate(Signal::Buy, &disabled), None);
        assert_eq!(gate(Signal::Sell, &disabled), None);

        let enabled = TradingPairSettings {
            auto_buy_enabled: true,
            auto_sell_enabled: true,
            ..Default::default()
        };
        assert_eq!(gate(Signal::Buy, &enabled), Some(Signal::Buy));
        assert_eq!(gate(Signal::Sell, &enabled), Some(Signal::Sell));
        assert_eq!(gate(Signal::Hold, &enabled), None);
    }

    #[tokio::test]
    async fn test_no_price_aborts() {
        let store = Arc::new(InMemoryStore::new());
        let analyzer = SignalAnalyzer::new(store);

        let result = analyzer
            .analyze_at(&pair(TradingPairSettings::default()), now())
            .await;
        assert!(matches!(result, Err(AnalysisError::NoPrice(1))));
    }

    #[tokio::test]
    async fn test_short_history_aborts_with_insufficient_data() {
        let store = Arc::new(InMemoryStore::new());
        seed(&store, &[100.0; 10]);
        let analyzer = SignalAnalyzer::new(store);

        let result = analyzer
            .analyze_at(&pair(TradingPairSettings::default()), now())
            .await;
        assert!(matches!(result, Err(AnalysisError::InsufficientData(_))));
    }

    #[tokio::test]
    async fn test_rising_then_pullback_is_buy() {
        let mut prices = vec![100.0; 11];
        prices.extend((0..14).map(|i| 130.0 - i as f64));

        let store = Arc::new(InMemoryStore::new());
        seed(&store, &prices);
        let analyzer = SignalAnalyzer::new(store);

        let settings = TradingPairSettings {
            rsi_period: 5,
            ..Default::default()
        };
        let analysis = analyzer.analyze_at(&pair(settings), now()).await.unwrap();

        assert_eq!(analysis.latest_price, 117.0);
        assert!(analysis.ema_short > analysis.ema_long);
        assert!(analysis.rsi < 30.0);
        assert_eq!(analysis.signal, Signal::Buy);
        assert!((analysis.window_mean.unwrap() - 113.16).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_falling_then_bounce_is_sell() {
        let mut prices = vec![130.0; 11];
        prices.extend((0..14).map(|i| 100.0 + i as f64));

        let store = Arc::new(InMemoryStore::new());
        seed(&store, &prices);
        let analyzer = SignalAnalyzer::new(store);

        let settings = TradingPairSettings {
            rsi_period: 5,
            ..Default::default()
        };
        let analysis = analyzer.analyze_at(&pair(settings), now()).await.unwrap();

        assert!(analysis.ema_short < analysis.ema_long);
        assert!(analysis.rsi > 70.0);
        assert_eq!(analysis.signal, Signal::Sell);
    }

    #[tokio::test]
    async fn test_ticks_outside_lookback_are_ignored() {
        let store = Arc::new(InMemoryStore::new());
        // Ancient spike that would dominate the averages if included
        store
            .insert_price_point(PricePoint {
                token_id: 1,
                price: 10_000.0,
                timestamp: now() - Duration::hours(3),
            })
            .unwrap();
        seed(&store, &[100.0; 25]);
        let analyzer = SignalAnalyzer::new(store);

        let analysis = analyzer
            .analyze_at(&pair(TradingPairSettings::default()), now())
            .await
            .unwrap();

        assert_eq!(analysis.ema_long, 100.0);
        assert_eq!(analysis.window_mean, Some(100.0));
        assert_eq!(analysis.signal, Signal::Hold);
    }
}
