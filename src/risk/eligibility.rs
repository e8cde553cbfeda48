use std::fmt;

use crate::models::TradingPairSettings;

/// Facts gathered for one buy decision
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BuyContext {
    pub open_positions: usize,
    pub recent_positions: usize, // created within the settings window
    pub buy_price: f64,          // fee-adjusted
    pub window_mean: Option<f64>, // None when the analysed window is empty
    pub unsettled_swaps: usize,   // journal entries for this pair with an open outcome
}

/// Outcome of the buy guards, inspected by the caller instead of raised
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BuyEligibility {
    Allowed,
    UnsettledSwaps { count: usize },
    InsufficientData,
    AdverseTrend { buy_price: f64, window_mean: f64 },
    PositionCapReached { open: usize, max: usize },
    WindowLimitReached { recent: usize, max: usize, window_minutes: i64 },
    PriceAboveThreshold { buy_price: f64, max: f64 },
}

impl BuyEligibility {
    pub fn is_allowed(&self) -> bool {
        matches!(self, BuyEligibility::Allowed)
    }
}

impl fmt::Display for BuyEligibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuyEligibility::Allowed => write!(f, "allowed"),
            BuyEligibility::UnsettledSwaps { count } => {
                write!(f, "{} submitted swaps still unsettled", count)
            }
            BuyEligibility::InsufficientData => write!(f, "no price history in window"),
            BuyEligibility::AdverseTrend {
                buy_price,
                window_mean,
            } => write!(
                f,
                "market falling: buy price {:.6} vs window mean {:.6}",
                buy_price, window_mean
            ),
            BuyEligibility::PositionCapReached { open, max } => {
                write!(f, "{} open positions (max {})", open, max)
            }
            BuyEligibility::WindowLimitReached {
                recent,
                max,
                window_minutes,
            } => write!(
                f,
                "{} positions opened in the last {} minutes (max {})",
                recent, window_minutes, max
            ),
            BuyEligibility::PriceAboveThreshold { buy_price, max } => {
                write!(f, "buy price {:.6} above ceiling {:.6}", buy_price, max)
            }
        }
    }
}

/// Run every buy guard in order; the first failing guard wins
pub fn assess_buy(ctx: &BuyContext, settings: &TradingPairSettings) -> BuyEligibility {
    if ctx.unsettled_swaps > 0 {
        return BuyEligibility::UnsettledSwaps {
            count: ctx.unsettled_swaps,
        };
    }

    let Some(window_mean) = ctx.window_mean else {
        return BuyEligibility::InsufficientData;
    };

    if ctx.open_positions >= settings.max_open_positions {
        return BuyEligibility::PositionCapReached {
            open: ctx.open_positions,
            max: settings.max_open_positions,
        };
    }

    if ctx.recent_positions >= settings.max_new_positions_per_window {
        return BuyEligibility::WindowLimitReached {
            recent: ctx.recent_positions,
            max: settings.max_new_positions_per_window,
            window_minutes: settings.window_minutes,
        };
    }

    let floor = window_mean * (1.0 - settings.max_drop_pct / 100.0);
    if ctx.buy_price < floor {
        return BuyEligibility::AdverseTrend {
            buy_price: ctx.buy_price,
            window_mean,
        };
    }

    if let Some(max) = settings.max_buy_price {
        if ctx.buy_price > max {
            return BuyEligibility::PriceAboveThreshold {
                buy_price: ctx.buy_price,
                max,
            };
        }
    }

    BuyEligibility::Allowed
}

/// Exit verdict for one open position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitDecision {
    StopLoss,
    TakeProfit,
    Hold,
}

/// Value bounds of a position, in quote currency
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitThresholds {
    pub stop_loss_value: f64,
    pub take_profit_value: f64,
}

impl ExitThresholds {
    pub fn new(entry_value: f64, settings: &TradingPairSettings) -> Self {
        Self {
            stop_loss_value: entry_value * (1.0 - settings.stop_loss_pct),
            take_profit_value: entry_value * (1.0 + settings.take_profit_pct),
        }
    }

    /// Stop-loss is checked first and is strict; take-profit is inclusive
    pub fn evaluate(&self, current_value: f64) -> ExitDecision {
        if current_value < self.stop_loss_value {
            ExitDecision::StopLoss
        } else if current_value >= self.take_profit_value {
            ExitDecision::TakeProfit
        } else {
            ExitDecision::Hold
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> BuyContext {
        BuyContext {
            open_positions: 0,
            recent_positions: 0,
            buy_price: 100.0,
            window_mean: Some(100.0),
            unsettled_swaps: 0,
        }
    }

    #[test]
    fn test_stop_loss_take_profit_hold() {
        let thresholds = ExitThresholds::new(100.0, &TradingPairSettings::default());
        assert_eq!(thresholds.evaluate(94.0), ExitDecision::StopLoss);
        assert_eq!(thresholds.evaluate(106.0), ExitDecision::TakeProfit);
        assert_eq!(thresholds.evaluate(100.0), ExitDecision::Hold);
    }

    #[test]
    fn test_exit_boundaries() {
        let settings = TradingPairSettings {
            stop_loss_pct: 0.10,
            take_profit_pct: 0.25,
            ..Default::default()
        };
        let thresholds = ExitThresholds::new(200.0, &settings);
        assert_eq!(thresholds.stop_loss_value, 180.0);
        assert_eq!(thresholds.take_profit_value, 250.0);

        assert_eq!(thresholds.evaluate(180.0), ExitDecision::Hold);
        assert_eq!(thresholds.evaluate(250.0), ExitDecision::TakeProfit);
    }

    #[test]
    fn test_buy_allowed() {
        let eligibility = assess_buy(&ctx(), &TradingPairSettings::default());
        assert!(eligibility.is_allowed());
    }

    #[test]
    fn test_empty_window_is_insufficient() {
        let ctx = BuyContext {
            window_mean: None,
            ..ctx()
        };
        assert_eq!(
            assess_buy(&ctx, &TradingPairSettings::default()),
            BuyEligibility::InsufficientData
        );
    }

    #[test]
    fn test_unsettled_swap_blocks_before_other_guards() {
        let ctx = BuyContext {
            unsettled_swaps: 1,
            window_mean: None,
            open_positions: 5,
            ..ctx()
        };
        let eligibility = assess_buy(&ctx, &TradingPairSettings::default());

        assert_eq!(eligibility, BuyEligibility::UnsettledSwaps { count: 1 });
        assert_eq!(eligibility.to_string(), "1 submitted swaps still unsettled");
    }

    #[test]
    fn test_position_cap() {
        let ctx = BuyContext {
            open_positions: 2,
            ..ctx()
        };
        assert_eq!(
            assess_buy(&ctx, &TradingPairSettings::default()),
            BuyEligibility::PositionCapReached { open: 2, max: 2 }
        );
    }

    #[test]
    fn test_window_limit() {
        let ctx = BuyContext {
            open_positions: 1,
            recent_positions: 1,
            ..ctx()
        };
        assert!(matches!(
            assess_buy(&ctx, &TradingPairSettings::default()),
            BuyEligibility::WindowLimitReached { recent: 1, max: 1, window_minutes: 60 }
        ));
    }

    #[test]
    fn test_market_falling_guard() {
        let settings = TradingPairSettings::default();

        let falling = BuyContext {
            buy_price: 94.9,
            ..ctx()
        };
        assert!(matches!(
            assess_buy(&falling, &settings),
            BuyEligibility::AdverseTrend { .. }
        ));

        let dip = BuyContext {
            buy_price: 95.5,
            ..ctx()
        };
        assert!(assess_buy(&dip, &settings).is_allowed());
    }

    #[test]
    fn test_price_ceiling() {
        let settings = TradingPairSettings {
            max_buy_price: Some(99.0),
            ..Default::default()
        };
        assert_eq!(
            assess_buy(&ctx(), &settings),
            BuyEligibility::PriceAboveThreshold {
                buy_price: 100.0,
                max: 99.0
            }
        );
    }

    #[test]
    fn test_display_names_the_guard() {
        let eligibility = BuyEligibility::PositionCapReached { open: 2, max: 2 };
        assert_eq!(eligibility.to_string(), "2 open positions (max 2)");
    }
}
