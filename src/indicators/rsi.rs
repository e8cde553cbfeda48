use crate::error::IndicatorError;
use crate::models::PriceBucket;

/// Calculate Relative Strength Index (RSI) with Wilder smoothing
///
/// RSI measures the magnitude of recent price changes to evaluate
/// overbought or oversold conditions.
///
/// Values:
/// - RSI > 70: Overbought
/// - RSI < 30: Oversold
///
/// Average gain/loss are seeded from the first `period` deltas, then every
/// later delta is folded in with `avg = (avg * (period - 1) + new) / period`.
/// The returned value is the RSI at the most recent bucket. `period` deltas
/// need `period + 1` buckets.
pub fn calculate_rsi(buckets: &[PriceBucket], period: usize) -> Result<f64, IndicatorError> {
    if period == 0 || buckets.len() < period + 1 {
        return Err(IndicatorError::InsufficientData {
            indicator: "RSI",
            needed: period + 1,
            available: buckets.len(),
        });
    }

    let (gains, losses): (Vec<f64>, Vec<f64>) = buckets
        .windows(2)
        .map(|w| {
            let change = w[1].value - w[0].value;
            if change > 0.0 {
                (change, 0.0)
            } else {
                (0.0, -change)
            }
        })
        .unzip();

    let n = period as f64;
    let mut avg_gain = gains[..period].iter().sum::<f64>() / n;
    let mut avg_loss = losses[..period].iter().sum::<f64>() / n;

    for (gain, loss) in gains[period..].iter().zip(&losses[period..]) {
        avg_gain = (avg_gain * (n - 1.0) + gain) / n;
        avg_loss = (avg_loss * (n - 1.0) + loss) / n;
    }

    let rsi = if avg_loss == 0.0 {
        100.0
    } else {
        let rs = avg_gain / avg_loss;
        100.0 - (100.0 / (1.0 + rs))
    };

    tracing::debug!(
        "RSI (period {}): {:.2}. Avg gain: {:.4}, Avg loss: {:.4}",
        period,
        rsi,
        avg_gain,
        avg_loss
    );

    Ok(rsi)
}
