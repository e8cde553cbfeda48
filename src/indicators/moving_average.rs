use crate::error::IndicatorError;
use crate::models::PriceBucket;

/// Calculate Exponential Moving Average (EMA)
///
/// Seeded with the mean of the first `period` buckets, then folds every
/// remaining bucket with smoothing factor `2 / (period + 1)`.
pub fn calculate_ema(buckets: &[PriceBucket], period: usize) -> Result<f64, IndicatorError> {
    if period == 0 || buckets.len() < period {
        return Err(IndicatorError::InsufficientData {
            indicator: "EMA",
            needed: period.max(1),
            available: buckets.len(),
        });
    }

    let alpha = 2.0 / (period as f64 + 1.0);

    // Start with the mean of the first window
    let seed: f64 = buckets[..period].iter().map(|b| b.value).sum::<f64>() / period as f64;

    let ema = buckets[period..]
        .iter()
        .fold(seed, |ema, bucket| (bucket.value - ema) * alpha + ema);

    tracing::debug!("EMA (period {}): {:.4}", period, ema);

    Ok(ema)
}
