// Technical indicators module
// EMA and RSI over per-minute price buckets

pub mod moving_average;
pub mod rsi;

pub use moving_average::calculate_ema;
pub use rsi::calculate_rsi;
