// Price bucketing and signal derivation
pub mod buckets;
pub mod signals;

pub use buckets::{bucket_by_minute, minute_of, MinuteBuckets};
pub use signals::{decide_signal, gate, Analysis, SignalAnalyzer};
