use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use std::iter::Peekable;

use crate::models::{PriceBucket, PricePoint};

/// Truncate a timestamp to the start of its minute
pub fn minute_of(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    timestamp
        .duration_trunc(TimeDelta::minutes(1))
        .unwrap_or(timestamp)
}

/// Lazy per-minute averaging over chronologically ordered ticks
///
/// Consecutive ticks falling in the same minute collapse into one bucket
/// holding their arithmetic mean. Nothing is carried between cycles: clone
/// the iterator (or build a new one over the same slice) to replay it.
pub struct MinuteBuckets<I>
where
    I: Iterator,
{
    ticks: Peekable<I>,
}

impl<I> Clone for MinuteBuckets<I>
where
    I: Iterator + Clone,
    I::Item: Clone,
{
    fn clone(&self) -> Self {
        Self {
            ticks: self.ticks.clone(),
        }
    }
}

impl<'a, I> Iterator for MinuteBuckets<I>
where
    I: Iterator<Item = &'a PricePoint>,
{
    type Item = PriceBucket;

    fn next(&mut self) -> Option<PriceBucket> {
        let first = self.ticks.next()?;
        let minute = minute_of(first.timestamp);

        let mut sum = first.price;
        let mut count = 1usize;

        while let Some(tick) = self.ticks.next_if(|t| minute_of(t.timestamp) == minute) {
            sum += tick.price;
            count += 1;
        }

        Some(PriceBucket {
            minute,
            value: sum / count as f64,
        })
    }
}

/// Group ticks into per-minute average buckets
///
/// # Arguments
/// * `ticks` - Price points ordered oldest first
pub fn bucket_by_minute<'a, T>(ticks: T) -> MinuteBuckets<T::IntoIter>
where
    T: IntoIterator<Item = &'a PricePoint>,
    T::IntoIter: Clone,
{
    MinuteBuckets {
        ticks: ticks.into_iter().peekable(),
    }
}
