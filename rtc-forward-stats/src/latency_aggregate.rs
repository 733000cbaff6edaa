//! Time-bucketed ring of [`Welford`] summaries.

use crate::error::{Error, Result};
use crate::welford::Welford;
use std::fmt;
use std::time::Duration;

/// Upper bound on the number of buckets in one ring.
pub const MAX_BUCKETS: usize = 1 << 20;

/// A ring buffer of Welford mean/variance summaries, one per fixed-width
/// time bucket, covering a sliding window.
///
/// Buckets are addressed by their logical index `ts / interval`. Only the
/// `capacity` most recent logical buckets, `[head - capacity + 1, head]`, are
/// retained; advancing `head` resets the slots it passes over, so old data
/// ages out without any background sweep.
#[derive(Debug, Clone)]
pub struct LatencyAggregate {
    summary: Vec<Welford>,
    interval: Duration,
    cap: u64,
    /// Logical index of the newest bucket.
    head: u64,
    /// Whether `head` has been established by a sample yet.
    started: bool,
}

impl LatencyAggregate {
    /// Create an aggregate with buckets of width `interval` covering at least
    /// `window_length`.
    pub fn new(interval: Duration, window_length: Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(Error::ErrZeroBucketWidth);
        }
        if window_length < interval {
            return Err(Error::ErrWindowShorterThanBucket {
                window: window_length,
                bucket_width: interval,
            });
        }

        let buckets = window_length.as_nanos().div_ceil(interval.as_nanos()).max(1);
        if buckets > MAX_BUCKETS as u128 {
            return Err(Error::ErrTooManyBuckets {
                buckets,
                max: MAX_BUCKETS,
            });
        }

        let cap = buckets as u64;
        Ok(Self {
            summary: vec![Welford::default(); cap as usize],
            interval,
            cap,
            head: 0,
            started: false,
        })
    }

    /// Number of buckets in the ring.
    pub fn capacity(&self) -> usize {
        self.cap as usize
    }

    /// Width of a single bucket.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Total span retained by the ring, saturating at [`Duration::MAX`].
    pub fn window(&self) -> Duration {
        // cap <= MAX_BUCKETS, so it fits in u32
        self.interval
            .checked_mul(self.cap as u32)
            .unwrap_or(Duration::MAX)
    }

    /// Logical bucket index of `ts`, saturating at `u64::MAX`.
    fn index(&self, ts: Duration) -> u64 {
        u64::try_from(ts.as_nanos() / self.interval.as_nanos()).unwrap_or(u64::MAX)
    }

    fn slot(&self, i: u64) -> usize {
        (i % self.cap) as usize
    }

    fn is_expired(&self, i: u64) -> bool {
        i.saturating_add(self.cap) <= self.head
    }

    /// Extend the ring to contain `ts`, then merge `value` into that bucket's
    /// summary. Samples older than the window are dropped.
    pub fn update(&mut self, ts: Duration, value: f64) {
        let i = self.index(ts);
        if self.started && self.is_expired(i) {
            return;
        }

        if !self.started || i > self.head {
            let first = if self.started { self.head + 1 } else { 0 };
            let first = first.max(i.saturating_add(1).saturating_sub(self.cap));
            for k in first..=i {
                let slot = self.slot(k);
                self.summary[slot].reset();
            }
            self.head = i;
            self.started = true;
        }

        let slot = self.slot(i);
        self.summary[slot].update(value);
    }

    /// Summary of the bucket covering `ts`, if that bucket is still retained.
    pub fn get(&self, ts: Duration) -> Option<Welford> {
        let i = self.index(ts);
        if !self.started || self.is_expired(i) || i > self.head {
            return None;
        }
        Some(self.summary[self.slot(i)])
    }

    /// Aggregate of every retained bucket.
    pub fn summarize(&self) -> Welford {
        Welford::merge(&self.summary)
    }

    /// Aggregate of the most recent buckets covering at least `d`, ending
    /// with the head bucket.
    pub fn summarize_last(&self, d: Duration) -> Welford {
        if !self.started {
            return Welford::default();
        }

        let wanted = d.as_nanos().div_ceil(self.interval.as_nanos());
        let wanted = u64::try_from(wanted).unwrap_or(u64::MAX);
        let n = self.head.saturating_add(1).min(self.cap).min(wanted);
        if n == 0 {
            return Welford::default();
        }

        // slots of the logical range [head - n + 1, head], r exclusive
        let l = self.slot(self.head - (n - 1));
        let r = (self.slot(self.head) + 1) % self.cap as usize;
        if l < r {
            Welford::merge(&self.summary[l..r])
        } else {
            // the range wraps past slot 0 (or spans the whole ring)
            Welford::merge(self.summary[l..].iter().chain(&self.summary[..r]))
        }
    }
}

impl fmt::Display for LatencyAggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let summary = self.summarize();
        write!(
            f,
            "count={} mean={} stddev={}",
            summary.count(),
            summary.mean(),
            summary.std_dev()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: Duration = Duration::from_millis(1);

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-6, "{a} != {b}");
    }

    /// Rebuilds the last `n` buckets ending at the newest sample from the
    /// raw sample list.
    fn reference(samples: &[(Duration, f64)], interval: Duration, cap: u64, n: u64) -> Welford {
        let head = samples
            .iter()
            .map(|(ts, _)| (ts.as_nanos() / interval.as_nanos()) as u64)
            .max()
            .unwrap_or(0);
        let n = n.min(cap).min(head + 1);
        let mut w = Welford::new();
        for (ts, v) in samples {
            let i = (ts.as_nanos() / interval.as_nanos()) as u64;
            if i + n > head {
                w.update(*v);
            }
        }
        w
    }

    #[test]
    fn test_latency_aggregate_capacity() {
        let a = LatencyAggregate::new(100 * MS, Duration::from_secs(1)).unwrap();
        assert_eq!(a.capacity(), 10);
        assert_eq!(a.window(), Duration::from_secs(1));

        let a = LatencyAggregate::new(300 * MS, Duration::from_secs(1)).unwrap();
        assert_eq!(a.capacity(), 4);

        let a = LatencyAggregate::new(100 * MS, 100 * MS).unwrap();
        assert_eq!(a.capacity(), 1);
    }

    #[test]
    fn test_latency_aggregate_invalid_config() {
        assert_eq!(
            LatencyAggregate::new(Duration::ZERO, Duration::from_secs(1)).unwrap_err(),
            Error::ErrZeroBucketWidth
        );
        assert_eq!(
            LatencyAggregate::new(100 * MS, 50 * MS).unwrap_err(),
            Error::ErrWindowShorterThanBucket {
                window: 50 * MS,
                bucket_width: 100 * MS,
            }
        );
    }

    #[test]
    fn test_latency_aggregate_rejects_oversized_ring() {
        assert_eq!(
            LatencyAggregate::new(Duration::from_nanos(1), Duration::from_secs(60)).unwrap_err(),
            Error::ErrTooManyBuckets {
                buckets: 60_000_000_000,
                max: MAX_BUCKETS,
            }
        );

        let a = LatencyAggregate::new(Duration::from_nanos(1), Duration::from_nanos(MAX_BUCKETS as u64))
            .unwrap();
        assert_eq!(a.capacity(), MAX_BUCKETS);
    }

    #[test]
    fn test_latency_aggregate_window_saturates() {
        let a = LatencyAggregate::new(
            Duration::from_secs(u64::MAX / 2),
            Duration::from_secs(u64::MAX),
        )
        .unwrap();
        assert_eq!(a.capacity(), 3);
        assert_eq!(a.window(), Duration::MAX);
    }

    #[test]
    fn test_latency_aggregate_extreme_timestamps() {
        let mut a = LatencyAggregate::new(Duration::from_nanos(1), Duration::from_nanos(10)).unwrap();
        a.update(Duration::from_secs(1), 1.0);
        // bucket index saturates instead of overflowing
        a.update(Duration::MAX, 2.0);
        a.update(Duration::MAX, 4.0);

        let head = a.get(Duration::MAX).unwrap();
        assert_eq!(head.count(), 2);
        assert_close(head.mean(), 3.0);
        assert!(a.get(Duration::from_secs(1)).is_none());

        let last = a.summarize_last(Duration::from_nanos(10));
        assert_eq!(last.count(), 2);
        assert_eq!(a.summarize_last(Duration::MAX).count(), 2);
        assert_eq!(a.summarize().count(), 2);

        // an old sample is still dropped once the head is pinned at the top
        a.update(Duration::from_secs(2), 9.0);
        assert_eq!(a.summarize().count(), 2);
    }

    #[test]
    fn test_latency_aggregate_empty() {
        let a = LatencyAggregate::new(100 * MS, Duration::from_secs(1)).unwrap();
        assert!(a.summarize().is_empty());
        assert!(a.summarize_last(Duration::from_secs(1)).is_empty());
        assert!(a.get(Duration::ZERO).is_none());
    }

    #[test]
    fn test_latency_aggregate_first_bucket_counts() {
        let mut a = LatencyAggregate::new(100 * MS, Duration::from_secs(1)).unwrap();
        a.update(10 * MS, 5.0);

        assert_eq!(a.get(50 * MS).map(|w| w.count()), Some(1));
        assert_eq!(a.summarize_last(100 * MS).count(), 1);
        assert_eq!(a.summarize().count(), 1);
    }

    #[test]
    fn test_latency_aggregate_window_eviction() {
        let mut a = LatencyAggregate::new(100 * MS, Duration::from_secs(1)).unwrap();
        a.update(Duration::ZERO, 1000.0);

        for i in 0..10u32 {
            a.update(Duration::from_secs(2) + i * 100 * MS, 10.0);
        }

        let summary = a.summarize();
        assert_eq!(summary.count(), 10);
        assert_close(summary.mean(), 10.0);
        assert!(a.get(Duration::ZERO).is_none());
    }

    #[test]
    fn test_latency_aggregate_discards_expired() {
        let mut a = LatencyAggregate::new(100 * MS, Duration::from_secs(1)).unwrap();
        a.update(Duration::from_secs(5), 1.0);

        // exactly one window behind the head
        a.update(Duration::from_secs(4), 99.0);
        // far behind
        a.update(Duration::from_secs(1), 99.0);

        let summary = a.summarize();
        assert_eq!(summary.count(), 1);
        assert_close(summary.mean(), 1.0);
        assert_eq!(a.get(Duration::from_secs(5)).map(|w| w.count()), Some(1));
    }

    #[test]
    fn test_latency_aggregate_late_sample_within_window() {
        let mut a = LatencyAggregate::new(100 * MS, Duration::from_secs(1)).unwrap();
        a.update(Duration::from_secs(5), 1.0);
        a.update(Duration::from_millis(4150), 3.0);

        let late = a.get(Duration::from_millis(4100)).unwrap();
        assert_eq!(late.count(), 1);
        assert_close(late.mean(), 3.0);
        assert_eq!(a.summarize().count(), 2);
        // head did not move backwards
        assert!(a.get(Duration::from_millis(5050)).is_some());
    }

    #[test]
    fn test_latency_aggregate_get_future_is_none() {
        let mut a = LatencyAggregate::new(100 * MS, Duration::from_secs(1)).unwrap();
        a.update(Duration::from_secs(1), 1.0);
        assert!(a.get(Duration::from_millis(1100)).is_none());
    }

    #[test]
    fn test_latency_aggregate_gap_resets_skipped_buckets() {
        let mut a = LatencyAggregate::new(100 * MS, Duration::from_secs(1)).unwrap();
        for i in 0..10u32 {
            a.update(i * 100 * MS, 1.0);
        }
        // jump three buckets ahead: slots for 10, 11 and 12 are recycled
        a.update(1200 * MS, 2.0);

        assert_eq!(a.summarize().count(), 8);
        assert!(a.get(1000 * MS).unwrap().is_empty());
        assert!(a.get(1100 * MS).unwrap().is_empty());
        assert!(a.get(200 * MS).is_none());
        assert!(a.get(300 * MS).is_some());
    }

    #[test]
    fn test_latency_aggregate_summarize_last_full_window() {
        let mut a = LatencyAggregate::new(100 * MS, Duration::from_secs(1)).unwrap();
        for i in 0..35u32 {
            a.update(i * 37 * MS, i as f64);
        }
        let last = a.summarize_last(Duration::from_secs(1));
        let all = a.summarize();
        assert_eq!(last.count(), all.count());
        assert_close(last.mean(), all.mean());
        assert_close(last.std_dev(), all.std_dev());

        // asking for more than the window is clamped to the window
        assert_eq!(a.summarize_last(Duration::from_secs(10)).count(), all.count());
    }

    #[test]
    fn test_latency_aggregate_summarize_last_wraparound() {
        let interval = 100 * MS;
        let mut a = LatencyAggregate::new(interval, Duration::from_secs(1)).unwrap();
        let mut samples = Vec::new();

        // fill buckets 0..=9, then advance the head to 12 so that the
        // retained range spans slots 3..=9 and 0..=2
        for i in 0..=12u32 {
            for j in 0..3u32 {
                let ts = i * interval + j * 20 * MS;
                let v = (i * 10 + j) as f64;
                a.update(ts, v);
                samples.push((ts, v));
            }
        }

        for n in 1..=12u64 {
            let d = interval * n as u32;
            let got = a.summarize_last(d);
            let want = reference(&samples, interval, 10, n);
            assert_eq!(got.count(), want.count(), "n={n}");
            assert_close(got.mean(), want.mean());
            assert_close(got.std_dev(), want.std_dev());
        }
    }

    #[test]
    fn test_latency_aggregate_summarize_last_partial_bucket_rounds_up() {
        let mut a = LatencyAggregate::new(100 * MS, Duration::from_secs(1)).unwrap();
        a.update(1000 * MS, 1.0);
        a.update(1100 * MS, 2.0);
        a.update(1200 * MS, 3.0);

        // 150ms covers the head bucket plus the one before it
        let last = a.summarize_last(150 * MS);
        assert_eq!(last.count(), 2);
        assert_close(last.mean(), 2.5);

        assert!(a.summarize_last(Duration::ZERO).is_empty());
    }

    #[test]
    fn test_latency_aggregate_display() {
        let mut a = LatencyAggregate::new(100 * MS, Duration::from_secs(1)).unwrap();
        a.update(Duration::ZERO, 2.0);
        a.update(Duration::ZERO, 4.0);
        assert_eq!(a.to_string(), "count=2 mean=3 stddev=1");
    }
}
