//! Construction-time configuration for [`ForwardStats`].

use crate::error::Result;
use crate::forward_stats::ForwardStats;
use crate::latency_aggregate::LatencyAggregate;
use crate::reporter::{ForwardStatsSink, Reporter};
use std::sync::Arc;
use std::time::Duration;

/// Default width of a latency bucket.
pub const DEFAULT_BUCKET_WIDTH: Duration = Duration::from_secs(1);
/// Default span of latency history kept for [`ForwardStats::get_stats`].
pub const DEFAULT_WINDOW_LENGTH: Duration = Duration::from_secs(60);
/// Default cadence of the periodic reporter.
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(5);

/// Builder for [`ForwardStats`].
///
/// Values are validated once by [`build`](Self::build) or
/// [`build_with_sink`](Self::build_with_sink); they cannot be changed on a
/// live tracker.
///
/// # Example
///
/// ```
/// use rtc_forward_stats::ForwardStatsBuilder;
/// use std::time::Duration;
///
/// // With default settings (1s buckets over a 60s window)
/// let stats = ForwardStatsBuilder::new().build().unwrap();
///
/// // With custom bucketing
/// let stats = ForwardStatsBuilder::new()
///     .with_bucket_width(Duration::from_millis(100))
///     .with_window_length(Duration::from_secs(2))
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct ForwardStatsBuilder {
    /// Granularity of the latency ring buffer.
    bucket_width: Duration,
    /// Total latency history retained.
    window_length: Duration,
    /// Cadence of the periodic reporter, also the span it summarizes.
    report_interval: Duration,
}

impl Default for ForwardStatsBuilder {
    fn default() -> Self {
        Self {
            bucket_width: DEFAULT_BUCKET_WIDTH,
            window_length: DEFAULT_WINDOW_LENGTH,
            report_interval: DEFAULT_REPORT_INTERVAL,
        }
    }
}

impl ForwardStatsBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the width of each latency bucket. Must be non-zero.
    pub fn with_bucket_width(mut self, bucket_width: Duration) -> Self {
        self.bucket_width = bucket_width;
        self
    }

    /// Set the span of latency history to retain. Must be at least the
    /// bucket width; rounded up to a whole number of buckets.
    pub fn with_window_length(mut self, window_length: Duration) -> Self {
        self.window_length = window_length;
        self
    }

    /// Set how often the periodic reporter pushes to its sink. Independent
    /// of the bucket width and window length; must be non-zero and small
    /// enough to schedule from the current instant.
    pub fn with_report_interval(mut self, report_interval: Duration) -> Self {
        self.report_interval = report_interval;
        self
    }

    pub fn bucket_width(&self) -> Duration {
        self.bucket_width
    }

    pub fn window_length(&self) -> Duration {
        self.window_length
    }

    pub fn report_interval(&self) -> Duration {
        self.report_interval
    }

    /// Create a tracker without a periodic reporter.
    pub fn build(self) -> Result<ForwardStats> {
        let latency = LatencyAggregate::new(self.bucket_width, self.window_length)?;
        Ok(ForwardStats::new(latency))
    }

    /// Create a tracker that pushes [`ForwardStats::get_last_stats`] for the
    /// report interval to `sink` on that same interval.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build_with_sink<S>(self, sink: S) -> Result<ForwardStats>
    where
        S: ForwardStatsSink,
    {
        let report_interval = self.report_interval;
        let mut stats = self.build()?;
        let reporter = Reporter::spawn(Arc::downgrade(stats.shared()), report_interval, sink)?;
        stats.set_reporter(reporter);
        Ok(stats)
    }
}
