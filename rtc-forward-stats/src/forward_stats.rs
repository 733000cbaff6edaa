//! Forwarding latency and jitter tracker.

use crate::config::ForwardStatsBuilder;
use crate::latency_aggregate::LatencyAggregate;
use crate::reporter::Reporter;
use crate::welford::Welford;
use log::{debug, trace, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Gain of the exponential jitter filter, as in RFC 3550 section 6.4.1.
const JITTER_GAIN_DIVISOR: i64 = 16;

/// Latency and jitter snapshot returned by [`ForwardStats::get_stats`] and
/// [`ForwardStats::get_last_stats`].
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct ForwardStatsReport {
    /// Mean forwarding latency over the summarized buckets.
    pub latency: Duration,
    /// Population standard deviation of the forwarding latency.
    pub latency_std_dev: Duration,
    /// Smoothed transit delay variation.
    pub jitter: Duration,
}

impl ForwardStatsReport {
    pub fn latency_ms(&self) -> f64 {
        self.latency.as_secs_f64() * 1000.0
    }

    pub fn latency_std_dev_ms(&self) -> f64 {
        self.latency_std_dev.as_secs_f64() * 1000.0
    }

    pub fn jitter_ms(&self) -> f64 {
        self.jitter.as_secs_f64() * 1000.0
    }
}

struct State {
    latency: LatencyAggregate,
    last_transit_ns: i64,
    jitter_ns: i64,
}

/// State shared between the tracker and its reporter task.
pub(crate) struct Shared {
    /// Departure time (ms since epoch) of the newest admitted sample.
    last_departure_ms: AtomicU64,
    state: Mutex<State>,
}

impl Shared {
    fn new(latency: LatencyAggregate) -> Self {
        Self {
            last_departure_ms: AtomicU64::new(0),
            state: Mutex::new(State {
                latency,
                last_transit_ns: 0,
                jitter_ns: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!("forward stats lock poisoned, continuing with inner state");
            poisoned.into_inner()
        })
    }

    fn update_unix(&self, arrival: Duration, departure: Duration) -> bool {
        let departure_ms = u64::try_from(departure.as_millis()).unwrap_or(u64::MAX);
        let last_ms = self.last_departure_ms.load(Ordering::Acquire);
        if departure_ms < last_ms
            || self
                .last_departure_ms
                .compare_exchange(last_ms, departure_ms, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
        {
            trace!("dropping out of order sample departed at {departure_ms}ms, last {last_ms}ms");
            return false;
        }

        let transit = as_nanos_i64(departure).saturating_sub(as_nanos_i64(arrival));

        let mut state = self.lock();
        state.latency.update(arrival, transit as f64);

        let d = transit.saturating_sub(state.last_transit_ns).saturating_abs();
        let jitter = state.jitter_ns;
        state.jitter_ns = jitter + (d - jitter) / JITTER_GAIN_DIVISOR;
        state.last_transit_ns = transit;

        true
    }

    pub(crate) fn get_stats(&self) -> ForwardStatsReport {
        let state = self.lock();
        let w = state.latency.summarize();
        ForwardStatsReport {
            latency: duration_from_nanos(w.mean()),
            latency_std_dev: duration_from_nanos(w.std_dev()),
            jitter: Duration::from_nanos(state.jitter_ns.max(0) as u64),
        }
    }

    pub(crate) fn get_last_stats(&self, duration: Duration) -> ForwardStatsReport {
        let state = self.lock();
        let w = state.latency.summarize_last(duration);
        ForwardStatsReport {
            latency: duration_from_nanos(w.mean()),
            latency_std_dev: duration_from_nanos(w.std_dev()),
            jitter: Duration::from_nanos(state.jitter_ns.max(0) as u64),
        }
    }
}

fn as_nanos_i64(d: Duration) -> i64 {
    i64::try_from(d.as_nanos()).unwrap_or(i64::MAX)
}

fn duration_from_nanos(v: f64) -> Duration {
    // negative means (clock skew between arrival and departure) clamp to zero
    Duration::from_nanos(v.max(0.0) as u64)
}

fn since_unix_epoch(t: SystemTime) -> Duration {
    t.duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO)
}

/// Tracks the one-way forwarding delay of a media stream through the relay.
///
/// Each forwarded packet reports when it arrived and when it left. The
/// tracker keeps a windowed mean/standard deviation of that transit delay and
/// an RFC 3550 style jitter estimate of its variation.
///
/// Samples whose departure time goes backwards are rejected by a lock-free
/// compare-and-swap before any lock is taken, so stale or reordered packets
/// are cheap to drop and never disturb the jitter state. The remaining work
/// runs under a single mutex shared with the readers.
///
/// # Example
///
/// ```
/// use rtc_forward_stats::ForwardStatsBuilder;
/// use std::time::Duration;
///
/// let stats = ForwardStatsBuilder::new()
///     .with_bucket_width(Duration::from_millis(100))
///     .with_window_length(Duration::from_secs(1))
///     .build()
///     .unwrap();
///
/// stats.update_unix(Duration::from_millis(1_000), Duration::from_millis(1_010));
/// let report = stats.get_stats();
/// assert_eq!(report.latency, Duration::from_millis(10));
/// ```
pub struct ForwardStats {
    shared: Arc<Shared>,
    reporter: Option<Reporter>,
}

impl ForwardStats {
    /// Shorthand for [`ForwardStatsBuilder::new`].
    pub fn builder() -> ForwardStatsBuilder {
        ForwardStatsBuilder::new()
    }

    pub(crate) fn new(latency: LatencyAggregate) -> Self {
        debug!(
            "forward stats created: {} buckets of {:?}",
            latency.capacity(),
            latency.interval()
        );
        Self {
            shared: Arc::new(Shared::new(latency)),
            reporter: None,
        }
    }

    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }

    pub(crate) fn set_reporter(&mut self, reporter: Reporter) {
        self.reporter = Some(reporter);
    }

    /// Record a packet that arrived at `arrival` and was forwarded at
    /// `departure`.
    ///
    /// Returns `false` when the sample was dropped because its departure time
    /// is older than an already admitted one, or because a concurrent update
    /// won the race to advance it.
    pub fn update(&self, arrival: SystemTime, departure: SystemTime) -> bool {
        self.shared
            .update_unix(since_unix_epoch(arrival), since_unix_epoch(departure))
    }

    /// Same as [`ForwardStats::update`] with both timestamps given as
    /// durations since the Unix epoch.
    pub fn update_unix(&self, arrival: Duration, departure: Duration) -> bool {
        self.shared.update_unix(arrival, departure)
    }

    /// Latency statistics over the whole retained window.
    pub fn get_stats(&self) -> ForwardStatsReport {
        self.shared.get_stats()
    }

    /// Latency statistics over the most recent buckets covering `duration`.
    pub fn get_last_stats(&self, duration: Duration) -> ForwardStatsReport {
        self.shared.get_last_stats(duration)
    }

    /// Copy of the raw latency summary (nanoseconds) over the whole window.
    pub fn latency_summary(&self) -> Welford {
        self.shared.lock().latency.summarize()
    }

    /// Whether a periodic reporter is attached and still running.
    pub fn is_reporting(&self) -> bool {
        self.reporter.as_ref().is_some_and(|r| !r.is_stopped())
    }

    /// Stop the periodic reporter, if any. Safe to call repeatedly; updates
    /// keep being tracked afterwards.
    pub fn stop(&self) {
        if let Some(reporter) = &self.reporter {
            reporter.stop();
        }
    }
}

impl Drop for ForwardStats {
    fn drop(&mut self) {
        self.stop();
        debug!("forward stats closed: {}", self.shared.lock().latency);
    }
}
