//! RTC Forward Stats - forwarding latency and jitter estimation for media relays.
//!
//! A relay (SFU) knows when each packet arrived and when it was sent on. This
//! crate turns that stream of `(arrival, departure)` pairs into:
//!
//! - a smoothed jitter estimate of the transit delay, using the RFC 3550
//!   exponential filter with gain 1/16, and
//! - a windowed mean and standard deviation of the transit delay, kept in a
//!   time-bucketed ring of Welford accumulators that ages out old data.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Welford`] | Numerically stable online mean/variance, mergeable |
//! | [`LatencyAggregate`] | Fixed-capacity ring of [`Welford`] buckets over a sliding window |
//! | [`ForwardStats`] | Thread-safe tracker combining the aggregate with a jitter estimate |
//! | [`ForwardStatsBuilder`] | Validated construction, optionally with a periodic reporter |
//! | [`ForwardStatsSink`] | Receiver of periodic [`ForwardStatsReport`]s |
//!
//! # Concurrency
//!
//! [`ForwardStats::update`] may be called from any number of threads. Samples
//! whose departure time moves backwards are rejected with a single atomic
//! compare-and-swap; admitted samples update the ring and the jitter state
//! under one mutex that readers share. The optional reporter is a tokio task
//! that is stopped by [`ForwardStats::stop`] or by dropping the tracker.
//!
//! # Quick Start
//!
//! ```no_run
//! use rtc_forward_stats::{ForwardStatsBuilder, ForwardStatsReport};
//! use std::time::{Duration, SystemTime};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), rtc_forward_stats::Error> {
//! let stats = ForwardStatsBuilder::new()
//!     .with_bucket_width(Duration::from_millis(500))
//!     .with_window_length(Duration::from_secs(30))
//!     .with_report_interval(Duration::from_secs(5))
//!     .build_with_sink(|report: &ForwardStatsReport| {
//!         println!("latency={}ms jitter={}ms", report.latency_ms(), report.jitter_ms());
//!     })?;
//!
//! // on every forwarded packet
//! let arrival = SystemTime::now();
//! let departure = SystemTime::now();
//! stats.update(arrival, departure);
//!
//! // when the stream ends
//! stats.stop();
//! # Ok(())
//! # }
//! ```

#![warn(rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod forward_stats;
pub mod latency_aggregate;
pub mod reporter;
pub mod welford;

pub use config::ForwardStatsBuilder;
pub use error::{Error, Result};
pub use forward_stats::{ForwardStats, ForwardStatsReport};
pub use latency_aggregate::{LatencyAggregate, MAX_BUCKETS};
pub use reporter::ForwardStatsSink;
pub use welford::Welford;
