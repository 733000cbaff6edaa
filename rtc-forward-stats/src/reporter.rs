//! Periodic push of recent forwarding statistics to a metrics sink.

use crate::error::{Error, Result};
use crate::forward_stats::{ForwardStatsReport, Shared};
use log::{debug, trace};
use std::sync::Arc;
use std::sync::Weak;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::time::{Instant, MissedTickBehavior};

/// Destination for periodic forwarding statistics, typically a metrics
/// exporter recording `latency_ms()` and `jitter_ms()`.
///
/// Called from the reporter task once per interval. Implementations should
/// return quickly; a failed record is not retried.
pub trait ForwardStatsSink: Send + Sync + 'static {
    fn record(&self, report: &ForwardStatsReport);
}

impl<F> ForwardStatsSink for F
where
    F: Fn(&ForwardStatsReport) + Send + Sync + 'static,
{
    fn record(&self, report: &ForwardStatsReport) {
        self(report)
    }
}

/// Handle to the background task pulling [`ForwardStatsReport`]s.
pub(crate) struct Reporter {
    stopped: AtomicBool,
    stop: Arc<Notify>,
}

impl Reporter {
    /// Spawn the reporting task on the current tokio runtime.
    ///
    /// Every `interval` the task summarizes the last `interval` worth of
    /// buckets and hands the result to `sink`. It ends when [`Reporter::stop`]
    /// is called or when the tracker behind `stats` has been dropped.
    pub(crate) fn spawn<S>(stats: Weak<Shared>, interval: Duration, sink: S) -> Result<Self>
    where
        S: ForwardStatsSink,
    {
        if interval.is_zero() {
            return Err(Error::ErrZeroReportInterval);
        }
        let start = Instant::now()
            .checked_add(interval)
            .ok_or(Error::ErrReportIntervalTooLarge(interval))?;
        let handle = Handle::try_current().map_err(|_| Error::ErrNoRuntime)?;

        let stop = Arc::new(Notify::new());
        let stop_rx = Arc::clone(&stop);

        handle.spawn(async move {
            let mut ticker = tokio::time::interval_at(start, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = stop_rx.notified() => {
                        debug!("forward stats reporter stopped");
                        return;
                    }
                    _ = ticker.tick() => {
                        let Some(stats) = stats.upgrade() else {
                            debug!("forward stats dropped, reporter exiting");
                            return;
                        };
                        let report = stats.get_last_stats(interval);
                        drop(stats);

                        trace!(
                            "forward stats report: latency={:.3}ms jitter={:.3}ms",
                            report.latency_ms(),
                            report.jitter_ms()
                        );
                        sink.record(&report);
                    }
                }
            }
        });

        debug!("forward stats reporter started with interval {interval:?}");
        Ok(Self {
            stopped: AtomicBool::new(false),
            stop,
        })
    }

    /// Signal the task to exit. Only the first call has any effect.
    pub(crate) fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        // notify_one keeps a permit if the task is not waiting right now
        self.stop.notify_one();
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}
