//! Wall-clock feedback while a batch runs.
//!
//! Purely observational: the reporter publishes elapsed time on a watch
//! channel and never touches the batch.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Default interval between elapsed-time updates.
pub const DEFAULT_TICK: Duration = Duration::from_millis(500);

/// Default elapsed time after which a batch is reported as slow.
pub const DEFAULT_SLOW_THRESHOLD: Duration = Duration::from_secs(30);

const SLOW_ADVISORY: &str = "Upload is taking longer than expected";

/// Latest elapsed-time reading of a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ElapsedSnapshot {
    pub elapsed: Duration,
    /// Elapsed time has passed the slow threshold.
    pub slow: bool,
    /// The batch is still Running.
    pub running: bool,
}

impl ElapsedSnapshot {
    /// User-facing advisory, present once the batch is slow.
    pub fn advisory(&self) -> Option<&'static str> {
        if self.slow {
            Some(SLOW_ADVISORY)
        } else {
            None
        }
    }
}

/// Periodic publisher of [`ElapsedSnapshot`]s for one batch run.
///
/// Stops on [`stop`](Self::stop) or when dropped, and publishes a final
/// snapshot with `running = false`. Ticks that race with the stop never
/// overwrite that final snapshot.
pub struct ElapsedTimeReporter {
    started: Instant,
    slow_threshold: Duration,
    tx: Arc<watch::Sender<ElapsedSnapshot>>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl ElapsedTimeReporter {
    /// Starts reporting now. Must be called inside a tokio runtime.
    pub fn start(
        tx: Arc<watch::Sender<ElapsedSnapshot>>,
        tick: Duration,
        slow_threshold: Duration,
    ) -> Self {
        let started = Instant::now();
        let cancel = CancellationToken::new();

        tx.send_replace(ElapsedSnapshot {
            elapsed: Duration::ZERO,
            slow: slow_threshold.is_zero(),
            running: true,
        });

        let task_tx = tx.clone();
        let task_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = task_cancel.cancelled() => break,
                    _ = interval.tick() => {
                        let elapsed = started.elapsed();
                        task_tx.send_if_modified(|snapshot| {
                            if !snapshot.running {
                                return false;
                            }
                            *snapshot = ElapsedSnapshot {
                                elapsed,
                                slow: elapsed >= slow_threshold,
                                running: true,
                            };
                            true
                        });
                    }
                }
            }
        });

        Self {
            started,
            slow_threshold,
            tx,
            cancel,
            handle: Some(handle),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Stops reporting and returns the total elapsed time.
    pub fn stop(mut self) -> Duration {
        self.finish()
    }

    fn finish(&mut self) -> Duration {
        let elapsed = self.started.elapsed();
        self.cancel.cancel();
        self.tx.send_replace(ElapsedSnapshot {
            elapsed,
            slow: elapsed >= self.slow_threshold,
            running: false,
        });
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
        elapsed
    }
}

impl Drop for ElapsedTimeReporter {
    fn drop(&mut self) {
        if !self.cancel.is_cancelled() {
            self.finish();
        }
    }
}
