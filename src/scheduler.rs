//! Dispatch scheduling
//!
//! Drives the dispatch cycle on a fixed cadence: one cycle immediately at
//! startup, then a cycle aligned to every half hour (:00 and :30) of the
//! local clock. Shutdown is cooperative; a cancellation request waits for
//! any in-flight cycle to finish before the task exits.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local, Timelike};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::{NotifierError, Result};

/// Tick period between dispatch cycles.
const CYCLE_PERIOD: Duration = Duration::from_secs(30 * 60);

/// Anything the scheduler can drive once per tick
#[async_trait]
pub trait CycleRunner: Send + Sync {
    async fn run_cycle(&self);
}

/// Half-hour-aligned scheduler around a [`CycleRunner`]
pub struct DispatchScheduler {
    runner: Arc<dyn CycleRunner>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl DispatchScheduler {
    pub fn new(runner: Arc<dyn CycleRunner>) -> Self {
        Self {
            runner,
            cancel: CancellationToken::new(),
            handle: None,
        }
    }

    /// Spawn the scheduling task: run one cycle now, then tick on every
    /// half-hour boundary until cancelled.
    pub fn start(&mut self) {
        let runner = Arc::clone(&self.runner);
        let cancel = self.cancel.clone();

        let handle = tokio::spawn(async move {
            info!("dispatch scheduler started, running startup cycle");
            runner.run_cycle().await;

            let delay = Duration::from_secs(secs_until_next_half_hour(Local::now()));
            info!(
                next_tick_in_secs = delay.as_secs(),
                "aligning to the next half-hour boundary"
            );

            let mut ticks = time::interval_at(Instant::now() + delay, CYCLE_PERIOD);
            // Skip keeps later ticks on the original half-hour schedule when
            // a cycle overruns its period; the overlapped tick is dropped.
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("dispatch scheduler stopping");
                        break;
                    }
                    _ = ticks.tick() => {
                        // Awaited here, not raced against cancellation, so a
                        // shutdown request never cuts a cycle short.
                        runner.run_cycle().await;
                    }
                }
            }
        });

        self.handle = Some(handle);
    }

    /// Request shutdown and wait for the scheduling task to finish.
    pub async fn stop(&mut self) -> Result<()> {
        self.cancel.cancel();

        if let Some(handle) = self.handle.take() {
            handle.await.map_err(|e| {
                error!(error = %e, "scheduler task did not shut down cleanly");
                NotifierError::internal(format!("scheduler task panicked: {}", e))
            })?;
        }

        info!("dispatch scheduler stopped");
        Ok(())
    }
}

/// Seconds from `now` to the next :00 or :30 of the local clock.
///
/// Exactly on a boundary means the current tick already happened, so the
/// next one is a full period away.
fn secs_until_next_half_hour(now: DateTime<Local>) -> u64 {
    let into_period = u64::from(now.minute() % 30) * 60 + u64::from(now.second());
    if into_period == 0 {
        CYCLE_PERIOD.as_secs()
    } else {
        CYCLE_PERIOD.as_secs() - into_period
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingRunner {
        cycles: AtomicUsize,
    }

    #[async_trait]
    impl CycleRunner for CountingRunner {
        async fn run_cycle(&self) {
            self.cycles.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn at(hour: u32, minute: u32, second: u32) -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2025, 6, 1, hour, minute, second)
            .unwrap()
    }

    #[test]
    fn test_boundary_alignment_math() {
        assert_eq!(secs_until_next_half_hour(at(14, 0, 0)), 1800);
        assert_eq!(secs_until_next_half_hour(at(14, 30, 0)), 1800);
        assert_eq!(secs_until_next_half_hour(at(14, 0, 1)), 1799);
        assert_eq!(secs_until_next_half_hour(at(14, 29, 59)), 1);
        assert_eq!(secs_until_next_half_hour(at(14, 45, 30)), 870);
        assert_eq!(secs_until_next_half_hour(at(23, 59, 0)), 60);
    }

    #[tokio::test]
    async fn test_start_runs_an_immediate_cycle_and_stop_joins() {
        let runner = Arc::new(CountingRunner {
            cycles: AtomicUsize::new(0),
        });
        let mut scheduler = DispatchScheduler::new(runner.clone());

        scheduler.start();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(runner.cycles.load(Ordering::SeqCst), 1);
        scheduler.stop().await.unwrap();
    }

    struct SlowSecondCycleRunner {
        starts: std::sync::Mutex<Vec<Instant>>,
    }

    #[async_trait]
    impl CycleRunner for SlowSecondCycleRunner {
        async fn run_cycle(&self) {
            let count = {
                let mut starts = self.starts.lock().unwrap();
                starts.push(Instant::now());
                starts.len()
            };
            // The first tick-driven cycle outlasts the tick period.
            if count == 2 {
                tokio::time::sleep(Duration::from_secs(2000)).await;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_cycle_does_not_shift_later_ticks_off_schedule() {
        let runner = Arc::new(SlowSecondCycleRunner {
            starts: std::sync::Mutex::new(Vec::new()),
        });
        let mut scheduler = DispatchScheduler::new(runner.clone());

        scheduler.start();
        // Startup cycle plus enough periods to observe ticks after the
        // overrun.
        tokio::time::sleep(Duration::from_secs(4 * 1800)).await;
        scheduler.stop().await.unwrap();

        let starts = runner.starts.lock().unwrap();
        assert!(starts.len() >= 3, "expected ticks after the slow cycle");

        // Every tick-driven cycle stays a whole number of periods after the
        // first one, even though one cycle ran 2000 seconds.
        let first_tick = starts[1];
        for start in &starts[2..] {
            let offset = start.duration_since(first_tick).as_secs();
            assert_eq!(
                offset % CYCLE_PERIOD.as_secs(),
                0,
                "tick drifted off the half-hour schedule by {}s",
                offset % CYCLE_PERIOD.as_secs()
            );
        }
    }

    #[tokio::test]
    async fn test_stop_without_start_is_a_noop() {
        let runner = Arc::new(CountingRunner {
            cycles: AtomicUsize::new(0),
        });
        let mut scheduler = DispatchScheduler::new(runner);
        scheduler.stop().await.unwrap();
    }
}
