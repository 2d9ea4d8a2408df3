use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::error::{MonitorError, SchedulerError};

/// Work executed once per tick.
pub trait PollTask: Send + Sync + 'static {
    fn run(&self) -> impl Future<Output = Result<(), MonitorError>> + Send;
}

/// Handles of the currently running timer task.
struct Running {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Fixed-rate timer driving a [`PollTask`].
///
/// The first tick fires as soon as the scheduler starts. Ticks never
/// overlap: a tick that overruns its period is followed immediately by the
/// next one, and no tick is skipped.
pub struct PollingScheduler {
    interval: watch::Sender<Duration>,
    /// true from `start` until the timer task exits
    running: Arc<AtomicBool>,
    ticks: Arc<AtomicU64>,
    current: Mutex<Option<Running>>,
}

impl PollingScheduler {
    pub fn new(interval: Duration) -> Self {
        let (interval, _) = watch::channel(interval);
        Self {
            interval,
            running: Arc::new(AtomicBool::new(false)),
            ticks: Arc::new(AtomicU64::new(0)),
            current: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn interval(&self) -> Duration {
        *self.interval.borrow()
    }

    /// Ticks started since the scheduler was created.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    /// Start firing `task` every `interval`, the first time right away.
    pub async fn start<T: PollTask>(
        &self,
        interval: Duration,
        task: Arc<T>,
    ) -> Result<(), SchedulerError> {
        if interval.is_zero() {
            return Err(SchedulerError::ZeroInterval);
        }

        let mut current = self.current.lock().await;
        if let Some(previous) = current.as_ref() {
            if !previous.handle.is_finished() {
                return Err(SchedulerError::AlreadyRunning);
            }
            // timer of an abandoned stop has already exited
            debug!("reaping finished polling timer");
        }

        self.interval.send_replace(interval);
        let interval_rx = self.interval.subscribe();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let ticks = self.ticks.clone();

        self.running.store(true, Ordering::SeqCst);
        let handle = tokio::spawn(run_loop(
            task,
            interval_rx,
            shutdown_rx,
            ticks,
            self.running.clone(),
        ));
        *current = Some(Running { shutdown, handle });

        info!(interval_ms = interval.as_millis() as u64, "polling scheduler started");
        Ok(())
    }

    /// Change the period. The tick in progress (if any) completes, and the
    /// next one is due one new period after the last tick was scheduled.
    pub fn reconfigure_interval(&self, interval: Duration) -> Result<(), SchedulerError> {
        if interval.is_zero() {
            return Err(SchedulerError::ZeroInterval);
        }
        let previous = self.interval.send_replace(interval);
        if previous != interval {
            info!(
                from_ms = previous.as_millis() as u64,
                to_ms = interval.as_millis() as u64,
                "polling interval changed"
            );
        }
        Ok(())
    }

    /// Prevent further ticks and wait for the one in flight.
    ///
    /// Safe to call repeatedly; later calls return immediately. If the
    /// returned future is dropped early, shutdown is still signalled and the
    /// timer handle stays in place for the next `stop` or `start` to reap.
    pub async fn stop(&self) {
        let mut current = self.current.lock().await;
        let Some(running) = current.as_mut() else {
            return;
        };

        running.shutdown.send_replace(true);
        let joined = (&mut running.handle).await;
        *current = None;
        self.running.store(false, Ordering::SeqCst);

        if let Err(e) = joined {
            error!(error = %e, "polling timer task ended abnormally");
        }
        info!(ticks = self.ticks(), "polling scheduler stopped");
    }
}

fn fixed_rate(start: Instant, period: Duration) -> Interval {
    let mut ticker = time::interval_at(start, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);
    ticker
}

async fn run_loop<T: PollTask>(
    task: Arc<T>,
    mut interval_rx: watch::Receiver<Duration>,
    mut shutdown_rx: watch::Receiver<bool>,
    ticks: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
) {
    let period = *interval_rx.borrow_and_update();
    let mut last_tick = Instant::now();
    let mut ticker = fixed_rate(last_tick, period);

    loop {
        tokio::select! {
            biased;

            _ = shutdown_rx.changed() => break,

            changed = interval_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let period = *interval_rx.borrow_and_update();
                let next = (last_tick + period).max(Instant::now());
                ticker = fixed_rate(next, period);
                debug!(period_ms = period.as_millis() as u64, "timer rescheduled");
            }

            scheduled = ticker.tick() => {
                if *shutdown_rx.borrow() {
                    break;
                }
                last_tick = scheduled;
                let n = ticks.fetch_add(1, Ordering::SeqCst) + 1;

                // Run the tick in its own task so a panic cannot end polling.
                let task = task.clone();
                match tokio::spawn(async move { task.run().await }).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => error!(tick = n, error = %e, "polling tick failed"),
                    Err(e) => error!(tick = n, error = %e, "polling tick panicked"),
                }
            }
        }
    }
    running.store(false, Ordering::SeqCst);
    debug!("polling timer task exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[derive(Default)]
    struct CountingTask {
        started: AtomicU32,
        finished: AtomicU32,
        busy_for: Duration,
        fail: bool,
        panic_first: bool,
    }

    impl PollTask for CountingTask {
        async fn run(&self) -> Result<(), MonitorError> {
            let n = self.started.fetch_add(1, Ordering::SeqCst);
            if self.panic_first && n == 0 {
                panic!("first tick blows up");
            }
            if !self.busy_for.is_zero() {
                time::sleep(self.busy_for).await;
            }
            self.finished.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(MonitorError::WriteAfterShutdown("test".into()));
            }
            Ok(())
        }
    }

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn started(task: &CountingTask) -> u32 {
        task.started.load(Ordering::SeqCst)
    }

    #[tokio::test(start_paused = true)]
    async fn first_tick_is_immediate_then_fixed_rate() {
        let sched = PollingScheduler::new(ms(1000));
        let task = Arc::new(CountingTask::default());
        sched.start(ms(1000), task.clone()).await.unwrap();

        time::sleep(ms(10)).await;
        assert_eq!(started(&task), 1);

        time::sleep(ms(3_000)).await;
        // ticks at 0, 1000, 2000, 3000
        assert_eq!(started(&task), 4);
        assert_eq!(sched.ticks(), 4);
        sched.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn new_interval_applies_from_next_tick() {
        let sched = PollingScheduler::new(ms(5_000));
        let task = Arc::new(CountingTask::default());
        sched.start(ms(5_000), task.clone()).await.unwrap();

        time::sleep(ms(100)).await;
        assert_eq!(started(&task), 1);

        sched.reconfigure_interval(ms(1_000)).unwrap();
        assert_eq!(sched.interval(), ms(1_000));

        time::sleep(ms(950)).await; // t = 1050
        assert_eq!(started(&task), 2);
        time::sleep(ms(1_000)).await; // t = 2050
        assert_eq!(started(&task), 3);
        sched.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn longer_interval_postpones_next_tick() {
        let sched = PollingScheduler::new(ms(1_000));
        let task = Arc::new(CountingTask::default());
        sched.start(ms(1_000), task.clone()).await.unwrap();

        time::sleep(ms(500)).await;
        sched.reconfigure_interval(ms(3_000)).unwrap();

        time::sleep(ms(2_000)).await; // t = 2500, old period would have fired twice
        assert_eq!(started(&task), 1);
        time::sleep(ms(600)).await; // t = 3100
        assert_eq!(started(&task), 2);
        sched.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_waits_for_in_flight_tick() {
        let sched = PollingScheduler::new(ms(1_000));
        let task = Arc::new(CountingTask {
            busy_for: ms(500),
            ..CountingTask::default()
        });
        sched.start(ms(1_000), task.clone()).await.unwrap();

        time::sleep(ms(10)).await;
        assert_eq!(started(&task), 1);
        assert_eq!(task.finished.load(Ordering::SeqCst), 0);

        sched.stop().await;
        assert_eq!(task.finished.load(Ordering::SeqCst), 1);
        assert!(!sched.is_running());

        time::sleep(ms(1_500)).await;
        assert_eq!(started(&task), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent() {
        let sched = PollingScheduler::new(ms(1_000));
        sched.stop().await;

        let task = Arc::new(CountingTask::default());
        sched.start(ms(1_000), task.clone()).await.unwrap();
        sched.stop().await;
        sched.stop().await;
        assert!(!sched.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_stop_still_shuts_down() {
        let sched = PollingScheduler::new(ms(1_000));
        let task = Arc::new(CountingTask {
            busy_for: ms(500),
            ..CountingTask::default()
        });
        sched.start(ms(1_000), task.clone()).await.unwrap();
        time::sleep(ms(10)).await;

        // caller gives up while the tick is still running
        assert!(time::timeout(ms(50), sched.stop()).await.is_err());

        time::sleep(ms(2_000)).await;
        assert!(!sched.is_running());
        assert_eq!(started(&task), 1);
        assert_eq!(task.finished.load(Ordering::SeqCst), 1);

        sched.stop().await;
        assert!(!sched.is_running());

        sched.start(ms(1_000), task.clone()).await.unwrap();
        assert!(sched.is_running());
        sched.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn start_after_abandoned_stop_reaps_old_timer() {
        let sched = PollingScheduler::new(ms(1_000));
        let task = Arc::new(CountingTask {
            busy_for: ms(200),
            ..CountingTask::default()
        });
        sched.start(ms(1_000), task.clone()).await.unwrap();
        time::sleep(ms(10)).await;
        assert!(time::timeout(ms(20), sched.stop()).await.is_err());

        // still draining the tick, so the old timer counts as running
        assert_eq!(
            sched.start(ms(1_000), task.clone()).await,
            Err(SchedulerError::AlreadyRunning)
        );

        time::sleep(ms(500)).await;
        sched.start(ms(1_000), task.clone()).await.unwrap();
        time::sleep(ms(10)).await;
        assert_eq!(started(&task), 2);
        sched.stop().await;
        assert!(!sched.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn double_start_is_rejected() {
        let sched = PollingScheduler::new(ms(1_000));
        let task = Arc::new(CountingTask::default());
        sched.start(ms(1_000), task.clone()).await.unwrap();
        assert_eq!(
            sched.start(ms(1_000), task.clone()).await,
            Err(SchedulerError::AlreadyRunning)
        );

        sched.stop().await;
        sched.start(ms(1_000), task).await.unwrap();
        assert!(sched.is_running());
        sched.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_is_rejected() {
        let sched = PollingScheduler::new(ms(1_000));
        let task = Arc::new(CountingTask::default());
        assert_eq!(
            sched.start(Duration::ZERO, task).await,
            Err(SchedulerError::ZeroInterval)
        );
        assert_eq!(
            sched.reconfigure_interval(Duration::ZERO),
            Err(SchedulerError::ZeroInterval)
        );
        assert_eq!(sched.interval(), ms(1_000));
    }

    #[tokio::test(start_paused = true)]
    async fn failing_ticks_keep_polling() {
        let sched = PollingScheduler::new(ms(1_000));
        let task = Arc::new(CountingTask {
            fail: true,
            ..CountingTask::default()
        });
        sched.start(ms(1_000), task.clone()).await.unwrap();

        time::sleep(ms(2_500)).await;
        assert_eq!(started(&task), 3);
        sched.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_tick_keeps_polling() {
        let sched = PollingScheduler::new(ms(1_000));
        let task = Arc::new(CountingTask {
            panic_first: true,
            ..CountingTask::default()
        });
        sched.start(ms(1_000), task.clone()).await.unwrap();

        time::sleep(ms(1_500)).await;
        assert_eq!(started(&task), 2);
        assert_eq!(task.finished.load(Ordering::SeqCst), 1);
        sched.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn overrunning_tick_is_followed_immediately() {
        let sched = PollingScheduler::new(ms(1_000));
        let task = Arc::new(CountingTask {
            busy_for: ms(1_500),
            ..CountingTask::default()
        });
        sched.start(ms(1_000), task.clone()).await.unwrap();

        // tick 1 runs 0..1500, tick 2 is late and starts at 1500
        time::sleep(ms(1_510)).await;
        assert_eq!(started(&task), 2);
        assert_eq!(task.finished.load(Ordering::SeqCst), 1);
        sched.stop().await;
    }
}
