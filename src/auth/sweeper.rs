//! Recurring background task, independent of request traffic.
//!
//! The first run happens one full interval after `start`. `stop` waits for an
//! in-flight run to finish, and nothing runs after it returns.

use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use tokio::{
    sync::oneshot,
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tracing::{debug, error};

#[derive(Debug, Clone, Copy)]
pub struct PeriodicSweeper {
    interval: Duration,
}

impl PeriodicSweeper {
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Spawn the schedule on the current tokio runtime.
    ///
    /// Errors returned by `task` are logged and the schedule keeps going.
    /// Dropping the handle without calling [`SweeperHandle::stop`] also ends
    /// the schedule, but does not wait for an in-flight run.
    pub fn start<F, Fut>(self, mut task: F) -> SweeperHandle
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let period = self.interval.max(Duration::from_millis(1));

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {}
                }

                // Runs outside the select so a stop request waits for it.
                if let Err(err) = task().await {
                    error!("Periodic sweep failed: {err:#}");
                }
            }

            debug!("Periodic sweeper stopped");
        });

        SweeperHandle {
            shutdown: Some(shutdown_tx),
            handle,
        }
    }
}

#[derive(Debug)]
pub struct SweeperHandle {
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl SweeperHandle {
    /// Cancel future runs and wait for an in-flight run to complete.
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Err(err) = (&mut self.handle).await {
            error!("Periodic sweeper task failed: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };
    use tokio::time::sleep;

    const INTERVAL: Duration = Duration::from_secs(300);

    fn counting_task(counter: &Arc<AtomicUsize>) -> impl FnMut() -> std::future::Ready<Result<()>> {
        let counter = Arc::clone(counter);
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Ok(()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_run_waits_one_interval() {
        let runs = Arc::new(AtomicUsize::new(0));
        let sweeper = PeriodicSweeper::new(INTERVAL).start(counting_task(&runs));

        sleep(INTERVAL - Duration::from_secs(1)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        sleep(Duration::from_secs(2)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        sleep(INTERVAL).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        sweeper.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn no_runs_after_stop() {
        let runs = Arc::new(AtomicUsize::new(0));
        let sweeper = PeriodicSweeper::new(INTERVAL).start(counting_task(&runs));

        sleep(INTERVAL + Duration::from_secs(1)).await;
        sweeper.stop().await;
        let after_stop = runs.load(Ordering::SeqCst);
        assert_eq!(after_stop, 1);

        sleep(INTERVAL * 5).await;
        assert_eq!(runs.load(Ordering::SeqCst), after_stop);
    }

    #[tokio::test(start_paused = true)]
    async fn errors_do_not_stop_the_schedule() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let sweeper = PeriodicSweeper::new(INTERVAL).start(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Err(anyhow!("store unavailable")))
        });

        sleep(INTERVAL * 3 + Duration::from_secs(1)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);

        sweeper.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_waits_for_in_flight_run() {
        let finished = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&finished);
        let sweeper = PeriodicSweeper::new(INTERVAL).start(move || {
            let counter = Arc::clone(&counter);
            async move {
                sleep(Duration::from_secs(30)).await;
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        // Land in the middle of the first run.
        sleep(INTERVAL + Duration::from_secs(10)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 0);

        sweeper.stop().await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_ends_the_schedule() {
        let runs = Arc::new(AtomicUsize::new(0));
        let sweeper = PeriodicSweeper::new(INTERVAL).start(counting_task(&runs));
        drop(sweeper);

        sleep(INTERVAL * 3).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }
}
