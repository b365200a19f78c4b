//! Small periodic-task scheduler.
//!
//! Wraps a spawned tokio task running a callback at a fixed interval, with a
//! cancellable handle. Both the worker publishers and the metrics reporter
//! are driven by this.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// A cancellable periodic task handle.
pub struct PeriodicTask {
    name: &'static str,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    /// Spawn a task that runs `tick` every `period`, with the first run after
    /// `initial_delay`.
    pub fn spawn<F, Fut>(name: &'static str, initial_delay: Duration, period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let handle = tokio::spawn(async move {
            let mut timer = interval_at(Instant::now() + initial_delay, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                timer.tick().await;
                tick().await;
            }
        });
        Self { name, handle }
    }

    /// Cancel the task. Safe to call more than once.
    pub fn cancel(&self) {
        self.handle.abort();
        tracing::debug!("stopped periodic task '{}'", self.name);
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn ticks_run_until_cancelled() {
        let count = Arc::new(AtomicU32::new(0));
        let counter = count.clone();
        let task = PeriodicTask::spawn(
            "test-tick",
            Duration::ZERO,
            Duration::from_millis(10),
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            },
        );

        tokio::time::sleep(Duration::from_millis(60)).await;
        task.cancel();
        let after_cancel = count.load(Ordering::SeqCst);
        assert!(after_cancel >= 2);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(count.load(Ordering::SeqCst), after_cancel);
    }

    #[tokio::test]
    async fn initial_delay_defers_first_tick() {
        let count = Arc::new(AtomicU32::new(0));
        let counter = count.clone();
        let _task = PeriodicTask::spawn(
            "test-delay",
            Duration::from_millis(80),
            Duration::from_millis(80),
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            },
        );

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
