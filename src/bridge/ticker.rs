//! Periodic driver for interactive layouts
//!
//! A tokio task fires at a fixed interval and calls a step closure until the closure
//! reports that the simulation is done or the ticker is cancelled.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Handle to a running periodic driver
pub struct Ticker {
    cancelled: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl Ticker {
    /// Spawn the driver on `runtime`. `step` returns `true` to keep going.
    pub fn spawn<F>(runtime: &Handle, period: Duration, mut step: F) -> Self
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();

        let task = runtime.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately
            interval.tick().await;

            loop {
                interval.tick().await;
                if flag.load(Ordering::Acquire) {
                    break;
                }
                if !step() {
                    break;
                }
            }
            tracing::trace!("ticker finished");
        });

        Self { cancelled, task }
    }

    /// Whether the driver has exited
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the driver; no step starts after this returns
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.task.abort();
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.cancel();
    }
}
