//! Fixed-interval job runner backing the lobby's periodic checks
//!
//! A `TimerService` owns at most one tokio task. `start` and `stop` are
//! idempotent, and dropping the service stops its task.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// Work run on every tick
pub type TimerJob = Arc<dyn Fn() + Send + Sync>;

pub struct TimerService {
    name: &'static str,
    interval: Duration,
    run_immediately: bool,
    job: TimerJob,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl TimerService {
    /// Create a stopped timer. `interval` must be non-zero.
    pub fn new<F>(name: &'static str, interval: Duration, run_immediately: bool, job: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            name,
            interval,
            run_immediately,
            job: Arc::new(job),
            task: Mutex::new(None),
        }
    }

    /// Start ticking. Returns false if the timer was already running or no
    /// tokio runtime is available.
    pub fn start(&self) -> bool {
        let mut task = self.lock();
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return false;
        }

        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                warn!(
                    "Timer '{}' not started: no tokio runtime on this thread",
                    self.name
                );
                return false;
            }
        };

        let job = self.job.clone();
        let period = self.interval;
        let first_tick = if self.run_immediately {
            Instant::now()
        } else {
            Instant::now() + period
        };

        *task = Some(runtime.spawn(async move {
            let mut ticker = time::interval_at(first_tick, period);
            // Skip missed ticks rather than bursting after a stall.
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                job();
            }
        }));

        debug!("Timer '{}' started (interval: {:?})", self.name, self.interval);
        true
    }

    /// Stop ticking. Returns false if the timer was not running.
    pub fn stop(&self) -> bool {
        match self.lock().take() {
            Some(handle) => {
                handle.abort();
                debug!("Timer '{}' stopped", self.name);
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    fn lock(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.task.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for TimerService {
    fn drop(&mut self) {
        if let Some(handle) = self.lock().take() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for TimerService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerService")
            .field("name", &self.name)
            .field("interval", &self.interval)
            .field("run_immediately", &self.run_immediately)
            .field("running", &self.is_running())
            .finish()
    }
}
