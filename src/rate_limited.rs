use crate::{
    dispatcher::Dispatcher, error::Error, executor::Executor, task::Task, window::DispatchWindow,
};

use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Allows roughly `max_dispatches` task starts per sliding `interval`.
///
/// Tasks over the limit are not queued. Each one reserves the earliest instant that keeps the
/// recorded dispatches within the limit and is handed to the executor with a delay aimed at it.
/// Deferred tasks never coordinate beyond that reservation: nothing orders tasks released
/// together, and timer and executor latency shift actual starts, so short bursts of up to about
/// twice the limit can be observed. Use
/// [`StrictRateLimitedDispatcher`](crate::StrictRateLimitedDispatcher) when the limit must hold
/// exactly and tasks must start in submission order.
#[derive(Debug)]
pub struct RateLimitedDispatcher {
    executor: Executor,
    max_dispatches: usize,
    interval: Duration,
    window: Mutex<DispatchWindow>,
}

impl RateLimitedDispatcher {
    pub fn new(max_dispatches: usize, per_interval: Duration) -> Result<Self, Error> {
        Self::with_executor(max_dispatches, per_interval, Executor::default())
    }

    pub fn with_executor(
        max_dispatches: usize,
        per_interval: Duration,
        executor: Executor,
    ) -> Result<Self, Error> {
        let window = DispatchWindow::new(max_dispatches, per_interval)?;

        tracing::debug!(
            max_dispatches,
            ?per_interval,
            ?executor,
            "Created rate limited dispatcher"
        );

        Ok(Self {
            executor,
            max_dispatches,
            interval: per_interval,
            window: Mutex::new(window),
        })
    }

    pub fn max_dispatches(&self) -> usize {
        self.max_dispatches
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Dispatches recorded within the last interval, including reservations not yet due.
    pub fn recent_dispatches(&self) -> usize {
        self.window.lock().count(Instant::now())
    }

    /// Decides between running at once (`None`) or after the returned delay.
    fn admit(&self, now: Instant) -> Option<Duration> {
        let mut window = self.window.lock();

        // The slot estimate must not see this submission's own record.
        let available_at = window.next_available_at(now);
        let count = window.record_at(now, available_at);

        (count > self.max_dispatches).then(|| available_at.duration_since(now))
    }
}

impl Dispatcher for RateLimitedDispatcher {
    fn dispatch(&self, task: Task) {
        match self.admit(Instant::now()) {
            None => {
                tracing::trace!("Dispatching task now");
                self.executor.run_now(task);
            }
            Some(delay) => {
                tracing::trace!(?delay, "Over the rate limit, deferring task");
                self.executor.run_after(task, delay);
            }
        }
    }
}
