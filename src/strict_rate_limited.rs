use crate::{
    dispatcher::Dispatcher, error::Error, executor::Executor, pending::PendingQueue, task::Task,
    window::DispatchWindow,
};

use parking_lot::Mutex;
use std::{
    sync::{Arc, Weak},
    time::Duration,
};
use tokio::time::Instant;

/// Never starts more than `max_dispatches` tasks within any sliding `interval`.
///
/// Tasks that cannot start at once wait in a FIFO queue. A single timer is armed for the
/// instant the next slot frees; when it fires it admits queued tasks into the freed slots and
/// re-arms itself while the queue is non-empty. Once idle, a cleanup timer clears the dispatch
/// history so nothing is retained after the last dispatch ages out.
#[derive(Debug)]
pub struct StrictRateLimitedDispatcher {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    executor: Executor,
    max_dispatches: usize,
    interval: Duration,
    state: Mutex<State>,
}

#[derive(Debug)]
struct State {
    window: DispatchWindow,
    pending: PendingQueue,
    drain_armed: bool,
    cleanup_armed: bool,
}

/// Timer work decided under the lock, carried out after releasing it.
#[derive(Debug)]
struct Timers {
    drain: Option<Duration>,
    cleanup: Option<Duration>,
}

impl StrictRateLimitedDispatcher {
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
            "Created strict rate limited dispatcher"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                executor,
                max_dispatches,
                interval: per_interval,
                state: Mutex::new(State {
                    window,
                    pending: PendingQueue::default(),
                    drain_armed: false,
                    cleanup_armed: false,
                }),
            }),
        })
    }

    pub fn max_dispatches(&self) -> usize {
        self.inner.max_dispatches
    }

    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    /// Dispatches started within the last interval.
    pub fn recent_dispatches(&self) -> usize {
        self.inner.state.lock().window.count(Instant::now())
    }

    /// Timestamps currently held, including any that have expired but not been pruned yet.
    pub fn history_len(&self) -> usize {
        self.inner.state.lock().window.len()
    }

    /// Tasks waiting for a slot.
    pub fn pending(&self) -> usize {
        self.inner.state.lock().pending.len()
    }
}

impl Dispatcher for StrictRateLimitedDispatcher {
    fn dispatch(&self, task: Task) {
        self.inner.submit(task);
    }
}

impl State {
    fn arm_drain(&mut self, now: Instant) -> Option<Duration> {
        if self.drain_armed || self.pending.is_empty() {
            return None;
        }

        self.drain_armed = true;
        Some(self.window.next_available_at(now).duration_since(now))
    }

    fn arm_cleanup(&mut self, now: Instant) -> Option<Duration> {
        if self.cleanup_armed {
            return None;
        }

        let drained_at = self.window.drained_at()?;
        self.cleanup_armed = true;
        Some(drained_at.duration_since(now))
    }

    /// Moves queued tasks into free slots, recording each start.
    fn admit_pending(&mut self, now: Instant) -> Vec<Task> {
        let mut admitted = Vec::new();

        while self.window.has_capacity(now) {
            let Some(task) = self.pending.pop() else {
                break;
            };

            self.window.record_and_count(now);
            admitted.push(task);
        }

        admitted
    }
}

impl Inner {
    fn submit(self: &Arc<Self>, task: Task) {
        let mut state = self.state.lock();
        let now = Instant::now();

        // Jumping ahead of queued tasks would break FIFO admission.
        if state.pending.is_empty() && state.window.has_capacity(now) {
            state.window.record_and_count(now);
            let timers = Timers {
                drain: None,
                cleanup: state.arm_cleanup(now),
            };
            drop(state);

            tracing::trace!("Dispatching task now");
            self.arm(timers);
            self.executor.run_now(task);
            return;
        }

        state.pending.push(task);
        let queued = state.pending.len();
        let timers = Timers {
            drain: state.arm_drain(now),
            cleanup: None,
        };
        drop(state);

        tracing::trace!(queued, "Over the rate limit, queueing task");
        self.arm(timers);
    }

    fn drain(self: &Arc<Self>) {
        let mut state = self.state.lock();
        let now = Instant::now();

        state.drain_armed = false;
        let admitted = state.admit_pending(now);
        let timers = Timers {
            drain: state.arm_drain(now),
            cleanup: state.arm_cleanup(now),
        };
        let remaining = state.pending.len();
        drop(state);

        tracing::trace!(
            admitted = admitted.len(),
            remaining,
            "Admitting queued tasks"
        );
        self.arm(timers);

        for task in admitted {
            self.executor.run_now(task);
        }
    }

    fn cleanup(self: &Arc<Self>) {
        let mut state = self.state.lock();
        let now = Instant::now();

        state.cleanup_armed = false;
        let pruned = state.window.prune(now);
        let cleanup = state.arm_cleanup(now);
        drop(state);

        tracing::debug!(pruned, rearmed = cleanup.is_some(), "Pruned dispatch history");

        if let Some(delay) = cleanup {
            self.schedule_cleanup(delay);
        }
    }

    fn arm(self: &Arc<Self>, timers: Timers) {
        if let Some(delay) = timers.drain {
            tracing::debug!(?delay, "Arming drain timer");
            // Queued work must run even if every handle to the dispatcher is dropped.
            let inner = self.clone();
            self.executor.run_after(Task::new(move || inner.drain()), delay);
        }

        if let Some(delay) = timers.cleanup {
            self.schedule_cleanup(delay);
        }
    }

    fn schedule_cleanup(self: &Arc<Self>, delay: Duration) {
        let inner: Weak<Self> = Arc::downgrade(self);
        self.executor.run_after(
            Task::new(move || {
                if let Some(inner) = inner.upgrade() {
                    inner.cleanup();
                }
            }),
            delay,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex as StdMutex;
    use tokio_test::{assert_err, assert_ok};

    fn recorder() -> Arc<StdMutex<Vec<(usize, Instant)>>> {
        Default::default()
    }

    #[test]
    fn rejects_invalid_parameters() {
        assert_eq!(
            assert_err!(StrictRateLimitedDispatcher::new(0, Duration::from_secs(1))),
            Error::ZeroMaxDispatches
        );
        assert_eq!(
            assert_err!(StrictRateLimitedDispatcher::new(3, Duration::ZERO)),
            Error::ZeroInterval
        );
    }

    #[test]
    fn queues_tasks_beyond_the_limit() {
        let dispatcher = assert_ok!(StrictRateLimitedDispatcher::with_executor(
            1,
            Duration::from_secs(60),
            Executor::Inline,
        ));
        let starts = recorder();

        for index in 0..5 {
            let starts = starts.clone();
            dispatcher.submit(move || starts.lock().unwrap().push((index, Instant::now())));
        }

        assert_eq!(starts.lock().unwrap().len(), 1);
        assert_eq!(dispatcher.pending(), 4);
        assert_eq!(dispatcher.recent_dispatches(), 1);
    }

    #[tokio::test]
    async fn admits_queued_tasks_in_order_one_slot_at_a_time() {
        let interval = Duration::from_millis(100);
        let dispatcher = assert_ok!(StrictRateLimitedDispatcher::with_executor(
            2,
            interval,
            Executor::Inline,
        ));
        let starts = recorder();

        for index in 0..6 {
            let starts = starts.clone();
            dispatcher.submit(move || starts.lock().unwrap().push((index, Instant::now())));
        }
        dispatcher.submit_with_reply(|| ()).await.unwrap();

        let starts = starts.lock().unwrap().clone();
        assert_eq!(
            starts.iter().map(|(index, _)| *index).collect::<Vec<_>>(),
            vec![0, 1, 2, 3, 4, 5]
        );
        for pair in starts.windows(3) {
            // Starts are stamped inside the task, a hair after admission was recorded.
            let spacing = pair[2].1.duration_since(pair[0].1) + Duration::from_millis(2);
            assert!(spacing >= interval, "three starts within {spacing:?}");
        }
        assert_eq!(dispatcher.pending(), 0);
    }

    #[tokio::test]
    async fn forgets_history_once_idle() {
        let interval = Duration::from_millis(100);
        let dispatcher = assert_ok!(StrictRateLimitedDispatcher::with_executor(
            2,
            interval,
            Executor::Inline,
        ));

        for _ in 0..4 {
            dispatcher.submit(|| {});
        }
        dispatcher.submit_with_reply(|| ()).await.unwrap();
        assert!(dispatcher.history_len() > 0);

        tokio::time::sleep(interval + Duration::from_millis(100)).await;

        assert_eq!(dispatcher.history_len(), 0);
        assert_eq!(dispatcher.pending(), 0);
    }

    #[tokio::test]
    async fn queued_work_survives_dropping_the_dispatcher() {
        let dispatcher = assert_ok!(StrictRateLimitedDispatcher::with_executor(
            1,
            Duration::from_millis(50),
            Executor::Inline,
        ));

        dispatcher.submit(|| {});
        let reply = dispatcher.submit_with_reply(|| "ran anyway");
        drop(dispatcher);

        assert_eq!(reply.await.unwrap(), "ran anyway");
    }
}
