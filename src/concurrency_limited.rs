use crate::{
    dispatcher::Dispatcher, error::Error, executor::Executor, pending::PendingQueue, task::Task,
};

use parking_lot::Mutex;
use std::{cell::RefCell, collections::VecDeque, sync::Arc, thread};

/// Keeps at most `limit` tasks executing at once.
///
/// Admission is purely count based: a task starts when a slot is free, otherwise it waits in a
/// FIFO queue until a running task finishes and hands its slot over.
#[derive(Debug)]
pub struct ConcurrencyLimitedDispatcher {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    executor: Executor,
    limit: usize,
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    in_flight: usize,
    pending: PendingQueue,
}

/// Held by a running task. Dropping it, on completion or during a panic, frees the slot.
struct Slot {
    inner: Arc<Inner>,
}

impl ConcurrencyLimitedDispatcher {
    pub fn new(limit: usize) -> Result<Self, Error> {
        Self::with_executor(limit, Executor::default())
    }

    pub fn with_executor(limit: usize, executor: Executor) -> Result<Self, Error> {
        if limit == 0 {
            return Err(Error::ZeroLimit);
        }

        tracing::debug!(limit, ?executor, "Created concurrency limited dispatcher");

        Ok(Self {
            inner: Arc::new(Inner {
                executor,
                limit,
                state: Mutex::new(State::default()),
            }),
        })
    }

    pub fn limit(&self) -> usize {
        self.inner.limit
    }

    pub fn in_flight(&self) -> usize {
        self.inner.state.lock().in_flight
    }

    pub fn pending(&self) -> usize {
        self.inner.state.lock().pending.len()
    }
}

impl Dispatcher for ConcurrencyLimitedDispatcher {
    fn dispatch(&self, task: Task) {
        self.inner.submit(task);
    }
}

impl Inner {
    fn submit(self: &Arc<Self>, task: Task) {
        let mut state = self.state.lock();

        if state.in_flight < self.limit {
            state.in_flight += 1;
            let in_flight = state.in_flight;
            // Tasks left queued behind a panicking inline task go first.
            let task = match state.pending.pop() {
                Some(head) => {
                    state.pending.push(task);
                    head
                }
                None => task,
            };
            drop(state);

            tracing::trace!(in_flight, "Dispatching task now");
            self.start(task);
        } else {
            state.pending.push(task);
            tracing::trace!(queued = state.pending.len(), "At capacity, queueing task");
        }
    }

    /// Hands a task that already owns a slot to the executor.
    fn start(self: &Arc<Self>, task: Task) {
        let slot = Slot {
            inner: self.clone(),
        };

        self.executor.run_now(Task::new(move || {
            task.run();
            drop(slot);
        }));
    }

    fn release(self: &Arc<Self>) {
        let mut state = self.state.lock();
        debug_assert!(state.in_flight > 0 && state.in_flight <= self.limit);

        // Starting an inline task while unwinding risks a second panic; the queue waits for the
        // next submission instead.
        let unwinding = thread::panicking() && matches!(self.executor, Executor::Inline);

        // The slot passes straight to the next queued task, if any.
        let next = match state.pending.pop() {
            Some(next) if !unwinding => next,
            Some(next) => {
                state.pending.push_front(next);
                state.in_flight -= 1;
                return;
            }
            None => {
                state.in_flight -= 1;
                return;
            }
        };
        let queued = state.pending.len();
        drop(state);

        tracing::trace!(queued, "Slot freed, starting queued task");
        self.hand_off(next);
    }

    /// Starts `next`, unless a hand-off loop already runs further up this thread's stack, in
    /// which case it is left to that loop. Inline tasks would otherwise nest one frame deeper
    /// per queued task.
    fn hand_off(self: &Arc<Self>, next: Task) {
        let next = HANDOFFS.with_borrow_mut(|handoffs| match handoffs {
            Some(handoffs) => {
                handoffs.push_back((self.clone(), next));
                None
            }
            None => {
                *handoffs = Some(VecDeque::new());
                Some(next)
            }
        });
        let Some(next) = next else {
            return;
        };

        let _running = HandoffLoop;
        self.start(next);

        while let Some((inner, task)) =
            HANDOFFS.with_borrow_mut(|handoffs| handoffs.as_mut().and_then(VecDeque::pop_front))
        {
            inner.start(task);
        }
    }

    /// Gives back a slot whose task never started.
    fn requeue(&self, task: Task) {
        let mut state = self.state.lock();
        state.pending.push_front(task);
        state.in_flight -= 1;
    }
}

type Handoffs = VecDeque<(Arc<Inner>, Task)>;

thread_local! {
    static HANDOFFS: RefCell<Option<Handoffs>> = const { RefCell::new(None) };
}

/// Marks the outermost hand-off loop on this thread. If a task panics out of the loop, work
/// still waiting in it goes back to the front of its dispatcher's queue.
struct HandoffLoop;

impl Drop for HandoffLoop {
    fn drop(&mut self) {
        let leftovers = HANDOFFS
            .with_borrow_mut(Option::take)
            .unwrap_or_default();

        for (inner, task) in leftovers.into_iter().rev() {
            inner.requeue(task);
        }
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.inner.release();
    }
}
