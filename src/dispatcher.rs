//! The capability handed to callers: submit work, let the policy decide when it runs.

mod builder;

pub use builder::DispatcherBuilder;

use crate::{
    auto_traits::{Job, Reply},
    task::Task,
};

use std::sync::Arc;
use tokio::sync::oneshot;

/// An admission policy in front of an executor.
///
/// Every dispatched task runs exactly once, eventually. Dispatching never waits for a slot, and
/// nothing about the task's outcome flows back through the dispatcher; a task has to deal with
/// its own failures.
pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, task: Task);

    fn submit(&self, job: impl Job)
    where
        Self: Sized,
    {
        self.dispatch(Task::new(job));
    }

    /// Runs `job` under this dispatcher's policy and sends its return value to the receiver.
    /// Dropping the receiver does not stop the job.
    fn submit_with_reply<T: Reply>(
        &self,
        job: impl FnOnce() -> T + Send + 'static,
    ) -> oneshot::Receiver<T>
    where
        Self: Sized,
    {
        let (send, recv) = oneshot::channel();

        self.dispatch(Task::new(move || {
            let _ = send.send(job());
        }));

        recv
    }
}

impl<D: Dispatcher + ?Sized> Dispatcher for Arc<D> {
    fn dispatch(&self, task: Task) {
        (**self).dispatch(task);
    }
}

impl<D: Dispatcher + ?Sized> Dispatcher for Box<D> {
    fn dispatch(&self, task: Task) {
        (**self).dispatch(task);
    }
}
