use crate::auto_traits::Job;

use std::{
    fmt,
    panic::{self, AssertUnwindSafe},
};

/// A unit of deferred work.
///
/// Owned by a dispatcher from submission until an executor starts it. Running consumes the
/// task, so it can never be invoked twice.
pub struct Task {
    job: Box<dyn FnOnce() + Send + 'static>,
}

impl Task {
    pub fn new(job: impl Job) -> Self {
        Self { job: Box::new(job) }
    }

    pub fn run(self) {
        (self.job)()
    }

    /// Runs the task, logging a panic instead of unwinding into the executor's worker.
    pub(crate) fn run_contained(self) {
        if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(|| self.run())) {
            let message = panic
                .downcast_ref::<&str>()
                .copied()
                .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
                .unwrap_or("<non-string panic payload>");

            tracing::error!("Task panicked: {message}");
        }
    }
}

impl<J: Job> From<J> for Task {
    fn from(job: J) -> Self {
        Self::new(job)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").finish_non_exhaustive()
    }
}
