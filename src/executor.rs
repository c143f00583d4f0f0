//! Where admitted tasks actually run.
//!
//! Dispatchers decide *when* a task may start; an [`Executor`] decides *where*. Executors are
//! cheap to clone and can be shared by any number of dispatchers.

mod serial;

pub use serial::SerialQueue;

use crate::task::Task;

use std::{
    fmt,
    sync::{Arc, OnceLock},
    time::Duration,
};
use tokio::runtime::{Builder, Handle, Runtime};

/// A user supplied executor.
///
/// Only immediate execution has to be provided; delays are handled by the shared timer before
/// `run_now` is called.
pub trait Execute: Send + Sync + 'static {
    /// Must eventually run `task` exactly once.
    fn run_now(&self, task: Task);
}

#[derive(Clone)]
pub enum Executor {
    /// Runs the task on the calling thread before returning.
    Inline,
    /// Runs tasks one at a time, in the order they were handed over.
    Serial(SerialQueue),
    /// Runs tasks on the blocking pool of a tokio runtime, in no particular order.
    Pool(Handle),
    /// Hands tasks to a user supplied [`Execute`] implementation.
    Custom(Arc<dyn Execute>),
}

impl Executor {
    /// The process-wide runtime backing [`Executor::default`], the main queue and every timer not
    /// bound to a caller supplied runtime. Started on first use.
    pub fn shared_runtime() -> &'static Runtime {
        static RUNTIME: OnceLock<Runtime> = OnceLock::new();

        RUNTIME.get_or_init(|| {
            tracing::debug!("Starting shared dispatch runtime");
            Builder::new_multi_thread()
                .thread_name("dispatch-pool")
                .enable_all()
                .build()
                .expect("failed to start the shared dispatch runtime")
        })
    }

    pub fn shared_pool() -> Self {
        Self::Pool(Self::shared_runtime().handle().clone())
    }

    /// Runs tasks on the blocking pool of the runtime behind `handle`. Timers for delayed tasks
    /// are driven by that runtime as well, so it has to outlive the executor.
    pub fn pool(handle: Handle) -> Self {
        Self::Pool(handle)
    }

    /// A fresh serial queue of its own.
    pub fn serial() -> Self {
        Self::Serial(SerialQueue::new())
    }

    /// The process-wide serial queue, shared by every caller.
    pub fn main() -> Self {
        static MAIN: OnceLock<SerialQueue> = OnceLock::new();

        Self::Serial(MAIN.get_or_init(SerialQueue::new).clone())
    }

    pub fn custom(executor: impl Execute) -> Self {
        Self::Custom(Arc::new(executor))
    }

    pub fn run_now(&self, task: Task) {
        match self {
            Self::Inline => task.run(),
            Self::Serial(queue) => queue.push(task),
            Self::Pool(handle) => {
                let _ = handle.spawn_blocking(move || task.run_contained());
            }
            Self::Custom(executor) => executor.run_now(task),
        }
    }

    /// Runs `task` no earlier than `delay` from now. Tasks due at the same instant fire in no
    /// particular order.
    pub fn run_after(&self, task: Task, delay: Duration) {
        if delay.is_zero() {
            return self.run_now(task);
        }

        let executor = self.clone();

        self.timer_handle().spawn(async move {
            tokio::time::sleep(delay).await;

            // Inline and custom executors run on whatever thread calls them, which here is an
            // async worker shared with every timer.
            match executor {
                Self::Inline => {
                    let _ = tokio::task::spawn_blocking(move || task.run_contained());
                }
                Self::Custom(executor) => {
                    let _ = tokio::task::spawn_blocking(move || executor.run_now(task));
                }
                Self::Serial(_) | Self::Pool(_) => executor.run_now(task),
            }
        });
    }

    fn timer_handle(&self) -> &Handle {
        match self {
            Self::Pool(handle) => handle,
            _ => Self::shared_runtime().handle(),
        }
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::shared_pool()
    }
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inline => f.write_str("Inline"),
            Self::Serial(queue) => f.debug_tuple("Serial").field(queue).finish(),
            Self::Pool(_) => f.write_str("Pool"),
            Self::Custom(_) => f.write_str("Custom"),
        }
    }
}

impl<E: Execute> From<Arc<E>> for Executor {
    fn from(executor: Arc<E>) -> Self {
        Self::Custom(executor)
    }
}
