#![doc = include_str!("../README.md")]

mod auto_traits;
mod concurrency_limited;
mod dispatcher;
mod error;
mod executor;
mod pending;
mod rate_limited;
mod strict_rate_limited;
mod task;
mod window;

pub use auto_traits::{Job, Reply};
pub use concurrency_limited::ConcurrencyLimitedDispatcher;
pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use error::Error;
pub use executor::{Execute, Executor, SerialQueue};
pub use pending::PendingQueue;
pub use rate_limited::RateLimitedDispatcher;
pub use strict_rate_limited::StrictRateLimitedDispatcher;
pub use task::Task;
pub use window::DispatchWindow;
