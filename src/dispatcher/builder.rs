use crate::{
    concurrency_limited::ConcurrencyLimitedDispatcher, error::Error, executor::Executor,
    rate_limited::RateLimitedDispatcher, strict_rate_limited::StrictRateLimitedDispatcher,
};

use std::time::Duration;

/// Construction-time configuration shared by every dispatcher flavor.
#[derive(Debug, Clone, Default)]
pub struct DispatcherBuilder {
    pub(crate) executor: Executor,
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_executor(mut self, executor: Executor) -> Self {
        self.executor = executor;
        self
    }

    pub fn rate_limited(
        &self,
        max_dispatches: usize,
        per_interval: Duration,
    ) -> Result<RateLimitedDispatcher, Error> {
        RateLimitedDispatcher::with_executor(max_dispatches, per_interval, self.executor.clone())
    }

    pub fn strict_rate_limited(
        &self,
        max_dispatches: usize,
        per_interval: Duration,
    ) -> Result<StrictRateLimitedDispatcher, Error> {
        StrictRateLimitedDispatcher::with_executor(
            max_dispatches,
            per_interval,
            self.executor.clone(),
        )
    }

    pub fn concurrency_limited(&self, limit: usize) -> Result<ConcurrencyLimitedDispatcher, Error> {
        ConcurrencyLimitedDispatcher::with_executor(limit, self.executor.clone())
    }
}
