use crate::error::{Error, validate_rate};

use std::{collections::VecDeque, time::Duration};
use tokio::time::Instant;

/// Sliding record of recent dispatch times.
///
/// Timestamps are appended in chronological order and may lie in the future when they reserve a
/// deferred dispatch. An entry recorded at `t` is live while `now < t + interval` and is dropped
/// lazily by whichever operation next observes it expired.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchWindow {
    max_dispatches: usize,
    interval: Duration,
    dispatches: VecDeque<Instant>,
}

impl DispatchWindow {
    pub fn new(max_dispatches: usize, interval: Duration) -> Result<Self, Error> {
        validate_rate(max_dispatches, interval)?;

        Ok(Self {
            max_dispatches,
            interval,
            dispatches: VecDeque::with_capacity(max_dispatches),
        })
    }

    pub fn max_dispatches(&self) -> usize {
        self.max_dispatches
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Drops every entry that has aged out by `now`, returning how many went.
    pub fn prune(&mut self, now: Instant) -> usize {
        let expired = self
            .dispatches
            .partition_point(|at| *at + self.interval <= now);
        self.dispatches.drain(..expired);
        expired
    }

    /// Records a dispatch at `now` and returns the live count including it.
    pub fn record_and_count(&mut self, now: Instant) -> usize {
        self.record_at(now, now)
    }

    /// Records a dispatch reserved for `at`, which must not precede any entry already held, and
    /// returns the live count as of `now` including it.
    pub fn record_at(&mut self, now: Instant, at: Instant) -> usize {
        self.prune(now);
        debug_assert!(self.dispatches.back().is_none_or(|last| *last <= at));
        self.dispatches.push_back(at);
        self.dispatches.len()
    }

    /// Live dispatches as of `now`.
    pub fn count(&mut self, now: Instant) -> usize {
        self.prune(now);
        self.dispatches.len()
    }

    pub fn has_capacity(&mut self, now: Instant) -> bool {
        self.count(now) < self.max_dispatches
    }

    /// `now` if a slot is free, otherwise the instant a new dispatch can start without putting
    /// more than `max_dispatches` entries inside one interval. With exactly `max_dispatches`
    /// live entries that is when the oldest one ages out.
    pub fn next_available_at(&mut self, now: Instant) -> Instant {
        self.prune(now);

        let len = self.dispatches.len();
        if len < self.max_dispatches {
            return now;
        }

        self.dispatches[len - self.max_dispatches] + self.interval
    }

    /// The instant at which every entry currently held will have aged out.
    pub fn drained_at(&self) -> Option<Instant> {
        self.dispatches.back().map(|newest| *newest + self.interval)
    }

    /// Entries currently stored, live or not yet pruned.
    pub fn len(&self) -> usize {
        self.dispatches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dispatches.is_empty()
    }
}
