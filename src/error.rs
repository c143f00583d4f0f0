/// Errors raised while constructing a dispatcher.
///
/// Parameters are validated once, up front. Nothing is clamped to a "sensible" value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// `max_dispatches` was zero.
    #[error("max dispatches per interval must be at least 1")]
    ZeroMaxDispatches,
    /// The sliding window had zero width.
    #[error("dispatch interval must be longer than zero")]
    ZeroInterval,
    /// The concurrency limit was zero.
    #[error("concurrency limit must be at least 1")]
    ZeroLimit,
}

pub(crate) fn validate_rate(
    max_dispatches: usize,
    interval: std::time::Duration,
) -> Result<(), Error> {
    if max_dispatches == 0 {
        return Err(Error::ZeroMaxDispatches);
    }
    if interval.is_zero() {
        return Err(Error::ZeroInterval);
    }
    Ok(())
}
