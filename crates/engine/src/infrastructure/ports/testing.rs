//! Testability ports for injecting time and randomness.

use chrono::{DateTime, Utc};

#[cfg_attr(test, mockall::automock)]
pub trait ClockPort: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[cfg_attr(test, mockall::automock)]
pub trait RandomPort: Send + Sync {
    /// Uniform index in `0..n`. `n` must be nonzero.
    fn pick(&self, n: usize) -> usize;

    /// Fresh seed for a per-session RNG.
    fn next_seed(&self) -> u64;
}
