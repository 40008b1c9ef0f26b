//! Clock and random implementations.

use crate::infrastructure::ports::{ClockPort, RandomPort};
use chrono::{DateTime, Utc};

/// System clock - uses real time.
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockPort for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// System random - uses real randomness.
pub struct SystemRandom;

impl SystemRandom {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SystemRandom {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomPort for SystemRandom {
    fn pick(&self, n: usize) -> usize {
        use rand::Rng;
        rand::thread_rng().gen_range(0..n)
    }

    fn next_seed(&self) -> u64 {
        rand::random()
    }
}

/// Fixed clock for testing.
#[cfg(test)]
pub struct FixedClock(pub DateTime<Utc>);

#[cfg(test)]
impl ClockPort for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Fixed random for testing: `pick` always returns 0 and the seed is
/// constant, so schedules are reproducible.
#[cfg(test)]
pub struct FixedRandom;

#[cfg(test)]
impl RandomPort for FixedRandom {
    fn pick(&self, _n: usize) -> usize {
        0
    }

    fn next_seed(&self) -> u64 {
        42
    }
}
