//! Time abstractions for testable timing operations.
//!
//! The worker and the domain models never read the wall clock directly;
//! they go through [`Clock`] so tests can pin and advance time
//! deterministically. The production surface is [`RealClock`] only; the
//! manually-advanced `TestClock` is compiled solely for tests and for
//! downstream test suites that opt into the `test-util` feature.

use std::{future::Future, pin::Pin, time::Duration};

#[cfg(any(test, feature = "test-util"))]
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

/// Clock abstraction for time operations.
///
/// Production code uses [`RealClock`]; tests inject [`TestClock`] to control
/// retry timing and expiry without sleeping.
pub trait Clock: Send + Sync {
    /// Returns the current UTC timestamp.
    fn now(&self) -> DateTime<Utc>;

    /// Sleeps for the specified duration.
    ///
    /// In production this maps to `tokio::time::sleep`; test clocks advance
    /// virtual time and return immediately.
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Real clock implementation using system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealClock;

impl RealClock {
    /// Creates a new real clock instance.
    pub fn new() -> Self {
        Self
    }
}

impl Clock for RealClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Manually controlled clock for deterministic tests.
///
/// Starts at the wall-clock instant of construction (or a pinned instant via
/// [`TestClock::at`]) and only moves when advanced. `sleep` advances virtual
/// time by the requested duration and resolves immediately, so poll loops
/// never block a test.
///
/// Test-only: available to other crates through the `test-util` feature.
#[cfg(any(test, feature = "test-util"))]
#[derive(Debug, Clone)]
pub struct TestClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

#[cfg(any(test, feature = "test-util"))]
impl TestClock {
    /// Creates a test clock starting at the current wall-clock time.
    pub fn new() -> Self {
        Self::at(Utc::now())
    }

    /// Creates a test clock pinned to the given instant.
    pub fn at(now: DateTime<Utc>) -> Self {
        Self { now: Arc::new(Mutex::new(now)) }
    }

    /// Advances the clock by the given duration.
    pub fn advance(&self, duration: Duration) {
        let delta = chrono::Duration::from_std(duration).expect("advance duration out of range");
        let mut now = self.now.lock().expect("clock lock poisoned");
        *now += delta;
    }

    /// Moves the clock to the given instant.
    pub fn set(&self, instant: DateTime<Utc>) {
        let mut now = self.now.lock().expect("clock lock poisoned");
        *now = instant;
    }
}

#[cfg(any(test, feature = "test-util"))]
impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "test-util"))]
impl Clock for TestClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock lock poisoned")
    }

    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        self.advance(duration);
        Box::pin(std::future::ready(()))
    }
}
