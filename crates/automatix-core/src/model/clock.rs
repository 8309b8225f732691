// automatix-core/src/model/clock.rs
// ============================================================================
// Module: Automatix Clock
// Description: Injectable wall-clock access for deterministic tests.
// Purpose: Let the runtime and retry scheduler read time without binding
//          tests to real sleeps.
// Dependencies: time
// ============================================================================

//! ## Overview
//! The runtime never reads `SystemTime::now()` directly; every timestamp
//! flows through a [`Clock`]. Production wiring uses [`SystemClock`]; tests
//! can supply a fixed or stepped clock to make retry-backoff and
//! timestamp-tolerance tests deterministic.

use time::OffsetDateTime;

/// Supplies the current time to components that need it.
///
/// Implementors must be cheap to call and safe to share across threads.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> OffsetDateTime;

    /// Returns the current time as unix milliseconds.
    fn now_unix_millis(&self) -> i64 {
        (self.now().unix_timestamp_nanos() / 1_000_000) as i64
    }
}

/// A [`Clock`] backed by the operating system's wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

#[cfg(test)]
pub use test_support::FixedClock;

#[cfg(test)]
mod test_support {
    use std::sync::atomic::AtomicI64;
    use std::sync::atomic::Ordering;

    use time::OffsetDateTime;

    use super::Clock;

    /// A [`Clock`] that returns a fixed instant, advanceable for tests that
    /// need to simulate the passage of time without sleeping.
    #[derive(Debug)]
    pub struct FixedClock {
        millis: AtomicI64,
    }

    impl FixedClock {
        /// Creates a clock fixed at the given unix-millis instant.
        #[must_use]
        pub fn new(unix_millis: i64) -> Self {
            Self { millis: AtomicI64::new(unix_millis) }
        }

        /// Advances the clock by the given number of milliseconds.
        pub fn advance_millis(&self, delta: i64) {
            self.millis.fetch_add(delta, Ordering::SeqCst);
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> OffsetDateTime {
            let millis = self.millis.load(Ordering::SeqCst);
            OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
                .unwrap_or(OffsetDateTime::UNIX_EPOCH)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_advances_deterministically() {
        let clock = FixedClock::new(1_000);
        assert_eq!(clock.now_unix_millis(), 1_000);
        clock.advance_millis(500);
        assert_eq!(clock.now_unix_millis(), 1_500);
    }
}
