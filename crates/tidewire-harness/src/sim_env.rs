//! Simulated environment: virtual clock and seeded RNG.
//!
//! Time only moves when a test calls [`SimEnv::advance`], and random bytes
//! come from a ChaCha stream seeded by the test, so connection ids and
//! timestamps are identical on every run with the same seed.

use std::{ops::Sub, sync::Arc, time::Duration};

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use parking_lot::Mutex;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tidewire_core::Environment;

/// Wall-clock origin of every simulation: 2026-01-01T00:00:00Z.
const EPOCH_SECS: i64 = 1_767_225_600;

/// Point on the virtual monotonic clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SimInstant(Duration);

impl SimInstant {
    /// Time since the simulation started.
    pub fn since_start(self) -> Duration {
        self.0
    }
}

impl Sub for SimInstant {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Duration {
        self.0.saturating_sub(rhs.0)
    }
}

struct State {
    rng: ChaCha8Rng,
    elapsed: Duration,
}

/// Deterministic [`Environment`] for tests.
///
/// Clones share the same clock and RNG stream.
#[derive(Clone)]
pub struct SimEnv {
    state: Arc<Mutex<State>>,
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::with_seed(0)
    }
}

impl SimEnv {
    /// Create an environment whose RNG is seeded with `seed`.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                rng: ChaCha8Rng::seed_from_u64(seed),
                elapsed: Duration::ZERO,
            })),
        }
    }

    /// Move the virtual clock forward.
    pub fn advance(&self, duration: Duration) {
        self.state.lock().elapsed += duration;
    }

    /// Virtual time since creation.
    pub fn elapsed(&self) -> Duration {
        self.state.lock().elapsed
    }
}

impl Environment for SimEnv {
    type Instant = SimInstant;

    fn now(&self) -> SimInstant {
        SimInstant(self.state.lock().elapsed)
    }

    fn wall_clock(&self) -> DateTime<Utc> {
        let elapsed = self.state.lock().elapsed;
        let origin = Utc.timestamp_opt(EPOCH_SECS, 0).single().unwrap_or_default();
        let offset = TimeDelta::from_std(elapsed).unwrap_or(TimeDelta::MAX);
        origin.checked_add_signed(offset).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.state.lock().rng.fill_bytes(buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_only_moves_when_advanced() {
        let env = SimEnv::with_seed(1);
        let t0 = env.now();
        assert_eq!(env.now(), t0);

        env.advance(Duration::from_millis(1500));
        assert_eq!(env.now() - t0, Duration::from_millis(1500));
        assert_eq!(env.timestamp(), "2026-01-01T00:00:01.500Z");
    }

    #[test]
    fn same_seed_same_bytes() {
        let a = SimEnv::with_seed(42);
        let b = SimEnv::with_seed(42);
        assert_eq!(a.random_u64(), b.random_u64());
        assert_eq!(a.random_u64(), b.random_u64());
    }

    #[test]
    fn clones_share_clock() {
        let env = SimEnv::default();
        let clone = env.clone();
        env.advance(Duration::from_secs(3));
        assert_eq!(clone.elapsed(), Duration::from_secs(3));
    }

    #[test]
    fn instant_subtraction_saturates() {
        let early = SimInstant(Duration::from_secs(1));
        let late = SimInstant(Duration::from_secs(2));
        assert_eq!(early - late, Duration::ZERO);
    }
}
