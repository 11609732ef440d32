//! Environment abstraction for deterministic testing.
//!
//! Decouples hub logic from system resources (time, randomness). Production
//! uses the real clock and OS entropy; the simulation harness uses a virtual
//! clock and a seeded RNG so every test run is reproducible.

use std::{fmt::Debug, ops::Sub, time::Duration};

use chrono::{DateTime, Utc};
use tidewire_proto::format_timestamp;

/// Abstract environment providing time and randomness.
///
/// # Invariants
///
/// Implementations MUST guarantee:
///
/// - `now()` never goes backwards
/// - `wall_clock()` never goes backwards within one environment
/// - Given the same seed, simulated environments produce the same sequence of
///   random bytes
pub trait Environment: Clone + Send + Sync + 'static {
    /// Monotonic instant type.
    ///
    /// Production uses `std::time::Instant`; simulations may advance it
    /// virtually.
    type Instant: Copy + Ord + Debug + Send + Sync + Sub<Output = Duration>;

    /// Current monotonic time, used for idle tracking.
    fn now(&self) -> Self::Instant;

    /// Current wall-clock time, used for event timestamps.
    fn wall_clock(&self) -> DateTime<Utc>;

    /// Fills the provided buffer with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`.
    ///
    /// Convenience for connection ids.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }

    /// Current wall-clock time formatted for the wire.
    fn timestamp(&self) -> String {
        format_timestamp(self.wall_clock())
    }
}
