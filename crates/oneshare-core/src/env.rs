//! Environment abstraction for deterministic testing.
//!
//! Decouples lifecycle logic from system resources (time, randomness). Enables
//! deterministic simulation (virtual clock, seeded RNG) and production use
//! with real system resources.

use std::time::Duration;

/// Abstract environment providing time, randomness, and async primitives.
///
/// # Safety
///
/// Implementations MUST guarantee:
///
/// - `now()` never goes backwards
/// - `random_bytes()` is unpredictable to outside observers in production
/// - Methods are infallible except in exceptional circumstances (e.g., OS
///   entropy exhaustion)
pub trait Environment: Clone + Send + Sync + 'static {
    /// The specific instant type used by this environment.
    ///
    /// Production environments use `std::time::Instant`, while simulation
    /// environments use virtual time.
    type Instant: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>;

    /// Current time (monotonic).
    fn now(&self) -> Self::Instant;

    /// Sleeps for the specified duration.
    ///
    /// Only driver code (the sweeper) sleeps; lifecycle logic never does.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fills the provided buffer with random bytes.
    ///
    /// Used for identifiers and passphrases. Envelope salts and IVs always
    /// come from the OS CSPRNG inside the crypto engine, never from here.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Seconds since the Unix epoch.
    ///
    /// Document timestamps, retention and rate-limit windows are all measured
    /// on this clock.
    fn wall_clock_secs(&self) -> u64;

    /// Generates a random `u64`.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }
}
