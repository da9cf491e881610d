//! Simulated environment with a manual clock and seeded RNG.

#![allow(clippy::disallowed_types, reason = "Locking simple clock and RNG state")]

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use oneshare_core::env::Environment;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Wall-clock start for a fresh `SimEnv` (2024-01-01T00:00:00Z).
pub const SIM_EPOCH_SECS: u64 = 1_704_067_200;

/// Deterministic environment for tests.
///
/// Time only moves when [`SimEnv::advance`] is called (or when something
/// sleeps); randomness comes from a ChaCha8 stream seeded at construction.
/// Clones share the same clock and RNG.
#[derive(Clone)]
pub struct SimEnv {
    inner: Arc<Mutex<SimState>>,
}

struct SimState {
    /// Monotonic time since construction
    elapsed: Duration,
    /// Wall clock at construction
    start_secs: u64,
    rng: ChaCha8Rng,
}

impl SimEnv {
    /// Environment seeded with 0.
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Environment with an explicit RNG seed.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SimState {
                elapsed: Duration::ZERO,
                start_secs: SIM_EPOCH_SECS,
                rng: ChaCha8Rng::seed_from_u64(seed),
            })),
        }
    }

    /// Move both clocks forward.
    pub fn advance(&self, duration: Duration) {
        self.lock().elapsed += duration;
    }

    /// Time elapsed since construction.
    pub fn elapsed(&self) -> Duration {
        self.lock().elapsed
    }

    #[allow(clippy::expect_used)]
    fn lock(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.inner.lock().expect("SimEnv mutex poisoned")
    }
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment for SimEnv {
    type Instant = Duration;

    fn now(&self) -> Duration {
        self.elapsed()
    }

    /// Advances virtual time immediately instead of waiting.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        self.advance(duration);
        std::future::ready(())
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.lock().rng.fill_bytes(buffer);
    }

    fn wall_clock_secs(&self) -> u64 {
        let state = self.lock();
        state.start_secs + state.elapsed.as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_only_moves_on_advance() {
        let env = SimEnv::new();
        let t1 = env.now();
        let t2 = env.now();
        assert_eq!(t1, t2);

        env.advance(Duration::from_secs(90));
        assert_eq!(env.now() - t1, Duration::from_secs(90));
        assert_eq!(env.wall_clock_secs(), SIM_EPOCH_SECS + 90);
    }

    #[test]
    fn clones_share_state() {
        let env = SimEnv::new();
        let clone = env.clone();

        clone.advance(Duration::from_secs(5));
        assert_eq!(env.wall_clock_secs(), SIM_EPOCH_SECS + 5);
    }

    #[test]
    fn same_seed_same_bytes() {
        let a = SimEnv::with_seed(9);
        let b = SimEnv::with_seed(9);

        let mut bytes_a = [0u8; 32];
        let mut bytes_b = [0u8; 32];
        a.random_bytes(&mut bytes_a);
        b.random_bytes(&mut bytes_b);

        assert_eq!(bytes_a, bytes_b);
    }

    #[test]
    fn sleep_advances_virtual_time() {
        let env = SimEnv::new();
        let fut = env.sleep(Duration::from_secs(60));
        drop(fut);
        assert_eq!(env.elapsed(), Duration::from_secs(60));
    }
}
