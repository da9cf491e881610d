//! Production Environment implementation using system time and RNG.
//!
//! `SystemEnv` reads the real clocks and the OS CSPRNG. Document ids and
//! passphrases drawn from it are unpredictable; nothing is reproducible.

use std::time::Duration;

use oneshare_core::env::Environment;

/// Production environment using system time and cryptographic RNG.
///
/// # Panics
///
/// Panics if the OS RNG fails. A server that cannot draw passphrases must not
/// keep accepting uploads.
#[derive(Clone, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = std::time::Instant;

    #[allow(clippy::disallowed_methods)]
    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).expect("invariant: OS RNG failure is unrecoverable");
    }

    #[allow(clippy::disallowed_methods)]
    #[allow(clippy::expect_used)]
    fn wall_clock_secs(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("invariant: system clock is after Unix epoch (1970-01-01)")
            .as_secs()
    }
}
