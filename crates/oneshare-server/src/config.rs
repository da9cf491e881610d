//! Lifecycle configuration.

use std::time::Duration;

/// Limits and windows enforced by the lifecycle engine.
///
/// Immutable after the engine is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleConfig {
    /// Largest accepted plaintext, in bytes
    pub max_upload_bytes: u64,
    /// Uploads allowed per fingerprint within `rate_limit_window`
    pub uploads_per_window: u64,
    /// Trailing window for the upload rate limit
    pub rate_limit_window: Duration,
    /// Age after which an undelivered document expires
    pub retention: Duration,
    /// Wrong passphrases tolerated before the document locks
    pub max_failed_attempts: u32,
    /// Period of the background expiry sweep
    pub sweep_interval: Duration,
}

impl LifecycleConfig {
    /// Default upload ceiling (100 MiB)
    pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 100 * 1024 * 1024;
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: Self::DEFAULT_MAX_UPLOAD_BYTES,
            uploads_per_window: 5,
            rate_limit_window: Duration::from_secs(60 * 60),
            retention: Duration::from_secs(24 * 60 * 60),
            max_failed_attempts: 3,
            sweep_interval: Duration::from_secs(60),
        }
    }
}
