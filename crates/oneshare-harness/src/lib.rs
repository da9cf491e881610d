//! Deterministic simulation harness for oneshare testing.
//!
//! Provides [`SimEnv`], an [`Environment`](oneshare_core::Environment) with a
//! manually advanced clock and seeded RNG, so rate-limit windows and retention
//! periods can be crossed instantly and identifier streams are reproducible.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod sim_env;

pub use sim_env::{SIM_EPOCH_SECS, SimEnv};
