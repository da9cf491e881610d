//! Oneshare core.
//!
//! Storage-agnostic building blocks for the one-time document lifecycle:
//!
//! - [`env`]: time and randomness behind a trait, so lifecycle logic runs
//!   identically under a real clock and a simulated one
//! - [`ids`]: document identifiers and one-time passphrases
//! - [`document`]: the persisted record and its closed status state machine
//!
//! Nothing here performs I/O.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod document;
pub mod env;
pub mod error;
pub mod ids;

pub use document::{AttemptOutcome, Document, DocumentStatus, Transition};
pub use env::Environment;
pub use error::TransitionError;
