//! Error types for the oneshare core.

use thiserror::Error;

use crate::document::{DocumentStatus, Transition};

/// Illegal status transition.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionError {
    /// The document is already in a terminal status
    #[error("invalid transition: cannot apply {transition:?} to terminal status {status}")]
    Terminal {
        /// Status the document was in
        status: DocumentStatus,
        /// Transition that was attempted
        transition: Transition,
    },
}
