//! Document record and status state machine.
//!
//! ```text
//!            ┌──────── Consume ───────► Downloaded
//!            │
//!  Ready ────┼──────── Expire ────────► Expired
//!   ▲ │      │
//!   └─┘      └─ FailedAttempt(ceiling) ► MaxFailedAttempts
//! FailedAttempt
//! (below ceiling)
//! ```
//!
//! Every status change goes through [`DocumentStatus::apply`]. All states but
//! `Ready` are terminal: nothing leaves them, and the failed-attempt counter
//! freezes once one is reached.

use serde::{Deserialize, Serialize};

use crate::error::TransitionError;

/// Lifecycle status of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    /// Ciphertext stored, awaiting retrieval
    Ready,
    /// Decrypted once; ciphertext destroyed
    Downloaded,
    /// Not retrieved within the retention window; ciphertext destroyed
    Expired,
    /// Too many wrong passphrases; ciphertext destroyed
    MaxFailedAttempts,
}

/// Event that may change a document's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// A decryption attempt failed
    FailedAttempt {
        /// Whether this failure brings the counter to the ceiling
        reaches_ceiling: bool,
    },
    /// Decryption succeeded
    Consume,
    /// Retention window elapsed
    Expire,
}

impl DocumentStatus {
    /// Every status, for exhaustive checks.
    pub const ALL: [Self; 4] =
        [Self::Ready, Self::Downloaded, Self::Expired, Self::MaxFailedAttempts];

    /// Whether the ciphertext is gone for good.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Ready)
    }

    /// The single source of truth for legal status changes.
    ///
    /// # Errors
    ///
    /// - `TransitionError::Terminal` for any transition out of a terminal
    ///   status
    pub fn apply(self, transition: Transition) -> Result<Self, TransitionError> {
        match (self, transition) {
            (Self::Ready, Transition::FailedAttempt { reaches_ceiling: false }) => Ok(Self::Ready),
            (Self::Ready, Transition::FailedAttempt { reaches_ceiling: true }) => {
                Ok(Self::MaxFailedAttempts)
            },
            (Self::Ready, Transition::Consume) => Ok(Self::Downloaded),
            (Self::Ready, Transition::Expire) => Ok(Self::Expired),
            (status, transition) => Err(TransitionError::Terminal { status, transition }),
        }
    }

    /// Stable lowercase name, matching the serialized form.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Downloaded => "downloaded",
            Self::Expired => "expired",
            Self::MaxFailedAttempts => "max_failed_attempts",
        }
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of recording a failed decryption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Document still `Ready`
    Retry {
        /// Attempts left before lock-out
        remaining: u32,
    },
    /// Ceiling reached; document is now `MaxFailedAttempts`
    Locked,
}

/// Persisted metadata for one shared secret.
///
/// The passphrase is never part of this record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Unguessable primary key, also the blob key
    pub id: String,
    /// Original file name
    pub filename: String,
    /// MIME type reported by the uploader
    pub content_type: String,
    /// Plaintext size in bytes. Informational only.
    pub plaintext_size: u64,
    /// Current status
    pub status: DocumentStatus,
    /// Failed decryption attempts so far
    pub failed_attempts: u32,
    /// Creation time (Unix seconds)
    pub uploaded_at: u64,
    /// Successful retrieval time (Unix seconds)
    pub downloaded_at: Option<u64>,
    /// Last mutation time (Unix seconds)
    pub updated_at: Option<u64>,
    /// Salted hash of the uploader's network identity. Never shown to
    /// recipients.
    pub requester_fingerprint: String,
}

impl Document {
    /// A fresh `Ready` document with no failed attempts.
    pub fn new(
        id: String,
        filename: String,
        content_type: String,
        plaintext_size: u64,
        requester_fingerprint: String,
        uploaded_at: u64,
    ) -> Self {
        Self {
            id,
            filename,
            content_type,
            plaintext_size,
            status: DocumentStatus::Ready,
            failed_attempts: 0,
            uploaded_at,
            downloaded_at: None,
            updated_at: None,
            requester_fingerprint,
        }
    }

    /// Count one failed decryption, locking the document at `max_attempts`.
    pub fn record_failed_attempt(
        &mut self,
        max_attempts: u32,
        now: u64,
    ) -> Result<AttemptOutcome, TransitionError> {
        let attempts = self.failed_attempts.saturating_add(1);
        let reaches_ceiling = attempts >= max_attempts;
        self.status = self.status.apply(Transition::FailedAttempt { reaches_ceiling })?;
        self.failed_attempts = attempts;
        self.updated_at = Some(now);

        if reaches_ceiling {
            Ok(AttemptOutcome::Locked)
        } else {
            Ok(AttemptOutcome::Retry { remaining: max_attempts - attempts })
        }
    }

    /// Mark the document consumed.
    pub fn mark_downloaded(&mut self, now: u64) -> Result<(), TransitionError> {
        self.status = self.status.apply(Transition::Consume)?;
        self.downloaded_at = Some(now);
        self.updated_at = Some(now);
        Ok(())
    }

    /// Mark the document expired.
    pub fn mark_expired(&mut self, now: u64) -> Result<(), TransitionError> {
        self.status = self.status.apply(Transition::Expire)?;
        self.updated_at = Some(now);
        Ok(())
    }

    /// Whether the sweep should expire this document at `now`.
    ///
    /// Only `Ready` documents uploaded strictly before `now - retention_secs`
    /// qualify.
    pub fn is_stale(&self, now: u64, retention_secs: u64) -> bool {
        self.status == DocumentStatus::Ready && self.uploaded_at < now.saturating_sub(retention_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready_document() -> Document {
        Document::new(
            "doc_aaaaaaaaaaaaaaaaaaaaaaaaa".to_string(),
            "report.pdf".to_string(),
            "application/pdf".to_string(),
            1024,
            "fingerprint".to_string(),
            1_000,
        )
    }

    const TRANSITIONS: [Transition; 4] = [
        Transition::FailedAttempt { reaches_ceiling: false },
        Transition::FailedAttempt { reaches_ceiling: true },
        Transition::Consume,
        Transition::Expire,
    ];

    #[test]
    fn transition_table_is_exhaustive() {
        for status in DocumentStatus::ALL {
            for transition in TRANSITIONS {
                let result = status.apply(transition);
                let expected = match (status, transition) {
                    (DocumentStatus::Ready, Transition::FailedAttempt { reaches_ceiling }) => {
                        Ok(if reaches_ceiling {
                            DocumentStatus::MaxFailedAttempts
                        } else {
                            DocumentStatus::Ready
                        })
                    },
                    (DocumentStatus::Ready, Transition::Consume) => Ok(DocumentStatus::Downloaded),
                    (DocumentStatus::Ready, Transition::Expire) => Ok(DocumentStatus::Expired),
                    _ => Err(TransitionError::Terminal { status, transition }),
                };
                assert_eq!(result, expected, "{status:?} + {transition:?}");
            }
        }
    }

    #[test]
    fn only_ready_is_non_terminal() {
        for status in DocumentStatus::ALL {
            assert_eq!(status.is_terminal(), status != DocumentStatus::Ready);
        }
    }

    #[test]
    fn terminal_states_reject_everything() {
        for status in DocumentStatus::ALL.into_iter().filter(|s| s.is_terminal()) {
            for transition in TRANSITIONS {
                assert!(status.apply(transition).is_err());
            }
        }
    }

    #[test]
    fn new_document_is_ready() {
        let doc = ready_document();
        assert_eq!(doc.status, DocumentStatus::Ready);
        assert_eq!(doc.failed_attempts, 0);
        assert_eq!(doc.downloaded_at, None);
        assert_eq!(doc.updated_at, None);
    }

    #[test]
    fn failed_attempts_lock_at_ceiling() {
        let mut doc = ready_document();

        assert_eq!(doc.record_failed_attempt(3, 10), Ok(AttemptOutcome::Retry { remaining: 2 }));
        assert_eq!(doc.record_failed_attempt(3, 11), Ok(AttemptOutcome::Retry { remaining: 1 }));
        assert_eq!(doc.record_failed_attempt(3, 12), Ok(AttemptOutcome::Locked));

        assert_eq!(doc.status, DocumentStatus::MaxFailedAttempts);
        assert_eq!(doc.failed_attempts, 3);
        assert_eq!(doc.updated_at, Some(12));
    }

    #[test]
    fn failed_attempt_after_terminal_does_not_count() {
        let mut doc = ready_document();
        doc.mark_downloaded(50).unwrap();

        assert!(doc.record_failed_attempt(3, 60).is_err());
        assert_eq!(doc.failed_attempts, 0);
        assert_eq!(doc.updated_at, Some(50));
    }

    #[test]
    fn mark_downloaded_sets_timestamps() {
        let mut doc = ready_document();
        doc.mark_downloaded(2_000).unwrap();

        assert_eq!(doc.status, DocumentStatus::Downloaded);
        assert_eq!(doc.downloaded_at, Some(2_000));
        assert_eq!(doc.updated_at, Some(2_000));
    }

    #[test]
    fn cannot_download_twice() {
        let mut doc = ready_document();
        doc.mark_downloaded(2_000).unwrap();

        let err = doc.mark_downloaded(3_000).unwrap_err();
        assert_eq!(
            err,
            TransitionError::Terminal {
                status: DocumentStatus::Downloaded,
                transition: Transition::Consume
            }
        );
        assert_eq!(doc.downloaded_at, Some(2_000));
    }

    #[test]
    fn expired_document_cannot_be_consumed() {
        let mut doc = ready_document();
        doc.mark_expired(5_000).unwrap();

        assert!(doc.mark_downloaded(5_001).is_err());
        assert_eq!(doc.status, DocumentStatus::Expired);
        assert_eq!(doc.downloaded_at, None);
    }

    #[test]
    fn staleness_is_strict() {
        let doc = ready_document(); // uploaded_at = 1_000

        assert!(!doc.is_stale(1_100, 100));
        assert!(doc.is_stale(1_101, 100));
        assert!(!doc.is_stale(0, 100));
    }

    #[test]
    fn terminal_documents_are_never_stale() {
        let mut doc = ready_document();
        doc.mark_downloaded(1_001).unwrap();
        assert!(!doc.is_stale(u64::MAX, 1));
    }

    #[test]
    fn status_display_matches_serde_names() {
        assert_eq!(DocumentStatus::MaxFailedAttempts.to_string(), "max_failed_attempts");
        assert_eq!(DocumentStatus::Ready.to_string(), "ready");
    }
}
