//! Submission validator
//!
//! Pure check run before any I/O. An item is incomplete when it was never
//! touched (OK without the verified flag). Any incompleteness rejects the
//! submission; the count only decides between the blocking and the warning
//! wording.

use crate::model::{OverallStatus, SubmissionSnapshot};
use crate::{Error, Result};

/// Thresholds and messages used by [`validate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationPolicy {
    /// Incomplete count at or above which the blocking message is used
    pub block_threshold: usize,
    pub error_text: String,
    /// `{items}` is replaced by the incomplete item names
    pub warning_text: String,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            block_threshold: 3,
            error_text: "Toute la liste doit être vérifiée.".to_string(),
            warning_text: "Les éléments suivants ne sont pas vérifiés :\n{items}".to_string(),
        }
    }
}

/// Snapshot that passed validation
///
/// Only [`validate`] constructs one, so the recorder cannot be handed an
/// unchecked submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSubmission {
    snapshot: SubmissionSnapshot,
}

impl ValidatedSubmission {
    pub fn snapshot(&self) -> &SubmissionSnapshot {
        &self.snapshot
    }

    pub fn overall_status(&self) -> OverallStatus {
        self.snapshot.overall_status()
    }

    pub fn into_snapshot(self) -> SubmissionSnapshot {
        self.snapshot
    }
}

/// Decide whether a snapshot may be submitted
pub fn validate(snapshot: SubmissionSnapshot, policy: &ValidationPolicy) -> Result<ValidatedSubmission> {
    let incomplete = snapshot.incomplete_names();

    if incomplete.is_empty() {
        return Ok(ValidatedSubmission { snapshot });
    }

    if incomplete.len() >= policy.block_threshold {
        return Err(Error::ValidationBlocked {
            message: policy.error_text.clone(),
            incomplete,
        });
    }

    let message = policy.warning_text.replace("{items}", &incomplete.join(", "));
    Err(Error::ValidationWarning {
        message,
        incomplete,
    })
}
