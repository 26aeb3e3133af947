//! Handoff record model for reports submitted to the specialist platform.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Review status of a submitted report, as tracked locally.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HandoffStatus {
    /// Submission not yet attempted or still in flight.
    Pending,
    /// Accepted by the platform, awaiting specialist pickup.
    Submitted,
    /// A specialist is reviewing the report.
    UnderReview,
    /// A specialist response has arrived.
    Responded,
    /// Submission failed terminally (network exhaustion or auth rejection).
    Failed,
}

impl HandoffStatus {
    /// Whether this status ends the handoff's lifecycle.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Responded | Self::Failed)
    }

    /// Map a platform-reported state string onto the local status set.
    ///
    /// Unrecognized states map to `UnderReview` conservatively: the report
    /// is known to the platform, so polling continues rather than failing.
    #[must_use]
    pub fn from_external(state: &str) -> Self {
        let normalized = state.trim().to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "pending" | "submitted" | "received" => Self::Submitted,
            "under_review" | "in_review" | "reviewing" => Self::UnderReview,
            "responded" | "completed" | "closed" => Self::Responded,
            _ => Self::UnderReview,
        }
    }
}

/// Tracking record for one report submitted to the specialist platform.
///
/// A session holds at most one non-terminal record at a time; resubmission
/// of identical content (same fingerprint) reuses the existing record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct HandoffRecord {
    /// Platform-assigned handoff identifier.
    pub id: String,
    /// Content fingerprint of the submitted report.
    pub fingerprint: String,
    /// Current review status.
    pub status: HandoffStatus,
    /// Submission attempts spent obtaining this record.
    pub submit_attempts: u32,
    /// Timestamp of the most recent status poll.
    pub last_polled_at: Option<DateTime<Utc>>,
    /// Specialist message, present once `status` is `Responded`.
    pub specialist_message: Option<String>,
    /// Timestamp of the successful submission.
    pub submitted_at: DateTime<Utc>,
}

impl HandoffRecord {
    /// Construct a record for a submission about to be attempted.
    ///
    /// Carries a locally generated identifier until the platform assigns
    /// one on acceptance.
    #[must_use]
    pub fn pending(fingerprint: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            fingerprint,
            status: HandoffStatus::Pending,
            submit_attempts: 0,
            last_polled_at: None,
            specialist_message: None,
            submitted_at: Utc::now(),
        }
    }

    /// Mark the record accepted: adopt the platform id and attempt count.
    pub fn accept(&mut self, platform_id: String, submit_attempts: u32) {
        self.id = platform_id;
        self.status = HandoffStatus::Submitted;
        self.submit_attempts = submit_attempts;
        self.submitted_at = Utc::now();
    }

    /// Mark the record terminally failed.
    pub fn fail(&mut self, submit_attempts: u32) {
        self.status = HandoffStatus::Failed;
        self.submit_attempts = submit_attempts;
    }
}

/// Poll-loop bookkeeping for one handoff record.
///
/// Owned by the reconciler task; snapshotted into events so backoff
/// behavior stays observable from outside the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingState {
    /// Polls attempted so far (successful or not).
    pub attempts: u32,
    /// Delay before the next poll becomes eligible.
    pub backoff: std::time::Duration,
}

impl PollingState {
    /// Initial state with the configured base interval.
    #[must_use]
    pub fn new(initial: std::time::Duration) -> Self {
        Self {
            attempts: 0,
            backoff: initial,
        }
    }

    /// Register a successful poll: backoff resets to the initial interval.
    pub fn record_success(&mut self, initial: std::time::Duration) {
        self.attempts += 1;
        self.backoff = initial;
    }

    /// Register a failed poll: backoff doubles, saturating at `cap`.
    pub fn record_failure(&mut self, cap: std::time::Duration) {
        self.attempts += 1;
        self.backoff = (self.backoff * 2).min(cap);
    }
}
