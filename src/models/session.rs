//! Session model and lifecycle helpers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::handoff::{HandoffRecord, HandoffStatus};
use super::profile::ChildProfile;
use super::report::AssessmentReport;
use super::turn::ConversationTurn;

/// Lifecycle state for an assessment session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Profile captured, no conversation yet.
    Onboarding,
    /// Conversation in progress.
    Active,
    /// Transcript frozen, eligible for synthesis and handoff.
    Finalized,
    /// Closed out; terminal.
    Archived,
}

impl SessionState {
    /// Lowercase state name for log and error messages.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Onboarding => "onboarding",
            Self::Active => "active",
            Self::Finalized => "finalized",
            Self::Archived => "archived",
        }
    }
}

/// One continuous assessment interaction for a single child profile.
///
/// All mutation goes through the session manager under the store's
/// per-session lock; the transcript is append-only and freezes at
/// finalization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Session {
    /// Unique record identifier.
    pub id: String,
    /// Immutable child profile captured at creation.
    pub profile: ChildProfile,
    /// Ordered, append-only conversation transcript.
    pub turns: Vec<ConversationTurn>,
    /// Current lifecycle state.
    pub state: SessionState,
    /// Every synthesized report, oldest first; the last is effective.
    pub reports: Vec<AssessmentReport>,
    /// Every handoff record, oldest first; at most one non-terminal.
    pub handoffs: Vec<HandoffRecord>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last activity timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Construct a new session in `Onboarding` with a generated identifier.
    #[must_use]
    pub fn new(profile: ChildProfile) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            profile,
            turns: Vec::new(),
            state: SessionState::Onboarding,
            reports: Vec::new(),
            handoffs: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Determine whether a lifecycle transition is permitted.
    #[must_use]
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        matches!(
            (self.state, next),
            (SessionState::Onboarding, SessionState::Active)
                | (SessionState::Active, SessionState::Finalized)
                | (SessionState::Finalized, SessionState::Archived)
        )
    }

    /// Whether the session still accepts turn appends.
    #[must_use]
    pub fn accepts_turns(&self) -> bool {
        matches!(self.state, SessionState::Onboarding | SessionState::Active)
    }

    /// The effective (most recent) report, if any.
    #[must_use]
    pub fn latest_report(&self) -> Option<&AssessmentReport> {
        self.reports.last()
    }

    /// The single non-terminal handoff record, if one exists.
    #[must_use]
    pub fn active_handoff(&self) -> Option<&HandoffRecord> {
        self.handoffs.iter().find(|h| !h.status.is_terminal())
    }

    /// A non-failed record carrying the given content fingerprint.
    ///
    /// Used for idempotent submission: matching content reuses the
    /// existing record instead of creating a duplicate.
    #[must_use]
    pub fn handoff_for_fingerprint(&self, fingerprint: &str) -> Option<&HandoffRecord> {
        self.handoffs
            .iter()
            .find(|h| h.fingerprint == fingerprint && h.status != HandoffStatus::Failed)
    }

    /// Mutable access to a handoff record by platform id.
    #[must_use]
    pub fn handoff_mut(&mut self, handoff_id: &str) -> Option<&mut HandoffRecord> {
        self.handoffs.iter_mut().find(|h| h.id == handoff_id)
    }
}
