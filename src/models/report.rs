//! Assessment report model, severity clamping, and content fingerprinting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Lowest representable severity.
pub const SEVERITY_MIN: u8 = 1;
/// Highest representable severity.
pub const SEVERITY_MAX: u8 = 10;

/// Structured assessment as returned by the model, before validation.
///
/// The severity is deliberately a wide integer: out-of-range model output
/// is expected and clamped downstream rather than rejected.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct RawAssessment {
    /// Severity on the 1–10 scale, possibly out of range.
    pub severity_score: i64,
    /// Behavioral indicators identified in the conversation.
    pub risk_indicators: Vec<String>,
    /// Free-text analysis narrative.
    pub narrative: String,
}

/// Clamp a raw severity into the valid scale.
///
/// Returns the clamped score and whether clamping was applied.
#[must_use]
pub fn clamp_severity(raw: i64) -> (u8, bool) {
    let clamped = raw.clamp(i64::from(SEVERITY_MIN), i64::from(SEVERITY_MAX));
    // Infallible after the clamp above.
    let score = u8::try_from(clamped).unwrap_or(SEVERITY_MAX);
    (score, clamped != raw)
}

/// A validated, immutable severity assessment synthesized from a finalized
/// transcript.
///
/// Regenerable only by re-finalizing the owning session; superseded reports
/// are retained for audit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AssessmentReport {
    /// Unique record identifier.
    pub id: String,
    /// Severity on the 1–10 scale, always in range.
    pub severity_score: u8,
    /// Ordered behavioral indicators.
    pub indicators: Vec<String>,
    /// Free-text analysis narrative.
    pub narrative: String,
    /// Cultural-context tag derived from the child's location.
    pub cultural_context: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl AssessmentReport {
    /// Construct a report from validated parts.
    #[must_use]
    pub fn new(
        severity_score: u8,
        indicators: Vec<String>,
        narrative: String,
        cultural_context: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            severity_score,
            indicators,
            narrative,
            cultural_context,
            created_at: Utc::now(),
        }
    }

    /// Deterministic SHA-256 content fingerprint (hex).
    ///
    /// Covers everything the specialist platform receives, so two reports
    /// with identical clinical content hash identically regardless of id
    /// or creation time.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update([self.severity_score]);
        for indicator in &self.indicators {
            hasher.update(indicator.as_bytes());
            hasher.update([0x1f]);
        }
        hasher.update(self.narrative.as_bytes());
        hasher.update([0x1f]);
        hasher.update(self.cultural_context.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}
