//! Report synthesis from a finalized transcript.
//!
//! One structured-output request per attempt; the tagged gateway result is
//! checked explicitly and malformed or failed attempts are retried with
//! the same input up to the configured bound. Synthesis is deliberately
//! non-deterministic — identical transcripts may yield different reports —
//! so deduplication happens downstream via content fingerprints.

use std::sync::Arc;

use tracing::{info, info_span, warn, Instrument};

use crate::inference::gateway::{
    InferenceGateway, InferenceRequest, InferenceStatus, Modality,
};
use crate::models::profile::ChildProfile;
use crate::models::report::{clamp_severity, AssessmentReport, RawAssessment};
use crate::models::turn::ConversationTurn;
use crate::{AppError, Result};

/// Converts finalized transcripts into validated assessment reports.
pub struct ReportSynthesizer {
    gateway: Arc<dyn InferenceGateway>,
    max_attempts: u32,
}

impl ReportSynthesizer {
    /// Create a synthesizer with the given retry budget.
    #[must_use]
    pub fn new(gateway: Arc<dyn InferenceGateway>, max_attempts: u32) -> Self {
        Self {
            gateway,
            max_attempts,
        }
    }

    /// Synthesize an assessment report for a frozen transcript.
    ///
    /// The severity score is clamped into the valid scale; clamping is
    /// logged as a data-quality event, never surfaced as a failure.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Synthesis` once the retry budget is spent
    /// without a schema-valid result.
    pub async fn synthesize(
        &self,
        profile: &ChildProfile,
        turns: &[ConversationTurn],
    ) -> Result<AssessmentReport> {
        let cultural_context = profile.cultural_context();
        let request = InferenceRequest {
            modality: Modality::Text,
            payload: render_prompt(profile, turns),
            context: render_context(profile, &cultural_context),
        };

        let span = info_span!("synthesize", child = %profile.name);
        self.attempt_loop(&request, &cultural_context)
            .instrument(span)
            .await
    }

    async fn attempt_loop(
        &self,
        request: &InferenceRequest,
        cultural_context: &str,
    ) -> Result<AssessmentReport> {
        let mut last_detail = String::new();

        for attempt in 1..=self.max_attempts {
            let response = match self.gateway.generate(request).await {
                Ok(response) => response,
                Err(err) => {
                    warn!(attempt, %err, "gateway call failed");
                    last_detail = err.to_string();
                    continue;
                }
            };

            match (response.status, response.structured_result) {
                (InferenceStatus::Ok, Some(value)) => {
                    match serde_json::from_value::<RawAssessment>(value) {
                        Ok(raw) => return Ok(build_report(raw, cultural_context)),
                        Err(err) => {
                            warn!(attempt, %err, "structured result violates schema");
                            last_detail = format!("schema violation: {err}");
                        }
                    }
                }
                (InferenceStatus::Ok, None) => {
                    warn!(attempt, "ok status without structured result");
                    last_detail = "ok status without structured result".into();
                }
                (status, _) => {
                    let detail = response.detail.unwrap_or_default();
                    warn!(attempt, ?status, detail, "unusable model output");
                    last_detail = detail;
                }
            }
        }

        Err(AppError::Synthesis(format!(
            "no usable result after {} attempts: {last_detail}",
            self.max_attempts
        )))
    }
}

/// Validate and clamp a raw assessment into an immutable report.
fn build_report(raw: RawAssessment, cultural_context: &str) -> AssessmentReport {
    let (severity, clamped) = clamp_severity(raw.severity_score);
    if clamped {
        let err = AppError::DataQuality(format!(
            "model severity {} clamped to {severity}",
            raw.severity_score
        ));
        warn!(%err, raw_score = raw.severity_score, "out-of-range severity");
    }

    let report = AssessmentReport::new(
        severity,
        raw.risk_indicators,
        raw.narrative,
        cultural_context.to_owned(),
    );
    info!(report_id = %report.id, severity, "report synthesized");
    report
}

/// Render the system-side context for a synthesis request.
fn render_context(profile: &ChildProfile, cultural_context: &str) -> String {
    format!(
        "You are generating a structured risk assessment for {}, \
         a {}-year-old from {}. {cultural_context}. \
         Respond only with the requested JSON object.",
        profile.name, profile.age, profile.location
    )
}

/// Render the transcript and instructions into the request payload.
fn render_prompt(profile: &ChildProfile, turns: &[ConversationTurn]) -> String {
    let transcript: Vec<String> = turns.iter().map(ConversationTurn::render).collect();
    format!(
        "Based on the conversation below, produce a risk assessment for {}: \
         a severity score on a 1-10 scale, the behavioral risk indicators \
         identified, and an analysis narrative.\n\n{}",
        profile.name,
        transcript.join("\n")
    )
}
