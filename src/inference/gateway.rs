//! Request/response contract for the inference engine.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Input modality of a generation request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    /// Plain-text payload.
    Text,
    /// Image reference payload.
    Image,
}

/// Outcome classification of a generation attempt.
///
/// The tagged result replaces exception-driven validation: callers check
/// the status explicitly and decide whether to retry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InferenceStatus {
    /// Structured result parsed successfully.
    Ok,
    /// The model produced output that is not valid structured data.
    Malformed,
    /// The engine reported a generation failure.
    Error,
}

/// One generation request against the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferenceRequest {
    /// Payload modality.
    pub modality: Modality,
    /// Rendered transcript text, or an image reference for `Image`.
    pub payload: String,
    /// Situational context prepended as system guidance.
    pub context: String,
}

/// Tagged generation result.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceResponse {
    /// Outcome classification.
    pub status: InferenceStatus,
    /// Parsed structured result, present when `status` is `Ok`.
    pub structured_result: Option<serde_json::Value>,
    /// Diagnostic detail for `Malformed` / `Error` outcomes.
    pub detail: Option<String>,
}

impl InferenceResponse {
    /// A successful response carrying a structured result.
    #[must_use]
    pub fn ok(structured_result: serde_json::Value) -> Self {
        Self {
            status: InferenceStatus::Ok,
            structured_result: Some(structured_result),
            detail: None,
        }
    }

    /// A malformed-output response.
    #[must_use]
    pub fn malformed(detail: impl Into<String>) -> Self {
        Self {
            status: InferenceStatus::Malformed,
            structured_result: None,
            detail: Some(detail.into()),
        }
    }

    /// An engine-failure response.
    #[must_use]
    pub fn error(detail: impl Into<String>) -> Self {
        Self {
            status: InferenceStatus::Error,
            structured_result: None,
            detail: Some(detail.into()),
        }
    }
}

/// Stateless boundary to the language/vision model.
///
/// Implementations must map transport failures to `AppError::Inference`;
/// model-level problems are expressed through [`InferenceStatus`], never
/// as errors.
#[async_trait]
pub trait InferenceGateway: Send + Sync {
    /// Run one generation request.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Inference` when the engine is unreachable.
    async fn generate(&self, request: &InferenceRequest) -> Result<InferenceResponse>;
}
