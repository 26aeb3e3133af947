//! Wire contract and HTTP client for the specialist-review platform.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::PlatformConfig;
use crate::models::report::AssessmentReport;
use crate::{AppError, Result};

/// Report payload accepted by `POST /reports`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ReportSubmission {
    /// Content fingerprint for duplicate detection on both sides.
    pub fingerprint: String,
    /// Severity on the 1–10 scale.
    pub severity_score: u8,
    /// Ordered behavioral indicators.
    pub indicators: Vec<String>,
    /// Free-text analysis narrative.
    pub narrative: String,
    /// Cultural-context tag.
    pub cultural_context: String,
}

impl ReportSubmission {
    /// Build the submission payload for a report.
    #[must_use]
    pub fn from_report(report: &AssessmentReport) -> Self {
        Self {
            fingerprint: report.fingerprint(),
            severity_score: report.severity_score,
            indicators: report.indicators.clone(),
            narrative: report.narrative.clone(),
            cultural_context: report.cultural_context.clone(),
        }
    }
}

/// Acceptance receipt from `POST /reports`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SubmitReceipt {
    /// Platform-assigned handoff identifier.
    pub handoff_id: String,
}

/// Review state from `GET /reports/{handoff_id}/status`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct StatusSnapshot {
    /// Platform-side state string; mapped conservatively by the caller.
    pub state: String,
    /// Specialist message, present once a response exists.
    pub specialist_message: Option<String>,
}

/// Request/response boundary to the platform API.
///
/// Timeouts and retries are the caller's responsibility; implementations
/// perform exactly one HTTP exchange per call.
#[async_trait]
pub trait PlatformApi: Send + Sync {
    /// Submit a report for specialist review.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Auth` on credential rejection and
    /// `AppError::Network` on transport or server failure.
    async fn submit_report(&self, submission: &ReportSubmission) -> Result<SubmitReceipt>;

    /// Fetch the current review state of a submitted report.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Auth` on credential rejection and
    /// `AppError::Network` on transport or server failure.
    async fn fetch_status(&self, handoff_id: &str) -> Result<StatusSnapshot>;
}

/// Reqwest-backed platform client with bearer authentication.
pub struct HttpPlatformClient {
    client: reqwest::Client,
    base_url: String,
    api_token: String,
}

impl HttpPlatformClient {
    /// Build a client from the platform configuration.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the HTTP client cannot be built.
    pub fn from_config(config: &PlatformConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|err| AppError::Config(format!("failed to build http client: {err}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            api_token: config.api_token.clone(),
        })
    }

    fn classify_failure(status: StatusCode, detail: String) -> AppError {
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            AppError::Auth(format!("platform rejected credentials ({status})"))
        } else {
            AppError::Network(format!("platform status {status}: {detail}"))
        }
    }
}

#[async_trait]
impl PlatformApi for HttpPlatformClient {
    async fn submit_report(&self, submission: &ReportSubmission) -> Result<SubmitReceipt> {
        let url = format!("{}/reports", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(submission)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Self::classify_failure(status, detail));
        }

        debug!(fingerprint = %submission.fingerprint, "report accepted by platform");
        response.json().await.map_err(AppError::from)
    }

    async fn fetch_status(&self, handoff_id: &str) -> Result<StatusSnapshot> {
        let url = format!("{}/reports/{handoff_id}/status", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Self::classify_failure(status, detail));
        }

        response.json().await.map_err(AppError::from)
    }
}
