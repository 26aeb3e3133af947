//! Idempotent report submission and status mapping.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ReconciliationConfig;
use crate::models::handoff::{HandoffRecord, HandoffStatus};
use crate::models::report::AssessmentReport;
use crate::models::session::SessionState;
use crate::platform::client::{PlatformApi, ReportSubmission};
use crate::store::SessionHandle;
use crate::{AppError, Result};

/// Submission and status-check operations against the specialist platform.
///
/// Enforces the per-session handoff invariants: identical content (same
/// fingerprint) reuses the existing record, and a second distinct
/// submission is refused while one is still non-terminal.
pub struct HandoffClient {
    api: Arc<dyn PlatformApi>,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl HandoffClient {
    /// Create a client over the given platform API.
    #[must_use]
    pub fn new(api: Arc<dyn PlatformApi>, reconciliation: &ReconciliationConfig) -> Self {
        Self {
            api,
            initial_backoff: reconciliation.initial_interval(),
            max_backoff: reconciliation.max_interval(),
        }
    }

    /// Submit a report once.
    ///
    /// Success yields a `Submitted` record; a network failure marks the
    /// record `Failed` and surfaces `AppError::Network` so the caller may
    /// retry with fresh content or backoff of its own.
    ///
    /// # Errors
    ///
    /// Returns `AppError::State` if a different submission is still in
    /// flight, `AppError::Auth` on credential rejection (never retried),
    /// or `AppError::Network` on transport failure.
    pub async fn submit(
        &self,
        session: &SessionHandle,
        report: &AssessmentReport,
    ) -> Result<HandoffRecord> {
        let fingerprint = report.fingerprint();
        if let Some(existing) = self.begin(session, &fingerprint).await? {
            return Ok(existing);
        }

        let submission = ReportSubmission::from_report(report);
        match self.api.submit_report(&submission).await {
            Ok(receipt) => {
                self.complete(session, &fingerprint, receipt.handoff_id, 1)
                    .await
            }
            Err(err) => {
                self.abort(session, &fingerprint, 1).await;
                Err(err)
            }
        }
    }

    /// Submit a report, retrying transient network failures with doubling
    /// backoff until success, a fatal error, or cancellation.
    ///
    /// # Errors
    ///
    /// Returns `AppError::State` if a different submission is still in
    /// flight, `AppError::Auth` on credential rejection, or
    /// `AppError::Network` once cancelled mid-retry.
    pub async fn submit_with_retry(
        &self,
        session: &SessionHandle,
        report: &AssessmentReport,
        cancel: &CancellationToken,
    ) -> Result<HandoffRecord> {
        let fingerprint = report.fingerprint();
        if let Some(existing) = self.begin(session, &fingerprint).await? {
            return Ok(existing);
        }

        let submission = ReportSubmission::from_report(report);
        let mut attempts: u32 = 0;
        let mut backoff = self.initial_backoff;

        loop {
            attempts += 1;
            match self.api.submit_report(&submission).await {
                Ok(receipt) => {
                    return self
                        .complete(session, &fingerprint, receipt.handoff_id, attempts)
                        .await;
                }
                Err(err @ AppError::Auth(_)) => {
                    warn!(attempts, %err, "platform rejected credentials; not retrying");
                    self.abort(session, &fingerprint, attempts).await;
                    return Err(err);
                }
                Err(AppError::Network(detail)) => {
                    warn!(
                        attempts,
                        backoff_secs = backoff.as_secs(),
                        %detail,
                        "platform submit failed; backing off"
                    );
                    tokio::select! {
                        () = cancel.cancelled() => {
                            self.abort(session, &fingerprint, attempts).await;
                            return Err(AppError::Network(format!(
                                "submission cancelled after {attempts} attempts"
                            )));
                        }
                        () = tokio::time::sleep(backoff) => {}
                    }
                    backoff = (backoff * 2).min(self.max_backoff);
                }
                Err(err) => {
                    self.abort(session, &fingerprint, attempts).await;
                    return Err(err);
                }
            }
        }
    }

    /// Fetch and map the review status of a submitted report.
    ///
    /// Unrecognized platform states map to `UnderReview` conservatively.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Auth` on credential rejection or
    /// `AppError::Network` on transport failure.
    pub async fn check_status(
        &self,
        handoff_id: &str,
    ) -> Result<(HandoffStatus, Option<String>)> {
        let snapshot = self.api.fetch_status(handoff_id).await?;
        let status = HandoffStatus::from_external(&snapshot.state);
        Ok((status, snapshot.specialist_message))
    }

    /// Run the idempotency and single-flight checks, registering a
    /// `Pending` record when a fresh submission may proceed.
    async fn begin(
        &self,
        session: &SessionHandle,
        fingerprint: &str,
    ) -> Result<Option<HandoffRecord>> {
        let mut session = session.lock().await;

        if let Some(existing) = session.handoff_for_fingerprint(fingerprint) {
            debug!(
                handoff_id = %existing.id,
                "identical report already handed off; reusing record"
            );
            return Ok(Some(existing.clone()));
        }

        if let Some(active) = session.active_handoff() {
            return Err(AppError::State(format!(
                "handoff {} is still in flight for this session",
                active.id
            )));
        }

        session
            .handoffs
            .push(HandoffRecord::pending(fingerprint.to_owned()));
        Ok(None)
    }

    /// Adopt the platform id on the pending record and return it.
    async fn complete(
        &self,
        session: &SessionHandle,
        fingerprint: &str,
        platform_id: String,
        attempts: u32,
    ) -> Result<HandoffRecord> {
        let mut session = session.lock().await;

        if session.state == SessionState::Archived {
            // The session was torn down while the request was in flight;
            // the result is discarded.
            if let Some(record) = pending_record(&mut session.handoffs, fingerprint) {
                record.fail(attempts);
            }
            return Err(AppError::State("session archived during submission".into()));
        }

        let record = pending_record(&mut session.handoffs, fingerprint).ok_or_else(|| {
            AppError::NotFound("pending handoff record disappeared".into())
        })?;
        record.accept(platform_id, attempts);
        let accepted = record.clone();
        info!(handoff_id = %accepted.id, attempts, "report submitted to platform");
        Ok(accepted)
    }

    /// Mark the pending record terminally failed.
    async fn abort(&self, session: &SessionHandle, fingerprint: &str, attempts: u32) {
        let mut session = session.lock().await;
        if let Some(record) = pending_record(&mut session.handoffs, fingerprint) {
            record.fail(attempts);
        }
    }
}

fn pending_record<'a>(
    handoffs: &'a mut [HandoffRecord],
    fingerprint: &str,
) -> Option<&'a mut HandoffRecord> {
    handoffs
        .iter_mut()
        .find(|h| h.fingerprint == fingerprint && h.status == HandoffStatus::Pending)
}
