//! Session events surfaced to the chat layer.
//!
//! Events are delivered via a `tokio::sync::mpsc` channel so the surface
//! can react (render the report, show specialist responses, raise crisis
//! banners) without the orchestrator knowing how they are displayed.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::models::handoff::HandoffStatus;

/// Notifications emitted by the orchestrator for surface handling.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A report finished synthesizing.
    ReportReady {
        /// Owning session.
        session_id: String,
        /// The synthesized report.
        report_id: String,
        /// Final (clamped) severity.
        severity_score: u8,
    },
    /// A report met the crisis threshold; emitted before any network step.
    CrisisEscalated {
        /// Owning session.
        session_id: String,
        /// The crisis report.
        report_id: String,
        /// Final (clamped) severity.
        severity_score: u8,
    },
    /// Synthesis exhausted its retry budget.
    SynthesisFailed {
        /// Owning session.
        session_id: String,
        /// Why synthesis gave up.
        detail: String,
    },
    /// A report was accepted by the specialist platform.
    HandoffSubmitted {
        /// Owning session.
        session_id: String,
        /// Platform-assigned handoff id.
        handoff_id: String,
    },
    /// A status poll observed a state change.
    HandoffStatusChanged {
        /// Owning session.
        session_id: String,
        /// Platform-assigned handoff id.
        handoff_id: String,
        /// Newly observed status.
        status: HandoffStatus,
    },
    /// A specialist response arrived; the handoff is complete.
    SpecialistResponded {
        /// Owning session.
        session_id: String,
        /// Platform-assigned handoff id.
        handoff_id: String,
        /// Specialist message, when the platform provided one.
        message: Option<String>,
    },
    /// The handoff failed terminally.
    HandoffFailed {
        /// Owning session.
        session_id: String,
        /// Why the handoff gave up.
        detail: String,
    },
}

/// Spawn a background task that logs session events.
///
/// Stands in for the chat surface in headless runs and tests; the task
/// runs until the `CancellationToken` fires or the channel closes.
#[must_use]
pub fn spawn_event_logger(
    mut rx: mpsc::Receiver<SessionEvent>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                () = cancel.cancelled() => {
                    info!("event logger shutting down");
                    break;
                }
                maybe_event = rx.recv() => {
                    if let Some(e) = maybe_event { e } else {
                        info!("session event channel closed");
                        break;
                    }
                }
            };

            match event {
                SessionEvent::ReportReady {
                    ref session_id,
                    ref report_id,
                    severity_score,
                } => {
                    info!(session_id, report_id, severity_score, "report ready");
                }
                SessionEvent::CrisisEscalated {
                    ref session_id,
                    ref report_id,
                    severity_score,
                } => {
                    error!(
                        session_id,
                        report_id, severity_score, "crisis severity; immediate attention required"
                    );
                }
                SessionEvent::SynthesisFailed {
                    ref session_id,
                    ref detail,
                } => {
                    warn!(session_id, detail, "synthesis failed; re-finalize to retry");
                }
                SessionEvent::HandoffSubmitted {
                    ref session_id,
                    ref handoff_id,
                } => {
                    info!(session_id, handoff_id, "report handed off for review");
                }
                SessionEvent::HandoffStatusChanged {
                    ref session_id,
                    ref handoff_id,
                    status,
                } => {
                    info!(session_id, handoff_id, ?status, "handoff status changed");
                }
                SessionEvent::SpecialistResponded {
                    ref session_id,
                    ref handoff_id,
                    ref message,
                } => {
                    info!(
                        session_id,
                        handoff_id,
                        has_message = message.is_some(),
                        "specialist responded"
                    );
                }
                SessionEvent::HandoffFailed {
                    ref session_id,
                    ref detail,
                } => {
                    warn!(session_id, detail, "handoff failed");
                }
            }
        }
    })
}
