//! Session lifecycle management: create, append, finalize, archive.
//!
//! All transcript mutation happens here, under the store's per-session
//! lock. Finalization freezes the transcript and hands a copy to the
//! asynchronous synthesis → escalation → handoff pipeline; archiving
//! cancels the session's reconciler deterministically before returning.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use crate::config::GlobalConfig;
use crate::models::handoff::HandoffStatus;
use crate::models::profile::ChildProfile;
use crate::models::report::AssessmentReport;
use crate::models::session::{Session, SessionState};
use crate::models::turn::ConversationTurn;
use crate::orchestrator::events::SessionEvent;
use crate::orchestrator::reconciler::{Reconciler, ReconcilerHandle};
use crate::orchestrator::synthesizer::ReportSynthesizer;
use crate::platform::handoff::HandoffClient;
use crate::store::SessionStore;
use crate::{AppError, Result};

/// Registry of live reconciler handles, one per session.
type Reconcilers = Arc<Mutex<HashMap<String, ReconcilerHandle>>>;

/// Handle for a report whose synthesis is still in flight.
///
/// Returned by [`SessionManager::finalize_session`]; resolves once the
/// synthesis attempt (not the handoff) completes.
#[derive(Debug)]
pub struct ReportHandle {
    session_id: String,
    rx: oneshot::Receiver<Result<AssessmentReport>>,
}

impl ReportHandle {
    /// The session this report belongs to.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Wait for the synthesis outcome.
    ///
    /// # Errors
    ///
    /// Returns the synthesis error, or `AppError::Synthesis` if the
    /// pipeline task ended without reporting a result.
    pub async fn wait(self) -> Result<AssessmentReport> {
        self.rx
            .await
            .map_err(|_| AppError::Synthesis("synthesis task ended without a result".into()))?
    }
}

/// Drives session lifecycles and owns the background pipelines.
pub struct SessionManager {
    store: Arc<SessionStore>,
    synthesizer: Arc<ReportSynthesizer>,
    handoff: Arc<HandoffClient>,
    crisis_threshold: u8,
    initial_interval: Duration,
    max_interval: Duration,
    event_tx: mpsc::Sender<SessionEvent>,
    reconcilers: Reconcilers,
    cancel: CancellationToken,
}

impl SessionManager {
    /// Assemble a manager over the shared components.
    #[must_use]
    pub fn new(
        store: Arc<SessionStore>,
        synthesizer: Arc<ReportSynthesizer>,
        handoff: Arc<HandoffClient>,
        config: &GlobalConfig,
        event_tx: mpsc::Sender<SessionEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            synthesizer,
            handoff,
            crisis_threshold: config.synthesis.crisis_threshold,
            initial_interval: config.reconciliation.initial_interval(),
            max_interval: config.reconciliation.max_interval(),
            event_tx,
            reconcilers: Arc::new(Mutex::new(HashMap::new())),
            cancel,
        }
    }

    /// Create a new session in `Onboarding` and return its id.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` if the profile's location is empty —
    /// the derived cultural context depends on it.
    pub async fn create_session(&self, profile: ChildProfile) -> Result<String> {
        if profile.location.trim().is_empty() {
            return Err(AppError::Validation(
                "profile location must not be empty".into(),
            ));
        }

        let session = Session::new(profile);
        let session_id = self.store.insert(session).await;
        info!(session_id, "session created");
        Ok(session_id)
    }

    /// Append a turn to a session's transcript.
    ///
    /// The first turn activates an onboarding session. Appends on one
    /// session are serialized by its lock; distinct sessions do not
    /// contend.
    ///
    /// # Errors
    ///
    /// Returns `AppError::State` if the session is finalized or archived,
    /// or `AppError::NotFound` for an unknown id.
    pub async fn append_turn(&self, session_id: &str, turn: ConversationTurn) -> Result<()> {
        let handle = self.store.get(session_id).await?;
        let mut session = handle.lock().await;

        if !session.accepts_turns() {
            return Err(AppError::State(format!(
                "cannot append to a {} session",
                session.state.as_str()
            )));
        }

        if session.state == SessionState::Onboarding {
            session.state = SessionState::Active;
        }

        session.turns.push(turn);
        session.updated_at = Utc::now();
        Ok(())
    }

    /// Freeze a session's transcript and start report synthesis.
    ///
    /// Returns immediately; the returned handle resolves with the
    /// synthesis outcome while submission and reconciliation continue in
    /// the background. Re-finalizing a finalized session produces a new
    /// report and retains the old one for audit.
    ///
    /// # Errors
    ///
    /// Returns `AppError::State` if the session has no turns or is
    /// archived, or `AppError::NotFound` for an unknown id.
    pub async fn finalize_session(&self, session_id: &str) -> Result<ReportHandle> {
        let handle = self.store.get(session_id).await?;
        let (profile, turns) = {
            let mut session = handle.lock().await;
            match session.state {
                SessionState::Archived => {
                    return Err(AppError::State(
                        "an archived session cannot be finalized".into(),
                    ));
                }
                SessionState::Onboarding => {
                    return Err(AppError::State(
                        "session needs at least one turn before finalizing".into(),
                    ));
                }
                SessionState::Active => {
                    session.state = SessionState::Finalized;
                }
                SessionState::Finalized => {
                    // Re-finalize: regenerate the report from the frozen
                    // transcript.
                }
            }
            session.updated_at = Utc::now();
            (session.profile.clone(), session.turns.clone())
        };

        let (report_tx, report_rx) = oneshot::channel();
        let pipeline = FinalizePipeline {
            store: Arc::clone(&self.store),
            synthesizer: Arc::clone(&self.synthesizer),
            handoff: Arc::clone(&self.handoff),
            reconcilers: Arc::clone(&self.reconcilers),
            event_tx: self.event_tx.clone(),
            session_id: session_id.to_owned(),
            profile,
            turns,
            crisis_threshold: self.crisis_threshold,
            initial_interval: self.initial_interval,
            max_interval: self.max_interval,
            cancel: self.cancel.child_token(),
        };

        let span = info_span!("finalize_pipeline", session_id);
        tokio::spawn(pipeline.run(report_tx).instrument(span));

        info!(session_id, "session finalized; synthesis started");
        Ok(ReportHandle {
            session_id: session_id.to_owned(),
            rx: report_rx,
        })
    }

    /// Archive a finalized session.
    ///
    /// Cancels the session's reconciler and waits for it to exit before
    /// returning, so no status poll can occur once archiving completes.
    /// Poll results still in flight are discarded.
    ///
    /// # Errors
    ///
    /// Returns `AppError::State` unless the session is finalized, or
    /// `AppError::NotFound` for an unknown id.
    pub async fn archive_session(&self, session_id: &str) -> Result<()> {
        let handle = self.store.get(session_id).await?;
        {
            let mut session = handle.lock().await;
            if session.state != SessionState::Finalized {
                return Err(AppError::State(format!(
                    "cannot archive a {} session",
                    session.state.as_str()
                )));
            }
            session.state = SessionState::Archived;
            session.updated_at = Utc::now();
        }

        let reconciler = {
            let mut map = self.reconcilers.lock().await;
            map.remove(session_id)
        };
        if let Some(reconciler) = reconciler {
            reconciler.await_completion().await;
        }

        info!(session_id, "session archived");
        Ok(())
    }

    /// Clone the current state of a session for display.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown id.
    pub async fn session_snapshot(&self, session_id: &str) -> Result<Session> {
        let handle = self.store.get(session_id).await?;
        let session = handle.lock().await;
        Ok(session.clone())
    }

    /// Cancel every background pipeline and reconciler and wait for them.
    ///
    /// Called on process teardown; afterwards no background work remains.
    pub async fn shutdown(&self) {
        self.cancel.cancel();

        let handles: Vec<ReconcilerHandle> = {
            let mut map = self.reconcilers.lock().await;
            map.drain().map(|(_, handle)| handle).collect()
        };
        let reconcilers = handles.len();
        for handle in handles {
            handle.await_completion().await;
        }

        info!(
            sessions = self.store.len().await,
            reconcilers, "session manager shut down"
        );
    }
}

/// Background work spawned by a finalize call: synthesize, escalate,
/// submit, reconcile.
struct FinalizePipeline {
    store: Arc<SessionStore>,
    synthesizer: Arc<ReportSynthesizer>,
    handoff: Arc<HandoffClient>,
    reconcilers: Reconcilers,
    event_tx: mpsc::Sender<SessionEvent>,
    session_id: String,
    profile: ChildProfile,
    turns: Vec<ConversationTurn>,
    crisis_threshold: u8,
    initial_interval: Duration,
    max_interval: Duration,
    cancel: CancellationToken,
}

impl FinalizePipeline {
    async fn run(self, report_tx: oneshot::Sender<Result<AssessmentReport>>) {
        // ── Synthesize ──────────────────────────────────────
        let report = match self.synthesizer.synthesize(&self.profile, &self.turns).await {
            Ok(report) => report,
            Err(err) => {
                warn!(session_id = %self.session_id, %err, "synthesis failed");
                let _ = self
                    .event_tx
                    .send(SessionEvent::SynthesisFailed {
                        session_id: self.session_id.clone(),
                        detail: err.to_string(),
                    })
                    .await;
                let _ = report_tx.send(Err(err));
                return;
            }
        };

        // ── Record the report ───────────────────────────────
        let Ok(handle) = self.store.get(&self.session_id).await else {
            let _ = report_tx.send(Err(AppError::NotFound(format!(
                "session {} disappeared during synthesis",
                self.session_id
            ))));
            return;
        };
        {
            let mut session = handle.lock().await;
            if session.state == SessionState::Archived {
                let _ = report_tx.send(Err(AppError::State(
                    "session archived during synthesis".into(),
                )));
                return;
            }
            session.reports.push(report.clone());
            session.updated_at = Utc::now();
        }

        let _ = self
            .event_tx
            .send(SessionEvent::ReportReady {
                session_id: self.session_id.clone(),
                report_id: report.id.clone(),
                severity_score: report.severity_score,
            })
            .await;
        let _ = report_tx.send(Ok(report.clone()));

        // ── Crisis escalation before any network step ───────
        if report.severity_score >= self.crisis_threshold {
            warn!(
                session_id = %self.session_id,
                severity = report.severity_score,
                "crisis threshold met; escalating"
            );
            let _ = self
                .event_tx
                .send(SessionEvent::CrisisEscalated {
                    session_id: self.session_id.clone(),
                    report_id: report.id.clone(),
                    severity_score: report.severity_score,
                })
                .await;
        }

        // ── Hand off to the platform ────────────────────────
        let record = match self
            .handoff
            .submit_with_retry(&handle, &report, &self.cancel)
            .await
        {
            Ok(record) => record,
            Err(err) => {
                let _ = self
                    .event_tx
                    .send(SessionEvent::HandoffFailed {
                        session_id: self.session_id.clone(),
                        detail: err.to_string(),
                    })
                    .await;
                return;
            }
        };

        let _ = self
            .event_tx
            .send(SessionEvent::HandoffSubmitted {
                session_id: self.session_id.clone(),
                handoff_id: record.id.clone(),
            })
            .await;

        // Only a freshly accepted or in-review record needs a reconciler.
        // A terminal record is done; a Pending hit means another
        // submission is mid-flight and will start its own.
        if !matches!(
            record.status,
            HandoffStatus::Submitted | HandoffStatus::UnderReview
        ) {
            return;
        }

        // ── Start reconciliation ────────────────────────────
        {
            let session = handle.lock().await;
            if session.state == SessionState::Archived {
                return;
            }
        }

        let previous = {
            let mut map = self.reconcilers.lock().await;
            map.remove(&self.session_id)
        };
        if let Some(previous) = previous {
            previous.await_completion().await;
        }

        let reconciler = Reconciler::new(
            self.session_id.clone(),
            record.id.clone(),
            Arc::clone(&self.handoff),
            Arc::clone(&self.store),
            self.initial_interval,
            self.max_interval,
            self.event_tx.clone(),
            self.cancel.child_token(),
        )
        .spawn();

        let mut map = self.reconcilers.lock().await;
        map.insert(self.session_id.clone(), reconciler);
    }
}
