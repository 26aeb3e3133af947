//! Per-handoff reconciliation loop.
//!
//! Each non-terminal [`HandoffRecord`](crate::models::handoff::HandoffRecord)
//! gets exactly one [`Reconciler`] task that polls the specialist platform
//! until a response arrives, the owning session is archived, or the task is
//! cancelled. Transient failures never end the loop; they double the poll
//! interval up to the configured cap.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::models::handoff::{HandoffStatus, PollingState};
use crate::models::session::SessionState;
use crate::orchestrator::events::SessionEvent;
use crate::platform::handoff::HandoffClient;
use crate::store::SessionStore;
use crate::AppError;

/// Builder for a per-handoff reconciliation task.
///
/// Call [`spawn`](Self::spawn) to start the background polling loop.
pub struct Reconciler {
    session_id: String,
    handoff_id: String,
    handoff: Arc<HandoffClient>,
    store: Arc<SessionStore>,
    initial_interval: Duration,
    max_interval: Duration,
    event_tx: mpsc::Sender<SessionEvent>,
    cancel: CancellationToken,
}

impl Reconciler {
    /// Construct a new reconciler (does not start the loop yet).
    #[must_use]
    #[allow(clippy::too_many_arguments)] // Internal plumbing; not part of public API width.
    pub fn new(
        session_id: String,
        handoff_id: String,
        handoff: Arc<HandoffClient>,
        store: Arc<SessionStore>,
        initial_interval: Duration,
        max_interval: Duration,
        event_tx: mpsc::Sender<SessionEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            session_id,
            handoff_id,
            handoff,
            store,
            initial_interval,
            max_interval,
            event_tx,
            cancel,
        }
    }

    /// Spawn the background polling task and return a handle controlling it.
    #[must_use]
    pub fn spawn(self) -> ReconcilerHandle {
        let cancel_for_handle = self.cancel.clone();
        let session_id = self.session_id.clone();
        let handoff_id = self.handoff_id.clone();

        let task_handle = tokio::spawn(
            self.run().instrument(info_span!("reconciler")),
        );

        ReconcilerHandle {
            session_id,
            handoff_id,
            join_handle: Some(task_handle),
            cancel: cancel_for_handle,
        }
    }

    /// Core polling loop.
    async fn run(self) {
        let mut polling = PollingState::new(self.initial_interval);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    debug!(session_id = %self.session_id, "reconciler cancelled");
                    return;
                }
                () = tokio::time::sleep(polling.backoff) => {}
            }

            match self.handoff.check_status(&self.handoff_id).await {
                Ok((status, message)) => {
                    polling.record_success(self.initial_interval);
                    if self.apply(status, message, &polling).await {
                        return;
                    }
                }
                Err(err @ AppError::Auth(_)) => {
                    warn!(
                        session_id = %self.session_id,
                        handoff_id = %self.handoff_id,
                        %err,
                        "platform rejected credentials; abandoning handoff"
                    );
                    self.mark_failed(&err.to_string()).await;
                    return;
                }
                Err(err) => {
                    polling.record_failure(self.max_interval);
                    debug!(
                        session_id = %self.session_id,
                        attempts = polling.attempts,
                        backoff_secs = polling.backoff.as_secs(),
                        %err,
                        "status poll failed; backing off"
                    );
                }
            }
        }
    }

    /// Persist a successful poll into the session, emitting events for
    /// observable changes. Returns `true` when the loop should terminate.
    async fn apply(
        &self,
        status: HandoffStatus,
        message: Option<String>,
        polling: &PollingState,
    ) -> bool {
        let Ok(handle) = self.store.get(&self.session_id).await else {
            debug!(session_id = %self.session_id, "session gone; reconciler exiting");
            return true;
        };

        let changed = {
            let mut session = handle.lock().await;

            if session.state == SessionState::Archived {
                // Result observed after archive is discarded.
                debug!(session_id = %self.session_id, "session archived; discarding poll result");
                return true;
            }

            let Some(record) = session.handoff_mut(&self.handoff_id) else {
                warn!(handoff_id = %self.handoff_id, "handoff record missing; reconciler exiting");
                return true;
            };

            record.last_polled_at = Some(Utc::now());
            let changed = record.status != status;
            record.status = status;
            if let Some(text) = message.clone() {
                record.specialist_message = Some(text);
            }
            session.updated_at = Utc::now();
            changed
        };

        if status == HandoffStatus::Responded {
            info!(
                session_id = %self.session_id,
                handoff_id = %self.handoff_id,
                polls = polling.attempts,
                "specialist response received"
            );
            let _ = self
                .event_tx
                .send(SessionEvent::SpecialistResponded {
                    session_id: self.session_id.clone(),
                    handoff_id: self.handoff_id.clone(),
                    message,
                })
                .await;
            return true;
        }

        if changed {
            let _ = self
                .event_tx
                .send(SessionEvent::HandoffStatusChanged {
                    session_id: self.session_id.clone(),
                    handoff_id: self.handoff_id.clone(),
                    status,
                })
                .await;
        }

        false
    }

    /// Mark the record failed after a fatal error and emit the event.
    async fn mark_failed(&self, detail: &str) {
        if let Ok(handle) = self.store.get(&self.session_id).await {
            let mut session = handle.lock().await;
            if let Some(record) = session.handoff_mut(&self.handoff_id) {
                record.status = HandoffStatus::Failed;
            }
            session.updated_at = Utc::now();
        }

        let _ = self
            .event_tx
            .send(SessionEvent::HandoffFailed {
                session_id: self.session_id.clone(),
                detail: detail.to_owned(),
            })
            .await;
    }
}

/// Handle returned from [`Reconciler::spawn`] for controlling the task.
pub struct ReconcilerHandle {
    session_id: String,
    handoff_id: String,
    /// Task handle for the background polling loop.
    join_handle: Option<JoinHandle<()>>,
    /// Per-handoff cancellation token — cancelled when the handle is dropped.
    cancel: CancellationToken,
}

impl Drop for ReconcilerHandle {
    /// Cancel the background polling task when the handle is dropped.
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl ReconcilerHandle {
    /// The session this handle belongs to.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// The handoff this handle polls for.
    #[must_use]
    pub fn handoff_id(&self) -> &str {
        &self.handoff_id
    }

    /// Signal the task to stop and wait for it to exit.
    ///
    /// Archiving uses this so no further polls can occur once the archive
    /// operation returns.
    pub async fn await_completion(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.await;
        }
    }
}
