//! Unit tests for the reconciliation loop.
//!
//! Validates poll application, conservative unknown-state handling,
//! retry-through-transient-failure, cancellation, and archive discard.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use care_relay::config::ReconciliationConfig;
use care_relay::models::handoff::{HandoffRecord, HandoffStatus};
use care_relay::models::profile::{ChildProfile, Gender};
use care_relay::models::session::{Session, SessionState};
use care_relay::orchestrator::events::SessionEvent;
use care_relay::orchestrator::reconciler::Reconciler;
use care_relay::platform::{
    HandoffClient, PlatformApi, ReportSubmission, StatusSnapshot, SubmitReceipt,
};
use care_relay::store::SessionStore;
use care_relay::{AppError, Result};

/// Platform double for polling; defaults to a steady `under_review`.
struct ScriptedPlatform {
    polls: AtomicU32,
    status_script: Mutex<VecDeque<Result<StatusSnapshot>>>,
}

impl ScriptedPlatform {
    fn new(script: Vec<Result<StatusSnapshot>>) -> Arc<Self> {
        Arc::new(Self {
            polls: AtomicU32::new(0),
            status_script: Mutex::new(script.into()),
        })
    }

    fn polls(&self) -> u32 {
        self.polls.load(Ordering::SeqCst)
    }
}

fn snapshot(state: &str, message: Option<&str>) -> Result<StatusSnapshot> {
    Ok(StatusSnapshot {
        state: state.into(),
        specialist_message: message.map(Into::into),
    })
}

#[async_trait]
impl PlatformApi for ScriptedPlatform {
    async fn submit_report(&self, _submission: &ReportSubmission) -> Result<SubmitReceipt> {
        Ok(SubmitReceipt {
            handoff_id: "H1".into(),
        })
    }

    async fn fetch_status(&self, _handoff_id: &str) -> Result<StatusSnapshot> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        self.status_script
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| snapshot("under_review", None))
    }
}

struct Fixture {
    store: Arc<SessionStore>,
    session_id: String,
    events: mpsc::Receiver<SessionEvent>,
    cancel: CancellationToken,
    reconciler: Option<Reconciler>,
}

/// Build a store holding one finalized session with a submitted handoff,
/// plus a reconciler wired to the scripted platform.
async fn fixture(platform: Arc<ScriptedPlatform>, archived: bool) -> Fixture {
    let mut session = Session::new(ChildProfile {
        name: "Amal".into(),
        age: 9,
        gender: Gender::Female,
        location: "Gaza".into(),
    });
    session.state = if archived {
        SessionState::Archived
    } else {
        SessionState::Finalized
    };
    let mut record = HandoffRecord::pending("fp-1".into());
    record.accept("H1".into(), 1);
    session.handoffs.push(record);

    let store = Arc::new(SessionStore::new());
    let session_id = store.insert(session).await;

    let config = ReconciliationConfig {
        initial_interval_seconds: 1,
        max_interval_seconds: 4,
    };
    let handoff = Arc::new(HandoffClient::new(platform, &config));
    let (event_tx, events) = mpsc::channel(32);
    let cancel = CancellationToken::new();

    let reconciler = Reconciler::new(
        session_id.clone(),
        "H1".into(),
        handoff,
        Arc::clone(&store),
        Duration::from_millis(20),
        Duration::from_millis(80),
        event_tx,
        cancel.clone(),
    );

    Fixture {
        store,
        session_id,
        events,
        cancel,
        reconciler: Some(reconciler),
    }
}

#[tokio::test]
async fn responded_poll_terminates_with_an_event() {
    let platform = ScriptedPlatform::new(vec![snapshot(
        "responded",
        Some("schedule TF-CBT intake"),
    )]);
    let mut fx = fixture(platform.clone(), false).await;
    let handle = fx.reconciler.take().expect("reconciler").spawn();

    let event = tokio::time::timeout(Duration::from_secs(2), fx.events.recv())
        .await
        .expect("event before timeout")
        .expect("channel open");

    match event {
        SessionEvent::SpecialistResponded {
            session_id,
            handoff_id,
            message,
        } => {
            assert_eq!(session_id, fx.session_id);
            assert_eq!(handoff_id, "H1");
            assert_eq!(message.as_deref(), Some("schedule TF-CBT intake"));
        }
        other => panic!("expected SpecialistResponded, got {other:?}"),
    }

    handle.await_completion().await;
    assert_eq!(platform.polls(), 1);

    let session_handle = fx.store.get(&fx.session_id).await.expect("session");
    let session = session_handle.lock().await;
    assert_eq!(session.handoffs[0].status, HandoffStatus::Responded);
    assert!(session.handoffs[0].last_polled_at.is_some());
    assert_eq!(
        session.handoffs[0].specialist_message.as_deref(),
        Some("schedule TF-CBT intake")
    );
}

#[tokio::test]
async fn unrecognized_state_keeps_the_loop_polling() {
    let platform = ScriptedPlatform::new(vec![
        snapshot("escalated", None),
        snapshot("responded", None),
    ]);
    let mut fx = fixture(platform.clone(), false).await;
    let handle = fx.reconciler.take().expect("reconciler").spawn();

    let first = tokio::time::timeout(Duration::from_secs(2), fx.events.recv())
        .await
        .expect("event")
        .expect("open");
    assert!(
        matches!(
            first,
            SessionEvent::HandoffStatusChanged {
                status: HandoffStatus::UnderReview,
                ..
            }
        ),
        "got {first:?}"
    );

    let second = tokio::time::timeout(Duration::from_secs(2), fx.events.recv())
        .await
        .expect("event")
        .expect("open");
    assert!(matches!(second, SessionEvent::SpecialistResponded { .. }));

    handle.await_completion().await;
    assert_eq!(platform.polls(), 2);
}

#[tokio::test]
async fn transient_failures_never_end_the_loop() {
    let platform = ScriptedPlatform::new(vec![
        Err(AppError::Network("gateway timeout".into())),
        Err(AppError::Network("gateway timeout".into())),
        snapshot("responded", None),
    ]);
    let mut fx = fixture(platform.clone(), false).await;
    let handle = fx.reconciler.take().expect("reconciler").spawn();

    let event = tokio::time::timeout(Duration::from_secs(3), fx.events.recv())
        .await
        .expect("event before timeout")
        .expect("channel open");
    assert!(matches!(event, SessionEvent::SpecialistResponded { .. }));

    handle.await_completion().await;
    assert_eq!(platform.polls(), 3, "both failures must be retried");
}

#[tokio::test]
async fn auth_rejection_fails_the_handoff_terminally() {
    let platform = ScriptedPlatform::new(vec![Err(AppError::Auth("token revoked".into()))]);
    let mut fx = fixture(platform.clone(), false).await;
    let handle = fx.reconciler.take().expect("reconciler").spawn();

    let event = tokio::time::timeout(Duration::from_secs(2), fx.events.recv())
        .await
        .expect("event")
        .expect("open");
    assert!(
        matches!(event, SessionEvent::HandoffFailed { .. }),
        "got {event:?}"
    );

    handle.await_completion().await;
    assert_eq!(platform.polls(), 1);

    let session_handle = fx.store.get(&fx.session_id).await.expect("session");
    assert_eq!(
        session_handle.lock().await.handoffs[0].status,
        HandoffStatus::Failed
    );
}

#[tokio::test]
async fn cancellation_stops_further_polls() {
    let platform = ScriptedPlatform::new(Vec::new());
    let mut fx = fixture(platform.clone(), false).await;
    let handle = fx.reconciler.take().expect("reconciler").spawn();

    // Let at least one poll happen, then cancel through the shared token
    // and wait for the task to join.
    tokio::time::sleep(Duration::from_millis(50)).await;
    fx.cancel.cancel();
    handle.await_completion().await;

    let observed = platform.polls();
    assert!(observed >= 1, "loop should have polled before cancel");

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(platform.polls(), observed, "no polls after completion");
}

#[tokio::test]
async fn archived_sessions_discard_poll_results() {
    let platform = ScriptedPlatform::new(vec![snapshot("responded", Some("late reply"))]);
    let mut fx = fixture(platform.clone(), true).await;
    let handle = fx.reconciler.take().expect("reconciler").spawn();

    // The first poll observes the archived session and exits.
    tokio::time::sleep(Duration::from_millis(100)).await;
    handle.await_completion().await;
    assert_eq!(platform.polls(), 1);

    let session_handle = fx.store.get(&fx.session_id).await.expect("session");
    let session = session_handle.lock().await;
    assert_eq!(
        session.handoffs[0].status,
        HandoffStatus::Submitted,
        "discarded result must not mutate the record"
    );
    assert!(fx.events.try_recv().is_err(), "no event for discarded poll");
}
