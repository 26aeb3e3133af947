//! Integration tests for submission retry, status reconciliation, and
//! archive cancellation.

use std::time::{Duration, Instant};

use care_relay::models::handoff::HandoffStatus;
use care_relay::models::session::SessionState;
use care_relay::models::turn::{ConversationTurn, TurnRole};
use care_relay::orchestrator::events::SessionEvent;
use care_relay::platform::StatusSnapshot;
use care_relay::AppError;

use super::test_helpers::{assessment_response, gaza_profile, harness, next_event, Harness};

/// Create a session with one turn and finalize it with the given severity.
async fn finalize_with_severity(fx: &Harness, severity: i64) -> String {
    fx.gateway.script(Ok(assessment_response(severity))).await;
    let session_id = fx
        .manager
        .create_session(gaza_profile())
        .await
        .expect("created");
    fx.manager
        .append_turn(
            &session_id,
            ConversationTurn::text(TurnRole::Subject, "she stopped sleeping"),
        )
        .await
        .expect("appended");
    let handle = fx
        .manager
        .finalize_session(&session_id)
        .await
        .expect("finalized");
    handle.wait().await.expect("report");
    session_id
}

#[tokio::test]
async fn network_failures_back_off_then_succeed() {
    let mut fx = harness();
    fx.platform
        .script_submit(Err(AppError::Network("connection reset".into())))
        .await;
    fx.platform
        .script_submit(Err(AppError::Network("connection reset".into())))
        .await;
    // Third attempt succeeds via the default acceptance.

    let started = Instant::now();
    let session_id = finalize_with_severity(&fx, 5).await;

    let first = next_event(&mut fx.events, 5).await;
    assert!(matches!(first, SessionEvent::ReportReady { .. }));

    let second = next_event(&mut fx.events, 10).await;
    assert!(
        matches!(second, SessionEvent::HandoffSubmitted { .. }),
        "got {second:?}"
    );

    // Two failures at 1s and 2s backoff before the successful attempt.
    assert!(
        started.elapsed() >= Duration::from_secs(3),
        "backoff must have doubled twice"
    );
    assert_eq!(fx.platform.submits(), 3);

    let session = fx
        .manager
        .session_snapshot(&session_id)
        .await
        .expect("snapshot");
    assert_eq!(session.handoffs.len(), 1);
    assert_eq!(session.handoffs[0].status, HandoffStatus::Submitted);
    assert_eq!(session.handoffs[0].submit_attempts, 3);
}

#[tokio::test]
async fn auth_rejection_fails_the_handoff_without_retrying() {
    let mut fx = harness();
    fx.platform
        .script_submit(Err(AppError::Auth("token revoked".into())))
        .await;

    let session_id = finalize_with_severity(&fx, 5).await;

    let first = next_event(&mut fx.events, 5).await;
    assert!(matches!(first, SessionEvent::ReportReady { .. }));
    let second = next_event(&mut fx.events, 5).await;
    assert!(
        matches!(second, SessionEvent::HandoffFailed { .. }),
        "got {second:?}"
    );

    assert_eq!(fx.platform.submits(), 1, "auth failures are not retried");
    let session = fx
        .manager
        .session_snapshot(&session_id)
        .await
        .expect("snapshot");
    assert_eq!(session.handoffs[0].status, HandoffStatus::Failed);
}

#[tokio::test]
async fn unrecognized_platform_state_maps_to_under_review() {
    let mut fx = harness();
    fx.platform
        .script_status(Ok(StatusSnapshot {
            state: "escalated".into(),
            specialist_message: None,
        }))
        .await;
    fx.platform
        .script_status(Ok(StatusSnapshot {
            state: "responded".into(),
            specialist_message: Some("schedule an intake call".into()),
        }))
        .await;

    let session_id = finalize_with_severity(&fx, 5).await;

    let first = next_event(&mut fx.events, 5).await;
    assert!(matches!(first, SessionEvent::ReportReady { .. }));
    let second = next_event(&mut fx.events, 5).await;
    assert!(matches!(second, SessionEvent::HandoffSubmitted { .. }));

    let third = next_event(&mut fx.events, 5).await;
    assert!(
        matches!(
            third,
            SessionEvent::HandoffStatusChanged {
                status: HandoffStatus::UnderReview,
                ..
            }
        ),
        "unknown state must map to UnderReview, got {third:?}"
    );

    let fourth = next_event(&mut fx.events, 5).await;
    match fourth {
        SessionEvent::SpecialistResponded { message, .. } => {
            assert_eq!(message.as_deref(), Some("schedule an intake call"));
        }
        other => panic!("expected SpecialistResponded, got {other:?}"),
    }

    let session = fx
        .manager
        .session_snapshot(&session_id)
        .await
        .expect("snapshot");
    assert_eq!(session.handoffs[0].status, HandoffStatus::Responded);
    assert_eq!(
        session.handoffs[0].specialist_message.as_deref(),
        Some("schedule an intake call")
    );
    assert_eq!(fx.platform.polls(), 2);
}

#[tokio::test]
async fn archive_stops_status_polls_deterministically() {
    let mut fx = harness();
    // Default status: under_review forever.

    let session_id = finalize_with_severity(&fx, 5).await;

    let first = next_event(&mut fx.events, 5).await;
    assert!(matches!(first, SessionEvent::ReportReady { .. }));
    let second = next_event(&mut fx.events, 5).await;
    assert!(matches!(second, SessionEvent::HandoffSubmitted { .. }));

    // Let the reconciler registration land, then archive before the first
    // poll interval (1s) elapses.
    tokio::time::sleep(Duration::from_millis(100)).await;
    fx.manager
        .archive_session(&session_id)
        .await
        .expect("archived");

    let polls_at_archive = fx.platform.polls();

    // Well past several poll intervals: the count must not move.
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(
        fx.platform.polls(),
        polls_at_archive,
        "no polls after archive returns"
    );

    let session = fx
        .manager
        .session_snapshot(&session_id)
        .await
        .expect("snapshot");
    assert_eq!(session.state, SessionState::Archived);
}

#[tokio::test]
async fn shutdown_drains_background_work() {
    let fx = harness();
    let _session_id = finalize_with_severity(&fx, 5).await;

    // Give the pipeline time to submit and start reconciling.
    tokio::time::sleep(Duration::from_millis(200)).await;
    fx.manager.shutdown().await;

    let polls_at_shutdown = fx.platform.polls();
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(
        fx.platform.polls(),
        polls_at_shutdown,
        "no reconciler survives shutdown"
    );
}
