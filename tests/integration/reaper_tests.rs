//! Integration tests for the idle reaper sweep.

use std::time::Duration;

use browser_warden::models::session::{CreateSessionRequest, SessionStatus};

use super::test_helpers::test_stack;

#[tokio::test]
async fn timed_out_session_is_stopped_on_sweep() {
    let dir = tempfile::tempdir().expect("tempdir");
    let stack = test_stack(dir.path()).await;

    // Zero-second override: any measurable idleness exceeds the timeout.
    let session = stack
        .orchestrator
        .create_session(CreateSessionRequest {
            launch_options: None,
            idle_timeout_seconds: Some(0),
            profile: None,
        })
        .await
        .expect("create");
    stack
        .orchestrator
        .start_session(&session.id)
        .await
        .expect("start");

    tokio::time::sleep(Duration::from_millis(50)).await;
    stack.orchestrator.reap_idle_sessions().await;

    let record = stack
        .orchestrator
        .get_session(&session.id)
        .await
        .expect("get");
    assert_eq!(record.status, SessionStatus::Idle, "reaper stopped it");
    assert!(record.is_consistent());
}

#[tokio::test]
async fn session_within_window_survives_sweep() {
    let dir = tempfile::tempdir().expect("tempdir");
    let stack = test_stack(dir.path()).await;

    let session = stack
        .orchestrator
        .create_session(CreateSessionRequest {
            launch_options: None,
            idle_timeout_seconds: Some(3600),
            profile: None,
        })
        .await
        .expect("create");
    stack
        .orchestrator
        .start_session(&session.id)
        .await
        .expect("start");

    stack.orchestrator.reap_idle_sessions().await;

    let record = stack
        .orchestrator
        .get_session(&session.id)
        .await
        .expect("get");
    assert_eq!(record.status, SessionStatus::Active, "not reaped");
}

#[tokio::test]
async fn touch_defers_the_reaper() {
    let dir = tempfile::tempdir().expect("tempdir");
    let stack = test_stack(dir.path()).await;

    let session = stack
        .orchestrator
        .create_session(CreateSessionRequest {
            launch_options: None,
            idle_timeout_seconds: Some(1),
            profile: None,
        })
        .await
        .expect("create");
    stack
        .orchestrator
        .start_session(&session.id)
        .await
        .expect("start");

    // Activity keeps arriving within the window.
    stack.orchestrator.touch_session(&session.id).await;
    stack.orchestrator.reap_idle_sessions().await;

    let record = stack
        .orchestrator
        .get_session(&session.id)
        .await
        .expect("get");
    assert_eq!(record.status, SessionStatus::Active);
}

#[tokio::test]
async fn idle_sessions_are_not_swept() {
    let dir = tempfile::tempdir().expect("tempdir");
    let stack = test_stack(dir.path()).await;

    // Never started: the reaper only looks at active sessions.
    let session = stack
        .orchestrator
        .create_session(CreateSessionRequest {
            launch_options: None,
            idle_timeout_seconds: Some(0),
            profile: None,
        })
        .await
        .expect("create");

    tokio::time::sleep(Duration::from_millis(20)).await;
    stack.orchestrator.reap_idle_sessions().await;

    let record = stack
        .orchestrator
        .get_session(&session.id)
        .await
        .expect("get");
    assert_eq!(record.status, SessionStatus::Idle);
}
