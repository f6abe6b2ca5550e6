//! Access gate integration tests
//!
//! The gate is mocked with mockall so each test controls exactly what the
//! supervisor hears when it asks.

use anyhow::Result;
use mockall::mock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use stbplay::backend::simulated::Scenario;
use stbplay::{
    AccessDecision, AccessGate, PlaybackEvent, SessionState, StopReason, SupervisorConfig,
};
use stbplay_integration_tests::{EngineFixtureBuilder, FAST_CONFIG, TEST_URL};

mock! {
    pub Gate {}

    impl AccessGate for Gate {
        fn check_access(&self) -> AccessDecision;
    }
}

#[tokio::test]
async fn test_denied_request_never_starts() -> Result<()> {
    let mut gate = MockGate::new();
    gate.expect_check_access().times(1).return_const(AccessDecision::Denied);

    let fixture = EngineFixtureBuilder::new(Scenario::Healthy)
        .with_access_gate(Arc::new(gate))
        .start()?;
    fixture.engine.play("Premium", TEST_URL)?;

    sleep(Duration::from_millis(200)).await;
    assert_eq!(fixture.engine.status().state, SessionState::Idle);
    assert_eq!(fixture.events.count(|e| matches!(e, PlaybackEvent::PlaybackStarted { .. })), 0);
    assert_eq!(fixture.surface.holder(), None);

    fixture.engine.shutdown()?;
    Ok(())
}

#[tokio::test]
async fn test_periodic_recheck_stops_playback() -> Result<()> {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let mut gate = MockGate::new();
    gate.expect_check_access().returning(move || {
        if counter.fetch_add(1, Ordering::SeqCst) < 2 {
            AccessDecision::Allowed
        } else {
            AccessDecision::Denied
        }
    });

    let fixture = EngineFixtureBuilder::new(Scenario::Healthy)
        .with_access_gate(Arc::new(gate))
        .start()?;
    fixture.engine.play("Premium", TEST_URL)?;

    assert!(
        fixture
            .wait_for_event(|e| matches!(
                e,
                PlaybackEvent::PlaybackStopped { reason: StopReason::AccessDenied }
            ))
            .await
    );
    assert!(
        fixture
            .wait_for_status(|s| s.state == SessionState::Stopped && s.variant.is_none())
            .await
    );
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(fixture.surface.holder(), None);

    fixture.engine.shutdown()?;
    Ok(())
}

#[tokio::test]
async fn test_revocation_stops_immediately() -> Result<()> {
    let mut gate = MockGate::new();
    gate.expect_check_access().return_const(AccessDecision::Allowed);

    let fixture = EngineFixtureBuilder::new(Scenario::Healthy)
        .with_access_gate(Arc::new(gate))
        .start()?;
    fixture.engine.play("Premium", TEST_URL)?;
    assert!(fixture.wait_for_status(|s| s.state == SessionState::Rendering).await);

    fixture.engine.revoke_access()?;
    assert!(fixture.wait_for_status(|s| s.state == SessionState::Stopped).await);
    assert_eq!(
        fixture
            .events
            .count(|e| matches!(
                e,
                PlaybackEvent::PlaybackStopped { reason: StopReason::AccessDenied }
            )),
        1
    );

    fixture.engine.shutdown()?;
    Ok(())
}

#[tokio::test]
async fn test_resume_rechecks_access() -> Result<()> {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let mut gate = MockGate::new();
    // Allowed for play() only.
    gate.expect_check_access().returning(move || {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            AccessDecision::Allowed
        } else {
            AccessDecision::Denied
        }
    });

    let config = SupervisorConfig {
        access_check_interval_ms: 60_000,
        ..FAST_CONFIG.clone()
    };
    let fixture = EngineFixtureBuilder::new(Scenario::Healthy)
        .with_config(config)
        .with_access_gate(Arc::new(gate))
        .start()?;
    fixture.engine.play("Premium", TEST_URL)?;
    assert!(fixture.wait_for_status(|s| s.state == SessionState::Rendering).await);
    fixture.engine.pause()?;
    fixture.engine.resume()?;

    assert!(
        fixture
            .wait_for_event(|e| matches!(
                e,
                PlaybackEvent::PlaybackStopped { reason: StopReason::AccessDenied }
            ))
            .await
    );
    assert_eq!(fixture.engine.status().state, SessionState::Stopped);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    fixture.engine.shutdown()?;
    Ok(())
}
