//! Integration tests for the threaded playback engine
//!
//! These tests run the full stack on the simulated engines:
//! - Backend selection and escalation
//! - In-place restarts after network loss and freezes
//! - Mute and resync on offset-prone devices
//! - Surface ownership across all of the above

use anyhow::Result;
use std::time::Duration;
use tokio::time::sleep;

use stbplay::backend::simulated::{Scenario, SimScript};
use stbplay::backend::surface::journal_is_exclusive;
use stbplay::{
    BackendPreference, BackendVariant, EngineError, PlatformInfo, PlaybackEvent, PlaybackSettings,
    SessionState, StopReason,
};
use stbplay_integration_tests::{fast_script, EngineFixtureBuilder, TEST_URL};

fn preference(preference: BackendPreference) -> PlaybackSettings {
    PlaybackSettings {
        backend_preference: preference,
        ..PlaybackSettings::default()
    }
}

#[tokio::test]
async fn test_healthy_stream_renders_and_stops() -> Result<()> {
    let fixture = EngineFixtureBuilder::new(Scenario::Healthy).start()?;
    fixture.engine.play("News", TEST_URL)?;

    assert!(fixture.wait_for_status(|s| s.state == SessionState::Rendering).await);
    assert_eq!(fixture.engine.status().variant, Some(BackendVariant::Modern));
    assert!(fixture.wait_for_status(|s| s.position_ms > 0).await);

    fixture.engine.stop()?;
    assert!(fixture.wait_for_status(|s| s.state == SessionState::Stopped).await);
    assert!(
        fixture
            .wait_for_event(|e| matches!(
                e,
                PlaybackEvent::PlaybackStopped { reason: StopReason::UserStopped }
            ))
            .await
    );
    assert_eq!(fixture.surface.holder(), None);
    assert!(journal_is_exclusive(&fixture.surface.journal()));

    fixture.engine.shutdown()?;
    Ok(())
}

#[tokio::test]
async fn test_codec_failure_escalates_to_legacy() -> Result<()> {
    let fixture = EngineFixtureBuilder::new(Scenario::CodecFailure).start()?;
    fixture.engine.play("Movies", TEST_URL)?;

    assert!(
        fixture
            .wait_for_status(|s| {
                s.state == SessionState::Rendering && s.variant == Some(BackendVariant::Legacy)
            })
            .await
    );
    let switched = fixture.events.count(|e| {
        matches!(
            e,
            PlaybackEvent::BackendSwitched {
                from: BackendVariant::Modern,
                to: BackendVariant::Legacy
            }
        )
    });
    assert_eq!(switched, 1);
    assert_eq!(fixture.events.count(|e| matches!(e, PlaybackEvent::PlaybackFailed { .. })), 0);
    assert_eq!(fixture.provider.created(BackendVariant::Modern), 1);
    assert!(journal_is_exclusive(&fixture.surface.journal()));

    fixture.engine.shutdown()?;
    Ok(())
}

#[tokio::test]
async fn test_single_backend_failure_is_terminal() -> Result<()> {
    let fixture = EngineFixtureBuilder::new(Scenario::CodecFailure)
        .with_settings(preference(BackendPreference::Native))
        .start()?;
    fixture.engine.play("Movies", TEST_URL)?;

    assert!(fixture.wait_for_event(|e| matches!(e, PlaybackEvent::PlaybackFailed { .. })).await);
    assert!(
        fixture
            .wait_for_status(|s| s.state == SessionState::Stopped && s.variant.is_none())
            .await
    );
    assert_eq!(fixture.events.count(|e| matches!(e, PlaybackEvent::PlaybackFailed { .. })), 1);
    assert_eq!(fixture.events.count(|e| matches!(e, PlaybackEvent::BackendSwitched { .. })), 0);

    fixture.engine.shutdown()?;
    Ok(())
}

#[tokio::test]
async fn test_network_flap_restarts_in_place() -> Result<()> {
    let fixture = EngineFixtureBuilder::new(Scenario::NetworkFlap).start()?;
    fixture.engine.play("Sports", TEST_URL)?;

    assert!(
        fixture
            .wait_for_status(|s| s.state == SessionState::Rendering && s.restarts == 2)
            .await
    );
    assert_eq!(fixture.engine.status().variant, Some(BackendVariant::Modern));
    assert_eq!(fixture.provider.created(BackendVariant::Modern), 3);
    assert_eq!(fixture.events.count(|e| matches!(e, PlaybackEvent::BackendSwitched { .. })), 0);

    fixture.engine.shutdown()?;
    Ok(())
}

#[tokio::test]
async fn test_frozen_video_is_restarted() -> Result<()> {
    let fixture = EngineFixtureBuilder::new(Scenario::Stall).start()?;
    fixture.engine.play("Kids", TEST_URL)?;

    assert!(
        fixture
            .wait_for_status(|s| s.state == SessionState::Rendering && s.restarts == 1)
            .await
    );
    assert_eq!(fixture.provider.created(BackendVariant::Modern), 2);

    // The replacement keeps playing.
    let before = fixture.engine.status().position_ms;
    assert!(fixture.wait_for_status(|s| s.position_ms > before).await);
    assert_eq!(fixture.engine.status().restarts, 1);

    fixture.engine.shutdown()?;
    Ok(())
}

#[tokio::test]
async fn test_offset_device_unmutes_after_resync() -> Result<()> {
    let zte = PlatformInfo {
        api_level: 22,
        manufacturer: Some("ZTE".into()),
        model: Some("B760H".into()),
        ..PlatformInfo::default()
    };
    let fixture = EngineFixtureBuilder::new(Scenario::AvOffset)
        .with_platform(zte)
        .with_settings(preference(BackendPreference::Native))
        .start()?;
    fixture.engine.play("Music", TEST_URL)?;

    assert!(fixture.wait_for_event(|e| *e == PlaybackEvent::MuteChanged { muted: false }).await);
    assert!(!fixture.engine.status().muted);

    let events = fixture.events.snapshot();
    let muted_at = events.iter().position(|e| *e == PlaybackEvent::MuteChanged { muted: true });
    let rendering_at = events
        .iter()
        .position(|e| matches!(e, PlaybackEvent::StateChanged { to: SessionState::Rendering, .. }));
    let unmuted_at = events.iter().position(|e| *e == PlaybackEvent::MuteChanged { muted: false });
    assert!(muted_at.is_some() && rendering_at.is_some());
    assert!(muted_at < rendering_at);
    assert!(rendering_at < unmuted_at);

    fixture.engine.shutdown()?;
    Ok(())
}

#[tokio::test]
async fn test_pause_does_not_trigger_watchdog() -> Result<()> {
    let fixture = EngineFixtureBuilder::new(Scenario::Healthy).start()?;
    fixture.engine.play("News", TEST_URL)?;
    assert!(fixture.wait_for_status(|s| s.state == SessionState::Rendering).await);

    fixture.engine.pause()?;
    sleep(Duration::from_millis(600)).await;
    assert_eq!(fixture.engine.status().restarts, 0);
    assert_eq!(fixture.provider.created(BackendVariant::Modern), 1);

    fixture.engine.resume()?;
    let before = fixture.engine.status().position_ms;
    assert!(fixture.wait_for_status(|s| s.position_ms > before).await);

    fixture.engine.shutdown()?;
    Ok(())
}

#[tokio::test]
async fn test_new_request_replaces_session() -> Result<()> {
    let fixture = EngineFixtureBuilder::new(Scenario::Healthy).start()?;
    fixture.engine.play("News", TEST_URL)?;
    assert!(fixture.wait_for_status(|s| s.state == SessionState::Rendering).await);
    let first_generation = fixture.engine.status().generation;

    fixture.engine.play("Sports", "http://sim.invalid/live/sports.m3u8")?;
    assert!(
        fixture
            .wait_for_status(|s| {
                s.state == SessionState::Rendering && s.generation > first_generation
            })
            .await
    );
    assert_eq!(
        fixture
            .events
            .count(|e| matches!(
                e,
                PlaybackEvent::PlaybackStopped { reason: StopReason::Replaced }
            )),
        1
    );
    assert!(journal_is_exclusive(&fixture.surface.journal()));

    fixture.engine.shutdown()?;
    Ok(())
}

#[tokio::test]
async fn test_completed_stream_stops() -> Result<()> {
    let script = SimScript {
        duration_ms: Some(200),
        ..fast_script(Scenario::Healthy)
    };
    let fixture = EngineFixtureBuilder::new(Scenario::Healthy).with_script(script).start()?;
    fixture.engine.play("Clip", "http://sim.invalid/vod/clip.mp4")?;

    assert!(
        fixture
            .wait_for_event(|e| matches!(
                e,
                PlaybackEvent::PlaybackStopped { reason: StopReason::Completed }
            ))
            .await
    );
    assert_eq!(fixture.engine.status().state, SessionState::Stopped);

    fixture.engine.shutdown()?;
    Ok(())
}

#[tokio::test]
async fn test_blank_url_is_rejected() -> Result<()> {
    let fixture = EngineFixtureBuilder::new(Scenario::Healthy).start()?;
    assert!(matches!(fixture.engine.play("Nothing", "  "), Err(EngineError::InvalidRequest(_))));

    sleep(Duration::from_millis(50)).await;
    assert_eq!(fixture.engine.status().state, SessionState::Idle);
    assert!(fixture.events.snapshot().is_empty());

    fixture.engine.shutdown()?;
    Ok(())
}
