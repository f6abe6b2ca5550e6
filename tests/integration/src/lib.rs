//! Integration test utilities for stbplay
//!
//! This module provides common utilities for integration testing including:
//! - Fast simulated-engine scripts and supervisor timings
//! - A running engine fixture with an event log
//! - Polling helpers

use anyhow::Result;
use once_cell::sync::Lazy;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{sleep, Instant};

use stbplay::access::AllowAll;
use stbplay::backend::simulated::{Scenario, SimScript, SimulatedEngineProvider};
use stbplay::backend::OutputSurface;
use stbplay::supervisor::EventSubscription;
use stbplay::{
    AccessGate, DeviceProfile, EngineBackendFactory, EngineStatus, PlatformInfo, PlaybackEngine,
    PlaybackEvent, PlaybackSettings, PlaybackSupervisor, SupervisorConfig,
};

/// How long any wait in these tests may take
pub const WAIT_LIMIT: Duration = Duration::from_secs(5);

/// Stream used by every scenario
pub const TEST_URL: &str = "http://sim.invalid/live/test.m3u8";

/// Supervisor timings scaled down for tests
pub static FAST_CONFIG: Lazy<SupervisorConfig> = Lazy::new(|| SupervisorConfig {
    sample_interval_ms: 50,
    stall_threshold_ms: 300,
    stall_grace_ms: 100,
    restart_delay_ms: 20,
    max_restarts: 3,
    restart_budget_reset_ms: 60_000,
    access_check_interval_ms: 100,
    spinner_fallback_ms: 500,
    delayed_spinner_ms: 50,
    resync_timeout_ms: 200,
    resync_settle_ms: 30,
});

/// Scenario script with every delay scaled down
pub fn fast_script(scenario: Scenario) -> SimScript {
    let script = SimScript::for_scenario(scenario);
    SimScript {
        prepare_delay_ms: 20,
        buffering_ms: 20,
        tick_ms: 20,
        network_failure_after_ms: 100,
        stall_after_ms: script.stall_after_ms.map(|_| 100),
        ..script
    }
}

/// Thread-safe record of every playback event
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<PlaybackEvent>>>,
}

impl EventLog {
    pub fn push(&self, event: &PlaybackEvent) {
        self.events.lock().unwrap().push(event.clone());
    }

    pub fn snapshot(&self) -> Vec<PlaybackEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count<F: Fn(&PlaybackEvent) -> bool>(&self, pred: F) -> usize {
        self.events.lock().unwrap().iter().filter(|e| pred(e)).count()
    }
}

/// Builder for a running engine on the simulated backends
pub struct EngineFixtureBuilder {
    info: PlatformInfo,
    settings: PlaybackSettings,
    scenario: Scenario,
    script: Option<SimScript>,
    config: SupervisorConfig,
    gate: Arc<dyn AccessGate>,
}

impl EngineFixtureBuilder {
    pub fn new(scenario: Scenario) -> Self {
        Self {
            info: PlatformInfo::default(),
            settings: PlaybackSettings::default(),
            scenario,
            script: None,
            config: FAST_CONFIG.clone(),
            gate: Arc::new(AllowAll),
        }
    }

    pub fn with_platform(mut self, info: PlatformInfo) -> Self {
        self.info = info;
        self
    }

    pub fn with_settings(mut self, settings: PlaybackSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_script(mut self, script: SimScript) -> Self {
        self.script = Some(script);
        self
    }

    pub fn with_config(mut self, config: SupervisorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_access_gate(mut self, gate: Arc<dyn AccessGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn start(self) -> Result<EngineFixture> {
        let script = self.script.unwrap_or_else(|| fast_script(self.scenario));
        let provider = Arc::new(SimulatedEngineProvider::new(script));
        let surface = OutputSurface::new();

        let factory = EngineBackendFactory::new(provider.clone());
        let supervisor = PlaybackSupervisor::builder(Box::new(factory))
            .with_profile(Arc::new(DeviceProfile::classify(&self.info)))
            .with_settings(self.settings)
            .with_config(self.config)
            .with_access_gate(self.gate)
            .with_surface(surface.clone())
            .build()?;

        let events = EventLog::default();
        let log = events.clone();
        let subscription = supervisor.dispatcher().subscribe(move |event| log.push(event));
        let engine = PlaybackEngine::spawn(supervisor)?;

        Ok(EngineFixture {
            engine,
            provider,
            surface,
            events,
            _subscription: subscription,
        })
    }
}

/// A running engine plus the handles tests inspect
pub struct EngineFixture {
    pub engine: PlaybackEngine,
    pub provider: Arc<SimulatedEngineProvider>,
    pub surface: OutputSurface,
    pub events: EventLog,
    _subscription: EventSubscription,
}

impl EngineFixture {
    /// Poll the engine status until `pred` holds
    pub async fn wait_for_status<F: Fn(&EngineStatus) -> bool>(&self, pred: F) -> bool {
        let deadline = Instant::now() + WAIT_LIMIT;
        while Instant::now() < deadline {
            if pred(&self.engine.status()) {
                return true;
            }
            sleep(Duration::from_millis(10)).await;
        }
        false
    }

    /// Poll the event log until `pred` matches at least one event
    pub async fn wait_for_event<F: Fn(&PlaybackEvent) -> bool>(&self, pred: F) -> bool {
        let deadline = Instant::now() + WAIT_LIMIT;
        while Instant::now() < deadline {
            if self.events.count(&pred) > 0 {
                return true;
            }
            sleep(Duration::from_millis(10)).await;
        }
        false
    }
}
