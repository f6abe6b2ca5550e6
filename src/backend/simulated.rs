//! Scripted in-process engine
//!
//! Stands in for the real decode engines in the demo binary and in tests.
//! Each instance runs a worker thread that walks a [`SimScript`]: prepare,
//! buffer, render, tick the position, and optionally fail or freeze.

use log::{debug, trace, warn};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::engine::{EngineEvent, EngineFailure, EngineListener, EngineProvider, MediaEngine};
use super::surface::OutputSurface;
use super::tuning::EngineTuning;
use super::{legacy, native, BackendErrorKind, BackendVariant};
use crate::utils::error::{EngineError, Result};

const POLL: Duration = Duration::from_millis(5);

/// Canned behaviors for the demo binary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scenario {
    #[default]
    Healthy,
    /// The first backend cannot decode the stream
    CodecFailure,
    /// The first instance freezes a few seconds in
    Stall,
    /// The first two instances drop their connection
    NetworkFlap,
    /// Seek completion is reported, for devices needing a resync seek
    AvOffset,
}

impl FromStr for Scenario {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "healthy" => Ok(Scenario::Healthy),
            "codec-failure" => Ok(Scenario::CodecFailure),
            "stall" => Ok(Scenario::Stall),
            "network-flap" => Ok(Scenario::NetworkFlap),
            "av-offset" => Ok(Scenario::AvOffset),
            other => Err(EngineError::InvalidRequest(format!("Unknown scenario '{}'", other))),
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Scenario::Healthy => "healthy",
            Scenario::CodecFailure => "codec-failure",
            Scenario::Stall => "stall",
            Scenario::NetworkFlap => "network-flap",
            Scenario::AvOffset => "av-offset",
        })
    }
}

/// What simulated engines do, and when
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimScript {
    pub prepare_delay_ms: u64,
    pub buffering_ms: u64,
    pub tick_ms: u64,
    /// Variants that report an unsupported codec once started
    pub codec_failure_on: Vec<BackendVariant>,
    /// Freeze the position this long after the first frame
    pub stall_after_ms: Option<u64>,
    /// How many instances (in creation order) freeze
    pub stall_instances: u32,
    /// Report a network failure this long after the first frame
    pub network_failure_after_ms: u64,
    /// How many instances (in creation order) lose the network
    pub network_failures: u32,
    /// Never emit the first-frame notification
    pub suppress_first_frame: bool,
    /// Report seek completion
    pub seek_completes: bool,
    /// Finite stream length; `None` is live
    pub duration_ms: Option<u64>,
}

impl Default for SimScript {
    fn default() -> Self {
        Self {
            prepare_delay_ms: 150,
            buffering_ms: 300,
            tick_ms: 250,
            codec_failure_on: Vec::new(),
            stall_after_ms: None,
            stall_instances: 0,
            network_failure_after_ms: 2_000,
            network_failures: 0,
            suppress_first_frame: false,
            seek_completes: true,
            duration_ms: None,
        }
    }
}

impl SimScript {
    pub fn for_scenario(scenario: Scenario) -> Self {
        let base = SimScript::default();
        match scenario {
            Scenario::Healthy | Scenario::AvOffset => base,
            Scenario::CodecFailure => SimScript {
                codec_failure_on: vec![BackendVariant::Modern, BackendVariant::Native],
                ..base
            },
            Scenario::Stall => SimScript {
                stall_after_ms: Some(3_000),
                stall_instances: 1,
                ..base
            },
            Scenario::NetworkFlap => SimScript {
                network_failures: 2,
                ..base
            },
        }
    }
}

/// A failure this variant's adapter classifies as `kind`
pub fn sample_failure(variant: BackendVariant, kind: BackendErrorKind) -> EngineFailure {
    match (variant, kind) {
        (BackendVariant::Modern, BackendErrorKind::CodecUnsupported) => {
            EngineFailure::new(4003, "ERROR_CODE_DECODING_FAILED")
                .with_detail("MediaCodecVideoDecoderException")
        }
        (BackendVariant::Modern, BackendErrorKind::Network) => {
            EngineFailure::new(2001, "ERROR_CODE_IO_NETWORK_CONNECTION_FAILED")
        }
        (BackendVariant::Legacy, BackendErrorKind::CodecUnsupported) => {
            let name = "MediaCodecRenderer$DecoderInitializationException";
            EngineFailure::new(legacy::TYPE_RENDERER, name)
        }
        (BackendVariant::Legacy, BackendErrorKind::Network) => {
            EngineFailure::new(legacy::TYPE_SOURCE, "HttpDataSourceException")
        }
        (BackendVariant::Alternate, BackendErrorKind::CodecUnsupported) => {
            EngineFailure::new(0, "EncounteredError").with_detail("No suitable decoder module")
        }
        (BackendVariant::Alternate, BackendErrorKind::Network) => {
            EngineFailure::new(0, "EncounteredError").with_detail("Connection reset by peer")
        }
        (BackendVariant::Native, BackendErrorKind::CodecUnsupported) => {
            EngineFailure::new(native::ERROR_UNSUPPORTED, "MEDIA_ERROR_UNSUPPORTED")
        }
        (BackendVariant::Native, BackendErrorKind::Network) => {
            EngineFailure::new(native::ERROR_IO, "MEDIA_ERROR_IO")
        }
        (_, BackendErrorKind::Unknown) => EngineFailure::new(-1, "SIMULATED_UNKNOWN"),
    }
}

/// Per-instance plan fixed at creation
#[derive(Debug, Clone)]
struct InstancePlan {
    variant: BackendVariant,
    codec_failure: bool,
    stall_after_ms: Option<u64>,
    network_failure_after_ms: Option<u64>,
}

#[derive(Debug, Default)]
struct SimState {
    started: bool,
    playing: bool,
    position_ms: u64,
    volume: f32,
    pending_seek: Option<u64>,
    output_attached: bool,
}

struct Shared {
    state: Mutex<SimState>,
    listener: RwLock<Option<EngineListener>>,
    stop: AtomicBool,
}

impl Shared {
    fn emit(&self, event: EngineEvent) {
        if self.stop.load(Ordering::SeqCst) {
            return;
        }
        trace!("sim event {:?}", event);
        if let Some(listener) = self.listener.read().as_ref() {
            listener(event);
        }
    }

    /// Sleep in small steps; false once stopped
    fn sleep(&self, ms: u64) -> bool {
        let deadline = Instant::now() + Duration::from_millis(ms);
        while Instant::now() < deadline {
            if self.stop.load(Ordering::SeqCst) {
                return false;
            }
            thread::sleep(POLL.min(deadline.saturating_duration_since(Instant::now())));
        }
        !self.stop.load(Ordering::SeqCst)
    }
}

/// One simulated engine instance
pub struct SimulatedEngine {
    plan: InstancePlan,
    script: SimScript,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl SimulatedEngine {
    fn new(plan: InstancePlan, script: SimScript) -> Self {
        Self {
            plan,
            script,
            shared: Arc::new(Shared {
                state: Mutex::new(SimState {
                    volume: 1.0,
                    ..SimState::default()
                }),
                listener: RwLock::new(None),
                stop: AtomicBool::new(false),
            }),
            worker: None,
        }
    }
}

fn run_worker(shared: Arc<Shared>, plan: InstancePlan, script: SimScript) {
    let percent_buffering = plan.variant == BackendVariant::Alternate;

    if !shared.sleep(script.prepare_delay_ms) {
        return;
    }
    shared.emit(EngineEvent::Prepared);

    while !shared.state.lock().started {
        if !shared.sleep(POLL.as_millis() as u64) {
            return;
        }
    }

    if plan.codec_failure {
        if shared.sleep(script.buffering_ms) {
            let failure = sample_failure(plan.variant, BackendErrorKind::CodecUnsupported);
            shared.emit(EngineEvent::Failure(failure));
        }
        return;
    }

    shared.emit(if percent_buffering {
        EngineEvent::BufferingPercent(0.0)
    } else {
        EngineEvent::BufferingStart
    });
    if !shared.sleep(script.buffering_ms) {
        return;
    }
    shared.emit(if percent_buffering {
        EngineEvent::BufferingPercent(100.0)
    } else {
        EngineEvent::BufferingEnd
    });
    if !script.suppress_first_frame {
        shared.emit(EngineEvent::RenderingStart);
    }

    let rendering_since = Instant::now();
    loop {
        if !shared.sleep(script.tick_ms) {
            return;
        }
        let elapsed = rendering_since.elapsed().as_millis() as u64;

        if let Some(after) = plan.network_failure_after_ms {
            if elapsed >= after {
                let failure = sample_failure(plan.variant, BackendErrorKind::Network);
                shared.emit(EngineEvent::Failure(failure));
                return;
            }
        }

        let frozen = plan.stall_after_ms.map(|after| elapsed >= after).unwrap_or(false);
        let (seeked, tick) = {
            let mut state = shared.state.lock();
            let seeked = state.pending_seek.take();
            if let Some(target) = seeked {
                state.position_ms = target;
            }
            let tick = if state.playing && !frozen {
                state.position_ms += script.tick_ms;
                Some(state.position_ms)
            } else {
                None
            };
            (seeked, tick)
        };

        if seeked.is_some() && script.seek_completes {
            shared.emit(EngineEvent::SeekComplete);
        }
        if let Some(position) = tick {
            shared.emit(EngineEvent::TimeChanged(position));
            if script.duration_ms.map(|d| position >= d).unwrap_or(false) {
                shared.emit(EngineEvent::EndReached);
                return;
            }
        }
    }
}

impl MediaEngine for SimulatedEngine {
    fn configure(&mut self, tuning: &EngineTuning) -> Result<()> {
        debug!("Simulated {} engine configured: {:?}", self.plan.variant, tuning);
        Ok(())
    }

    fn set_listener(&mut self, listener: EngineListener) {
        *self.shared.listener.write() = Some(listener);
    }

    fn open(&mut self, url: &str) -> Result<()> {
        if self.worker.is_some() {
            return Err(EngineError::InvalidRequest("engine already opened".into()));
        }
        debug!("Simulated {} engine opening {}", self.plan.variant, url);
        let shared = Arc::clone(&self.shared);
        let plan = self.plan.clone();
        let script = self.script.clone();
        let handle = thread::Builder::new()
            .name(format!("sim-{}", self.plan.variant))
            .spawn(move || run_worker(shared, plan, script))?;
        self.worker = Some(handle);
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        let mut state = self.shared.state.lock();
        state.started = true;
        state.playing = true;
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.shared.state.lock().playing = false;
        Ok(())
    }

    fn seek_to(&mut self, position_ms: u64) -> Result<()> {
        self.shared.state.lock().pending_seek = Some(position_ms);
        Ok(())
    }

    fn position_ms(&self) -> u64 {
        self.shared.state.lock().position_ms
    }

    fn duration_ms(&self) -> Option<u64> {
        self.script.duration_ms
    }

    fn is_playing(&self) -> bool {
        self.shared.state.lock().playing
    }

    fn set_volume(&mut self, volume: f32) -> Result<()> {
        self.shared.state.lock().volume = volume.clamp(0.0, 1.0);
        Ok(())
    }

    fn attach_output(&mut self, surface: &OutputSurface) -> Result<()> {
        trace!(
            "Simulated {} engine rendering to surface held by {:?}",
            self.plan.variant,
            surface.holder()
        );
        self.shared.state.lock().output_attached = true;
        Ok(())
    }

    fn detach_output(&mut self) {
        self.shared.state.lock().output_attached = false;
    }

    fn shutdown(&mut self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        *self.shared.listener.write() = None;
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                warn!("Simulated {} engine worker panicked", self.plan.variant);
            }
        }
        let mut state = self.shared.state.lock();
        state.playing = false;
        state.output_attached = false;
    }
}

impl Drop for SimulatedEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Hands out simulated engines following one script
pub struct SimulatedEngineProvider {
    script: SimScript,
    created: Mutex<HashMap<BackendVariant, u32>>,
}

impl SimulatedEngineProvider {
    pub fn new(script: SimScript) -> Self {
        Self {
            script,
            created: Mutex::new(HashMap::new()),
        }
    }

    pub fn for_scenario(scenario: Scenario) -> Self {
        Self::new(SimScript::for_scenario(scenario))
    }

    /// Engines created so far for `variant`
    pub fn created(&self, variant: BackendVariant) -> u32 {
        self.created.lock().get(&variant).copied().unwrap_or(0)
    }
}

impl EngineProvider for SimulatedEngineProvider {
    fn create_engine(&self, variant: BackendVariant) -> Result<Box<dyn MediaEngine>> {
        let index = {
            let mut created = self.created.lock();
            let total: u32 = created.values().sum();
            *created.entry(variant).or_insert(0) += 1;
            total
        };

        let plan = InstancePlan {
            variant,
            codec_failure: self.script.codec_failure_on.contains(&variant),
            stall_after_ms: self
                .script
                .stall_after_ms
                .filter(|_| index < self.script.stall_instances),
            network_failure_after_ms: (index < self.script.network_failures)
                .then_some(self.script.network_failure_after_ms),
        };
        debug!("Creating simulated {} engine #{}: {:?}", variant, index, plan);
        Ok(Box::new(SimulatedEngine::new(plan, self.script.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{adapter_for, BackendEvent};
    use crossbeam_channel::unbounded;

    #[test]
    fn test_scenario_names_round_trip() {
        for scenario in [
            Scenario::Healthy,
            Scenario::CodecFailure,
            Scenario::Stall,
            Scenario::NetworkFlap,
            Scenario::AvOffset,
        ] {
            assert_eq!(scenario.to_string().parse::<Scenario>().unwrap(), scenario);
        }
        assert!("bogus".parse::<Scenario>().is_err());
    }

    #[test]
    fn test_sample_failures_classify_as_intended() {
        for variant in BackendVariant::ALL {
            let translator = adapter_for(variant).translator();
            for kind in [
                BackendErrorKind::CodecUnsupported,
                BackendErrorKind::Network,
                BackendErrorKind::Unknown,
            ] {
                match translator.translate(EngineEvent::Failure(sample_failure(variant, kind))) {
                    Some(BackendEvent::Error { kind: got, .. }) => {
                        assert_eq!(got, kind, "{} {:?}", variant, kind)
                    }
                    other => panic!("unexpected {:?}", other),
                }
            }
        }
    }

    #[test]
    fn test_engine_walks_script() {
        let provider = SimulatedEngineProvider::new(SimScript {
            prepare_delay_ms: 5,
            buffering_ms: 5,
            tick_ms: 5,
            ..SimScript::default()
        });
        let mut engine = provider.create_engine(BackendVariant::Modern).unwrap();
        let (tx, rx) = unbounded();
        engine.set_listener(Box::new(move |event| {
            let _ = tx.send(event);
        }));
        engine.open("http://sim/stream").unwrap();

        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), EngineEvent::Prepared);
        engine.start().unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), EngineEvent::BufferingStart);
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), EngineEvent::BufferingEnd);
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), EngineEvent::RenderingStart);
        assert!(matches!(
            rx.recv_timeout(Duration::from_secs(2)).unwrap(),
            EngineEvent::TimeChanged(_)
        ));

        engine.shutdown();
        assert!(!engine.is_playing());
        assert_eq!(provider.created(BackendVariant::Modern), 1);
    }

    #[test]
    fn test_instance_plans_follow_creation_order() {
        let provider = SimulatedEngineProvider::for_scenario(Scenario::NetworkFlap);
        let _a = provider.create_engine(BackendVariant::Modern).unwrap();
        let _b = provider.create_engine(BackendVariant::Modern).unwrap();
        let _c = provider.create_engine(BackendVariant::Legacy).unwrap();
        assert_eq!(provider.created(BackendVariant::Modern), 2);
        assert_eq!(provider.created(BackendVariant::Legacy), 1);
    }
}
