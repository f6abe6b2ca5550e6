//! Decode backend module for stbplay
//!
//! A backend turns a URL into rendered audio/video. Four variants share
//! the [`DecodeBackend`] contract; what differs between them lives in the
//! per-variant adapters (tuning translation and failure classification).
//! The third-party engines themselves sit behind [`engine::MediaEngine`].

pub mod alternate;
pub mod engine;
pub mod legacy;
pub mod modern;
pub mod native;
pub mod selector;
pub mod simulated;
pub mod surface;
pub mod tuning;

pub use engine::{EngineEvent, EngineFailure, EngineListener, EngineProvider, MediaEngine};
pub use selector::{escalation_chain, select_initial, select_next};
pub use surface::{OutputSurface, SurfaceOp};
pub use tuning::EngineTuning;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::device::DeviceProfile;
use crate::settings::PlaybackSettings;
use crate::utils::error::Result;

/// The four decode engines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendVariant {
    /// Modern general-purpose engine
    Modern,
    /// Older line of the same engine family
    Legacy,
    /// Third-party heavyweight engine
    Alternate,
    /// Minimal OS-native engine
    Native,
}

impl BackendVariant {
    pub const ALL: [BackendVariant; 4] = [
        BackendVariant::Modern,
        BackendVariant::Legacy,
        BackendVariant::Alternate,
        BackendVariant::Native,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BackendVariant::Modern => "modern",
            BackendVariant::Legacy => "legacy",
            BackendVariant::Alternate => "alternate",
            BackendVariant::Native => "native",
        }
    }
}

impl fmt::Display for BackendVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error classes a backend reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendErrorKind {
    /// This variant cannot decode the stream; escalate
    CodecUnsupported,
    /// Transient I/O; restart the same backend
    Network,
    /// Unclassified; treated as non-recoverable
    Unknown,
}

impl BackendErrorKind {
    pub fn is_recoverable(self) -> bool {
        matches!(self, BackendErrorKind::Network)
    }
}

/// Events a backend emits towards the supervisor
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    Prepared,
    BufferingStart,
    BufferingEnd,
    FirstVideoFrame,
    PositionTick(u64),
    SeekCompleted,
    Error { kind: BackendErrorKind, message: String },
    Completed,
}

type Delivery = dyn Fn(u64, BackendEvent) + Send + Sync;

/// Where a backend delivers its events.
///
/// Each sink is stamped with the generation of the backend instance it was
/// handed to, so the receiver can drop events from released instances.
#[derive(Clone)]
pub struct EventSink {
    generation: u64,
    deliver: Arc<Delivery>,
}

impl EventSink {
    pub fn new<F>(generation: u64, deliver: F) -> Self
    where
        F: Fn(u64, BackendEvent) + Send + Sync + 'static,
    {
        Self {
            generation,
            deliver: Arc::new(deliver),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn emit(&self, event: BackendEvent) {
        (self.deliver)(self.generation, event);
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink").field("generation", &self.generation).finish()
    }
}

/// Shared capability set of every decode backend
pub trait DecodeBackend: Send {
    /// Which engine this is
    fn variant(&self) -> BackendVariant;

    /// Configure for this device and start preparing `url`. Completion is
    /// reported asynchronously with [`BackendEvent::Prepared`].
    fn prepare(
        &mut self,
        url: &str,
        settings: &PlaybackSettings,
        profile: &DeviceProfile,
        sink: EventSink,
    ) -> Result<()>;

    /// Start or resume playback
    fn play(&mut self) -> Result<()>;

    /// Pause playback
    fn pause(&mut self) -> Result<()>;

    /// Seek by `delta_ms` from the current position
    fn seek_relative(&mut self, delta_ms: i64) -> Result<()>;

    /// Seek to an absolute position
    fn seek_to(&mut self, position_ms: u64) -> Result<()>;

    /// Release every engine resource. Idempotent; no events follow.
    fn release(&mut self);

    /// Current playback position
    fn position_ms(&self) -> u64;

    /// Whether the engine claims to be playing
    fn is_playing(&self) -> bool;

    /// Mute or unmute audio output
    fn set_muted(&mut self, muted: bool) -> Result<()>;

    /// Render into `surface`
    fn attach_surface(&mut self, surface: &OutputSurface) -> Result<()>;

    /// Stop rendering into the attached surface
    fn detach_surface(&mut self);
}

/// Creates backend instances for the supervisor
pub trait BackendFactory: Send {
    fn create(&self, variant: BackendVariant) -> Result<Box<dyn DecodeBackend>>;
}

/// Maps raw engine events onto backend events for one variant
pub trait EventTranslator: Send + Sync {
    fn translate(&self, raw: EngineEvent) -> Option<BackendEvent>;
}

/// Variant-specific half of a backend: how to tune the engine and how to
/// read its failures.
pub trait VariantAdapter: Send {
    fn variant(&self) -> BackendVariant;

    /// Engine configuration for this device/settings pair
    fn tune(&self, url: &str, settings: &PlaybackSettings, profile: &DeviceProfile) -> EngineTuning;

    /// Translator installed as the engine listener
    fn translator(&self) -> Arc<dyn EventTranslator>;
}

/// Translation shared by engines that report buffering as start/end edges
pub struct EdgeTranslator {
    classify: fn(&EngineFailure) -> BackendErrorKind,
}

impl EdgeTranslator {
    pub fn new(classify: fn(&EngineFailure) -> BackendErrorKind) -> Self {
        Self { classify }
    }
}

impl EventTranslator for EdgeTranslator {
    fn translate(&self, raw: EngineEvent) -> Option<BackendEvent> {
        match raw {
            EngineEvent::Prepared => Some(BackendEvent::Prepared),
            EngineEvent::BufferingStart => Some(BackendEvent::BufferingStart),
            EngineEvent::BufferingEnd => Some(BackendEvent::BufferingEnd),
            // Edge-reporting engines do not emit percentages; ignore stray ones.
            EngineEvent::BufferingPercent(_) => None,
            EngineEvent::RenderingStart => Some(BackendEvent::FirstVideoFrame),
            EngineEvent::TimeChanged(ms) => Some(BackendEvent::PositionTick(ms)),
            EngineEvent::SeekComplete => Some(BackendEvent::SeekCompleted),
            EngineEvent::EndReached => Some(BackendEvent::Completed),
            EngineEvent::Failure(failure) => Some(BackendEvent::Error {
                kind: (self.classify)(&failure),
                message: failure.to_string(),
            }),
        }
    }
}

/// A [`DecodeBackend`] built from a variant adapter and a raw engine
pub struct EngineBackend {
    adapter: Box<dyn VariantAdapter>,
    engine: Box<dyn MediaEngine>,
    released: Arc<AtomicBool>,
    muted: bool,
}

impl EngineBackend {
    pub fn new(adapter: Box<dyn VariantAdapter>, engine: Box<dyn MediaEngine>) -> Self {
        Self {
            adapter,
            engine,
            released: Arc::new(AtomicBool::new(false)),
            muted: false,
        }
    }
}

impl DecodeBackend for EngineBackend {
    fn variant(&self) -> BackendVariant {
        self.adapter.variant()
    }

    fn prepare(
        &mut self,
        url: &str,
        settings: &PlaybackSettings,
        profile: &DeviceProfile,
        sink: EventSink,
    ) -> Result<()> {
        let tuning = self.adapter.tune(url, settings, profile);
        info!("Preparing {} backend #{}: {:?}", self.variant(), sink.generation(), tuning);

        let translator = self.adapter.translator();
        let released = Arc::clone(&self.released);
        self.engine.set_listener(Box::new(move |raw| {
            // Engine threads may still be winding down after release.
            if released.load(Ordering::SeqCst) {
                return;
            }
            if let Some(event) = translator.translate(raw) {
                sink.emit(event);
            }
        }));

        self.engine.configure(&tuning)?;
        self.engine.open(url)
    }

    fn play(&mut self) -> Result<()> {
        self.engine.start()
    }

    fn pause(&mut self) -> Result<()> {
        self.engine.pause()
    }

    fn seek_relative(&mut self, delta_ms: i64) -> Result<()> {
        let current = i64::try_from(self.engine.position_ms()).unwrap_or(i64::MAX);
        let mut target = current.saturating_add(delta_ms).max(0) as u64;
        if let Some(duration) = self.engine.duration_ms() {
            target = target.min(duration);
        }
        self.engine.seek_to(target)
    }

    fn seek_to(&mut self, position_ms: u64) -> Result<()> {
        self.engine.seek_to(position_ms)
    }

    fn release(&mut self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("Releasing {} backend", self.variant());
        self.engine.shutdown();
    }

    fn position_ms(&self) -> u64 {
        self.engine.position_ms()
    }

    fn is_playing(&self) -> bool {
        !self.released.load(Ordering::SeqCst) && self.engine.is_playing()
    }

    fn set_muted(&mut self, muted: bool) -> Result<()> {
        if self.muted == muted {
            return Ok(());
        }
        self.muted = muted;
        let volume = if muted { 0.0 } else { 1.0 };
        if let Err(e) = self.engine.set_volume(volume) {
            warn!("{} backend: set_volume({}) failed: {}", self.variant(), volume, e);
            return Err(e);
        }
        Ok(())
    }

    fn attach_surface(&mut self, surface: &OutputSurface) -> Result<()> {
        self.engine.attach_output(surface)
    }

    fn detach_surface(&mut self) {
        self.engine.detach_output();
    }
}

impl Drop for EngineBackend {
    fn drop(&mut self) {
        self.release();
    }
}

/// Adapter for a variant
pub fn adapter_for(variant: BackendVariant) -> Box<dyn VariantAdapter> {
    match variant {
        BackendVariant::Modern => Box::new(modern::ModernAdapter),
        BackendVariant::Legacy => Box::new(legacy::LegacyAdapter),
        BackendVariant::Alternate => Box::new(alternate::AlternateAdapter),
        BackendVariant::Native => Box::new(native::NativeAdapter),
    }
}

/// Factory pairing each variant's adapter with an engine from `provider`
pub struct EngineBackendFactory {
    provider: Arc<dyn EngineProvider>,
}

impl EngineBackendFactory {
    pub fn new(provider: Arc<dyn EngineProvider>) -> Self {
        Self { provider }
    }
}

impl BackendFactory for EngineBackendFactory {
    fn create(&self, variant: BackendVariant) -> Result<Box<dyn DecodeBackend>> {
        let engine = self.provider.create_engine(variant)?;
        Ok(Box::new(EngineBackend::new(adapter_for(variant), engine)))
    }
}
