//! stbplay - adaptive playback reliability engine for set-top-box media clients
//!
//! Picks a decode backend for the device, watches it for codec failures,
//! frozen video and early audio, and recovers by restarting or escalating
//! to another backend.

pub mod access;
pub mod backend;
pub mod device;
pub mod settings;
pub mod supervisor;
pub mod utils;

pub use access::{AccessDecision, AccessGate, AllowAll, SharedAccessGate};
pub use backend::{
    BackendErrorKind, BackendEvent, BackendVariant, DecodeBackend, EngineBackendFactory,
};
pub use device::{DeviceProfile, PlatformInfo};
pub use settings::{BackendPreference, PlaybackSettings};
pub use supervisor::{
    EngineStatus, PlaybackEngine, PlaybackEvent, PlaybackRequest, PlaybackSupervisor, SessionState,
    StopReason, SupervisorConfig,
};
pub use utils::config::Config;
pub use utils::error::{EngineError, Result};
