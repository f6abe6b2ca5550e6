//! Modern engine adapter

use std::sync::Arc;

use super::engine::{classify_with, ClassifyRule, EngineFailure, FailureMatch};
use super::tuning::{self, EngineTuning};
use super::{BackendErrorKind, BackendVariant, EdgeTranslator, EventTranslator, VariantAdapter};
use crate::device::DeviceProfile;
use crate::settings::PlaybackSettings;

/// Modern engine failure table. Codes follow the engine's playback error codes
/// (1xxx misc, 2xxx I/O, 3xxx parsing, 4xxx decoding).
pub const FAILURE_TABLE: &[ClassifyRule] = &[
    ClassifyRule {
        on: FailureMatch::Needle("mediacodecvideodecoderexception"),
        kind: BackendErrorKind::CodecUnsupported,
    },
    ClassifyRule {
        on: FailureMatch::Needle("no_exceeds_capabilities"),
        kind: BackendErrorKind::CodecUnsupported,
    },
    // Decoder init failed, format exceeds capabilities, format unsupported.
    ClassifyRule {
        on: FailureMatch::Code(4001),
        kind: BackendErrorKind::CodecUnsupported,
    },
    ClassifyRule {
        on: FailureMatch::CodeRange(4004, 4005),
        kind: BackendErrorKind::CodecUnsupported,
    },
    ClassifyRule {
        on: FailureMatch::CodeRange(2000, 2999),
        kind: BackendErrorKind::Network,
    },
    // Behind live window, timeout.
    ClassifyRule {
        on: FailureMatch::CodeRange(1002, 1003),
        kind: BackendErrorKind::Network,
    },
];

pub fn classify(failure: &EngineFailure) -> BackendErrorKind {
    classify_with(FAILURE_TABLE, failure)
}

pub struct ModernAdapter;

impl VariantAdapter for ModernAdapter {
    fn variant(&self) -> BackendVariant {
        BackendVariant::Modern
    }

    fn tune(
        &self,
        _url: &str,
        settings: &PlaybackSettings,
        profile: &DeviceProfile,
    ) -> EngineTuning {
        EngineTuning::Exo(tuning::exo_modern(settings, profile))
    }

    fn translator(&self) -> Arc<dyn EventTranslator> {
        Arc::new(EdgeTranslator::new(classify))
    }
}
