//! Legacy engine adapter
//!
//! The older engine reports failures as (type, exception class): type 0 is
//! a source error, 1 a renderer error, 2 unexpected.

use std::sync::Arc;

use super::engine::{classify_with, ClassifyRule, EngineFailure, FailureMatch};
use super::tuning::{self, EngineTuning};
use super::{BackendErrorKind, BackendVariant, EdgeTranslator, EventTranslator, VariantAdapter};
use crate::device::DeviceProfile;
use crate::settings::PlaybackSettings;

pub const TYPE_SOURCE: i32 = 0;
pub const TYPE_RENDERER: i32 = 1;
pub const TYPE_UNEXPECTED: i32 = 2;

pub const FAILURE_TABLE: &[ClassifyRule] = &[
    ClassifyRule {
        on: FailureMatch::Needle("decoderinitializationexception"),
        kind: BackendErrorKind::CodecUnsupported,
    },
    ClassifyRule {
        on: FailureMatch::Code(TYPE_SOURCE),
        kind: BackendErrorKind::Network,
    },
];

pub fn classify(failure: &EngineFailure) -> BackendErrorKind {
    classify_with(FAILURE_TABLE, failure)
}

pub struct LegacyAdapter;

impl VariantAdapter for LegacyAdapter {
    fn variant(&self) -> BackendVariant {
        BackendVariant::Legacy
    }

    fn tune(
        &self,
        url: &str,
        settings: &PlaybackSettings,
        profile: &DeviceProfile,
    ) -> EngineTuning {
        EngineTuning::Exo(tuning::exo_legacy(url, settings, profile))
    }

    fn translator(&self) -> Arc<dyn EventTranslator> {
        Arc::new(EdgeTranslator::new(classify))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::tuning::ContentType;

    #[test]
    fn test_classification() {
        let renderer =
            EngineFailure::new(TYPE_RENDERER, "MediaCodecRenderer$DecoderInitializationException");
        assert_eq!(classify(&renderer), BackendErrorKind::CodecUnsupported);

        let source = EngineFailure::new(TYPE_SOURCE, "HttpDataSourceException")
            .with_detail("Unable to connect");
        assert_eq!(classify(&source), BackendErrorKind::Network);

        let other = EngineFailure::new(TYPE_RENDERER, "IllegalStateException");
        assert_eq!(classify(&other), BackendErrorKind::Unknown);
        let unexpected = EngineFailure::new(TYPE_UNEXPECTED, "RuntimeException");
        assert_eq!(classify(&unexpected), BackendErrorKind::Unknown);
    }

    #[test]
    fn test_tuning_infers_hls() {
        let profile = DeviceProfile::classify(&Default::default());
        match LegacyAdapter.tune("http://a/live.m3u8", &PlaybackSettings::default(), &profile) {
            EngineTuning::Exo(t) => {
                assert_eq!(t.content_type, ContentType::Hls);
                assert_eq!(t.back_buffer_ms, None);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
