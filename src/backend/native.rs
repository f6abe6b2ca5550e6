//! Native OS player adapter
//!
//! Failure codes are the OS player's `extra` values, or `what` when it
//! carries the whole story (server died).

use std::sync::Arc;

use super::engine::{classify_with, ClassifyRule, EngineFailure, FailureMatch};
use super::tuning::{self, EngineTuning};
use super::{BackendErrorKind, BackendVariant, EdgeTranslator, EventTranslator, VariantAdapter};
use crate::device::DeviceProfile;
use crate::settings::PlaybackSettings;

pub const ERROR_SERVER_DIED: i32 = 100;
pub const ERROR_IO: i32 = -1004;
pub const ERROR_MALFORMED: i32 = -1007;
pub const ERROR_UNSUPPORTED: i32 = -1010;
pub const ERROR_TIMED_OUT: i32 = -110;

pub const FAILURE_TABLE: &[ClassifyRule] = &[
    ClassifyRule {
        on: FailureMatch::Code(ERROR_UNSUPPORTED),
        kind: BackendErrorKind::CodecUnsupported,
    },
    ClassifyRule {
        on: FailureMatch::Code(ERROR_MALFORMED),
        kind: BackendErrorKind::CodecUnsupported,
    },
    ClassifyRule {
        on: FailureMatch::Code(ERROR_IO),
        kind: BackendErrorKind::Network,
    },
    ClassifyRule {
        on: FailureMatch::Code(ERROR_TIMED_OUT),
        kind: BackendErrorKind::Network,
    },
    ClassifyRule {
        on: FailureMatch::Code(ERROR_SERVER_DIED),
        kind: BackendErrorKind::Network,
    },
];

pub fn classify(failure: &EngineFailure) -> BackendErrorKind {
    classify_with(FAILURE_TABLE, failure)
}

pub struct NativeAdapter;

impl VariantAdapter for NativeAdapter {
    fn variant(&self) -> BackendVariant {
        BackendVariant::Native
    }

    fn tune(
        &self,
        _url: &str,
        settings: &PlaybackSettings,
        profile: &DeviceProfile,
    ) -> EngineTuning {
        EngineTuning::Native(tuning::native(settings, profile))
    }

    fn translator(&self) -> Arc<dyn EventTranslator> {
        Arc::new(EdgeTranslator::new(classify))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let cases = [
            (ERROR_UNSUPPORTED, "MEDIA_ERROR_UNSUPPORTED", BackendErrorKind::CodecUnsupported),
            (ERROR_IO, "MEDIA_ERROR_IO", BackendErrorKind::Network),
            (ERROR_SERVER_DIED, "MEDIA_ERROR_SERVER_DIED", BackendErrorKind::Network),
            (1, "MEDIA_ERROR_UNKNOWN", BackendErrorKind::Unknown),
        ];
        for (code, name, kind) in cases {
            assert_eq!(classify(&EngineFailure::new(code, name)), kind, "{}", name);
        }
    }
}
