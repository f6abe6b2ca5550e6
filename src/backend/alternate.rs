//! Alternate engine adapter
//!
//! This engine reports buffering as a fill percentage rather than start/end
//! edges, and its errors carry no code, only log text.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::engine::{classify_with, ClassifyRule, EngineEvent, EngineFailure, FailureMatch};
use super::tuning::{self, EngineTuning};
use super::{
    BackendErrorKind, BackendEvent, BackendVariant, EdgeTranslator, EventTranslator, VariantAdapter,
};
use crate::device::DeviceProfile;
use crate::settings::PlaybackSettings;

pub const FAILURE_TABLE: &[ClassifyRule] = &[
    ClassifyRule {
        on: FailureMatch::Needle("no suitable decoder"),
        kind: BackendErrorKind::CodecUnsupported,
    },
    ClassifyRule {
        on: FailureMatch::Needle("codec not supported"),
        kind: BackendErrorKind::CodecUnsupported,
    },
    ClassifyRule {
        on: FailureMatch::Needle("connection"),
        kind: BackendErrorKind::Network,
    },
    ClassifyRule {
        on: FailureMatch::Needle("timeout"),
        kind: BackendErrorKind::Network,
    },
    ClassifyRule {
        on: FailureMatch::Needle("http"),
        kind: BackendErrorKind::Network,
    },
];

pub fn classify(failure: &EngineFailure) -> BackendErrorKind {
    classify_with(FAILURE_TABLE, failure)
}

/// Turns buffering percentages into start/end edges
pub struct PercentTranslator {
    buffering: AtomicBool,
    edges: EdgeTranslator,
}

impl Default for PercentTranslator {
    fn default() -> Self {
        Self {
            buffering: AtomicBool::new(false),
            edges: EdgeTranslator::new(classify),
        }
    }
}

impl EventTranslator for PercentTranslator {
    fn translate(&self, raw: EngineEvent) -> Option<BackendEvent> {
        match raw {
            EngineEvent::BufferingPercent(percent) => {
                let filling = percent < 100.0;
                let was = self.buffering.swap(filling, Ordering::SeqCst);
                match (was, filling) {
                    (false, true) => Some(BackendEvent::BufferingStart),
                    (true, false) => Some(BackendEvent::BufferingEnd),
                    _ => None,
                }
            }
            other => self.edges.translate(other),
        }
    }
}

pub struct AlternateAdapter;

impl VariantAdapter for AlternateAdapter {
    fn variant(&self) -> BackendVariant {
        BackendVariant::Alternate
    }

    fn tune(
        &self,
        _url: &str,
        settings: &PlaybackSettings,
        profile: &DeviceProfile,
    ) -> EngineTuning {
        EngineTuning::Vlc(tuning::vlc(settings, profile))
    }

    fn translator(&self) -> Arc<dyn EventTranslator> {
        Arc::new(PercentTranslator::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_edges() {
        let t = PercentTranslator::default();
        let percent = |p| t.translate(EngineEvent::BufferingPercent(p));
        assert_eq!(percent(0.0), Some(BackendEvent::BufferingStart));
        assert_eq!(percent(55.0), None);
        assert_eq!(percent(100.0), Some(BackendEvent::BufferingEnd));
        assert_eq!(percent(100.0), None);
        assert_eq!(
            t.translate(EngineEvent::TimeChanged(900)),
            Some(BackendEvent::PositionTick(900))
        );
    }

    #[test]
    fn test_classification() {
        let codec = EngineFailure::new(0, "EncounteredError")
            .with_detail("main decoder error: No suitable decoder module");
        assert_eq!(classify(&codec), BackendErrorKind::CodecUnsupported);

        let net =
            EngineFailure::new(0, "EncounteredError").with_detail("http stream: Connection reset");
        assert_eq!(classify(&net), BackendErrorKind::Network);

        assert_eq!(classify(&EngineFailure::new(0, "EncounteredError")), BackendErrorKind::Unknown);
    }
}
