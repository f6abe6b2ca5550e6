//! Raw engine driver interface
//!
//! The actual decode engines (the modern and legacy engine libraries, the
//! third-party engine, the OS media player) are external. They are driven
//! through [`MediaEngine`] and report through an [`EngineListener`], in
//! their own vocabulary; the variant adapters translate.

use std::fmt;

use super::surface::OutputSurface;
use super::tuning::EngineTuning;
use super::{BackendErrorKind, BackendVariant};
use crate::utils::error::Result;

/// Raw engine failure as the engine reports it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineFailure {
    /// Numeric engine error code (0 when the engine has none)
    pub code: i32,
    /// Engine-specific error name or exception type
    pub name: String,
    /// Free-form detail message
    pub detail: Option<String>,
}

impl EngineFailure {
    pub fn new<S: Into<String>>(code: i32, name: S) -> Self {
        Self {
            code,
            name: name.into(),
            detail: None,
        }
    }

    pub fn with_detail<S: Into<String>>(mut self, detail: S) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Name and detail in one lowercase string, for substring matching
    pub fn haystack(&self) -> String {
        match &self.detail {
            Some(d) => format!("{} {}", self.name, d).to_ascii_lowercase(),
            None => self.name.to_ascii_lowercase(),
        }
    }
}

impl fmt::Display for EngineFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.name, self.code)?;
        if let Some(detail) = &self.detail {
            write!(f, ": {}", detail)?;
        }
        Ok(())
    }
}

/// What a classification rule looks at
#[derive(Debug, Clone, Copy)]
pub enum FailureMatch {
    Code(i32),
    /// Inclusive code range
    CodeRange(i32, i32),
    /// Case-insensitive substring of name or detail
    Needle(&'static str),
}

impl FailureMatch {
    fn matches(&self, failure: &EngineFailure, haystack: &str) -> bool {
        match *self {
            FailureMatch::Code(code) => failure.code == code,
            FailureMatch::CodeRange(lo, hi) => (lo..=hi).contains(&failure.code),
            FailureMatch::Needle(needle) => haystack.contains(needle),
        }
    }
}

/// One row of an adapter's failure table
#[derive(Debug, Clone, Copy)]
pub struct ClassifyRule {
    pub on: FailureMatch,
    pub kind: BackendErrorKind,
}

/// First matching row wins; no match is `Unknown`. Needles must be lowercase.
pub fn classify_with(table: &[ClassifyRule], failure: &EngineFailure) -> BackendErrorKind {
    let haystack = failure.haystack();
    table
        .iter()
        .find(|rule| rule.on.matches(failure, &haystack))
        .map(|rule| rule.kind)
        .unwrap_or(BackendErrorKind::Unknown)
}

/// Events in engine vocabulary
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Prepared,
    BufferingStart,
    BufferingEnd,
    /// Buffer fill level for engines that report percentages instead of edges
    BufferingPercent(f32),
    RenderingStart,
    TimeChanged(u64),
    SeekComplete,
    EndReached,
    Failure(EngineFailure),
}

/// Callback an engine invokes from its own threads
pub type EngineListener = Box<dyn Fn(EngineEvent) + Send + Sync>;

/// Driver for one engine instance
pub trait MediaEngine: Send {
    /// Apply tuning before opening
    fn configure(&mut self, tuning: &EngineTuning) -> Result<()>;

    /// Install the event listener, replacing any previous one
    fn set_listener(&mut self, listener: EngineListener);

    /// Begin asynchronous preparation of `url`
    fn open(&mut self, url: &str) -> Result<()>;

    fn start(&mut self) -> Result<()>;

    fn pause(&mut self) -> Result<()>;

    fn seek_to(&mut self, position_ms: u64) -> Result<()>;

    fn position_ms(&self) -> u64;

    /// Total duration; `None` for live streams
    fn duration_ms(&self) -> Option<u64>;

    fn is_playing(&self) -> bool;

    /// Output volume, 0.0 to 1.0
    fn set_volume(&mut self, volume: f32) -> Result<()>;

    fn attach_output(&mut self, surface: &OutputSurface) -> Result<()>;

    fn detach_output(&mut self);

    /// Free every engine resource; no events may follow
    fn shutdown(&mut self);
}

/// Source of raw engines, one per backend instance
pub trait EngineProvider: Send + Sync {
    fn create_engine(&self, variant: BackendVariant) -> Result<Box<dyn MediaEngine>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_display_and_haystack() {
        let failure = EngineFailure::new(4003, "ERROR_CODE_DECODING_FAILED")
            .with_detail("NO_EXCEEDS_CAPABILITIES");
        assert_eq!(
            failure.to_string(),
            "ERROR_CODE_DECODING_FAILED (code 4003): NO_EXCEEDS_CAPABILITIES"
        );
        assert_eq!(failure.haystack(), "error_code_decoding_failed no_exceeds_capabilities");
    }

    #[test]
    fn test_classify_first_match_wins() {
        const TABLE: &[ClassifyRule] = &[
            ClassifyRule {
                on: FailureMatch::Needle("decoder"),
                kind: BackendErrorKind::CodecUnsupported,
            },
            ClassifyRule {
                on: FailureMatch::CodeRange(2000, 2999),
                kind: BackendErrorKind::Network,
            },
        ];
        let io = EngineFailure::new(2001, "ERROR_CODE_IO_NETWORK_CONNECTION_FAILED");
        assert_eq!(classify_with(TABLE, &io), BackendErrorKind::Network);

        let both = EngineFailure::new(2001, "x").with_detail("Decoder stalled");
        assert_eq!(classify_with(TABLE, &both), BackendErrorKind::CodecUnsupported);

        assert_eq!(classify_with(TABLE, &EngineFailure::new(7, "odd")), BackendErrorKind::Unknown);
    }
}
