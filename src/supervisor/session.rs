//! Playback session state
//!
//! One [`PlaybackSession`] lives from a play request until the session is
//! stopped. It survives backend restarts and escalations, and carries the
//! failure history the selector consults.

use serde::Serialize;
use std::collections::HashMap;

use crate::backend::{BackendErrorKind, BackendVariant};
use crate::utils::error::{EngineError, Result};

/// A request to play one stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaybackRequest {
    /// Channel title, for display only
    pub title: String,
    /// Stream URL
    pub url: String,
}

impl PlaybackRequest {
    pub fn new<T: Into<String>, U: Into<String>>(title: T, url: U) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
        }
    }

    /// A blank URL is rejected
    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(EngineError::InvalidRequest("stream URL is empty".into()));
        }
        Ok(())
    }
}

/// Why a backend was given up on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FailureKind {
    CodecUnsupported,
    NetworkOrIo,
    /// Position frozen past the stall threshold
    Stall,
    Unknown,
    /// Recoverable failures kept coming past the restart cap
    RestartsExhausted,
}

impl FailureKind {
    /// Recoverable failures restart the same variant
    pub fn is_recoverable(self) -> bool {
        matches!(self, FailureKind::NetworkOrIo | FailureKind::Stall)
    }
}

impl From<BackendErrorKind> for FailureKind {
    fn from(kind: BackendErrorKind) -> Self {
        match kind {
            BackendErrorKind::CodecUnsupported => FailureKind::CodecUnsupported,
            BackendErrorKind::Network => FailureKind::NetworkOrIo,
            BackendErrorKind::Unknown => FailureKind::Unknown,
        }
    }
}

/// One failure, in session time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    pub variant: BackendVariant,
    pub kind: FailureKind,
    pub at_ms: u64,
}

/// Ordered failures for one session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FailureHistory {
    records: Vec<FailureRecord>,
}

impl FailureHistory {
    pub fn record(&mut self, variant: BackendVariant, kind: FailureKind, at_ms: u64) {
        self.records.push(FailureRecord { variant, kind, at_ms });
    }

    /// Whether `variant` has failed non-recoverably
    pub fn has_fatal(&self, variant: BackendVariant) -> bool {
        self.records
            .iter()
            .any(|r| r.variant == variant && !r.kind.is_recoverable())
    }

    pub fn last(&self) -> Option<&FailureRecord> {
        self.records.last()
    }

    pub fn records(&self) -> &[FailureRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Per-session runtime state
#[derive(Debug, Clone, Serialize)]
pub struct PlaybackSession {
    pub request: PlaybackRequest,

    /// Variant currently (or last) driving playback
    pub current_variant: BackendVariant,

    /// In-place restarts per variant
    restarts: HashMap<BackendVariant, u32>,

    pub last_known_position_ms: u64,
    pub last_position_change_at_ms: u64,

    pub is_muted: bool,
    pub first_frame_rendered: bool,
    pub is_buffering: bool,
    pub is_playing: bool,
    pub paused: bool,

    /// The next backend start follows a stall restart
    pub after_stall: bool,

    /// Start of the current run of advancing watchdog samples
    healthy_since_ms: Option<u64>,

    pub started_at_ms: u64,
    pub history: FailureHistory,
}

impl PlaybackSession {
    pub fn new(request: PlaybackRequest, variant: BackendVariant, now_ms: u64) -> Self {
        Self {
            request,
            current_variant: variant,
            restarts: HashMap::new(),
            last_known_position_ms: 0,
            last_position_change_at_ms: now_ms,
            is_muted: false,
            first_frame_rendered: false,
            is_buffering: false,
            is_playing: false,
            paused: false,
            after_stall: false,
            healthy_since_ms: None,
            started_at_ms: now_ms,
            history: FailureHistory::default(),
        }
    }

    /// Reset per-backend flags before a new backend instance starts
    pub fn begin_backend(&mut self, variant: BackendVariant) {
        self.current_variant = variant;
        self.first_frame_rendered = false;
        self.is_buffering = true;
        self.is_playing = false;
        self.paused = false;
        self.healthy_since_ms = None;
    }

    pub fn restarts(&self, variant: BackendVariant) -> u32 {
        self.restarts.get(&variant).copied().unwrap_or(0)
    }

    pub fn note_restart(&mut self, variant: BackendVariant) -> u32 {
        let count = self.restarts.entry(variant).or_insert(0);
        *count += 1;
        *count
    }

    /// Record an advancing watchdog sample. Once progress has been
    /// uninterrupted for `reset_after_ms`, the current variant's restart count
    /// is cleared; returns true when that happened.
    pub fn note_progress(&mut self, now_ms: u64, reset_after_ms: u64) -> bool {
        let since = *self.healthy_since_ms.get_or_insert(now_ms);
        if now_ms.saturating_sub(since) < reset_after_ms {
            return false;
        }
        self.healthy_since_ms = Some(now_ms);
        self.restarts.remove(&self.current_variant).is_some()
    }

    /// A sample without progress breaks the healthy run
    pub fn note_no_progress(&mut self) {
        self.healthy_since_ms = None;
    }

    /// Track position; returns true when it moved
    pub fn note_position(&mut self, position_ms: u64, now_ms: u64) -> bool {
        if position_ms != self.last_known_position_ms {
            self.last_known_position_ms = position_ms;
            self.last_position_change_at_ms = now_ms;
            true
        } else {
            false
        }
    }
}
