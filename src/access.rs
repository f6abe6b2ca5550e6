//! Playback access gate
//!
//! Subscription and login checks live outside the engine. The supervisor
//! asks the gate before playback starts, periodically while playing, and
//! on resume; a push-style revocation is a supervisor command.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Gate answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AccessDecision {
    Allowed,
    Denied,
}

/// Answers whether playback is currently permitted
pub trait AccessGate: Send + Sync {
    fn check_access(&self) -> AccessDecision;
}

/// Gate that always allows playback
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AccessGate for AllowAll {
    fn check_access(&self) -> AccessDecision {
        AccessDecision::Allowed
    }
}

/// Gate backed by a flag other components flip
#[derive(Debug, Clone)]
pub struct SharedAccessGate {
    allowed: Arc<AtomicBool>,
}

impl SharedAccessGate {
    pub fn new(allowed: bool) -> Self {
        Self {
            allowed: Arc::new(AtomicBool::new(allowed)),
        }
    }

    pub fn set_allowed(&self, allowed: bool) {
        self.allowed.store(allowed, Ordering::SeqCst);
    }
}

impl Default for SharedAccessGate {
    fn default() -> Self {
        Self::new(true)
    }
}

impl AccessGate for SharedAccessGate {
    fn check_access(&self) -> AccessDecision {
        if self.allowed.load(Ordering::SeqCst) {
            AccessDecision::Allowed
        } else {
            AccessDecision::Denied
        }
    }
}
