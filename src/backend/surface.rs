//! Output surface ownership
//!
//! The surface is the view a backend renders into. At most one backend
//! instance holds it at any time; the supervisor does every attach and
//! detach, and the surface keeps a short journal of them.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::utils::error::{EngineError, Result};

const JOURNAL_LIMIT: usize = 256;

/// One attach/detach, by backend generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceOp {
    Attached(u64),
    Detached(u64),
}

#[derive(Debug, Default)]
struct SurfaceState {
    holder: Option<u64>,
    journal: VecDeque<SurfaceOp>,
}

impl SurfaceState {
    fn record(&mut self, op: SurfaceOp) {
        if self.journal.len() == JOURNAL_LIMIT {
            self.journal.pop_front();
        }
        self.journal.push_back(op);
    }
}

/// Exclusive render target handle
#[derive(Debug, Clone, Default)]
pub struct OutputSurface {
    inner: Arc<Mutex<SurfaceState>>,
}

impl OutputSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Give the surface to backend `generation`
    pub fn attach(&self, generation: u64) -> Result<()> {
        let mut state = self.inner.lock();
        match state.holder {
            Some(holder) if holder != generation => Err(EngineError::SurfaceBusy { holder }),
            Some(_) => Ok(()),
            None => {
                state.holder = Some(generation);
                state.record(SurfaceOp::Attached(generation));
                Ok(())
            }
        }
    }

    /// Take the surface back from backend `generation`; a stale generation is ignored
    pub fn detach(&self, generation: u64) {
        let mut state = self.inner.lock();
        if state.holder == Some(generation) {
            state.holder = None;
            state.record(SurfaceOp::Detached(generation));
        }
    }

    pub fn holder(&self) -> Option<u64> {
        self.inner.lock().holder
    }

    /// Recent attach/detach operations, oldest first
    pub fn journal(&self) -> Vec<SurfaceOp> {
        self.inner.lock().journal.iter().copied().collect()
    }
}

/// Check that a journal never shows two holders at once
pub fn journal_is_exclusive(journal: &[SurfaceOp]) -> bool {
    let mut holder: Option<u64> = None;
    for op in journal {
        match (*op, holder) {
            (SurfaceOp::Attached(g), None) => holder = Some(g),
            (SurfaceOp::Attached(_), Some(_)) => return false,
            (SurfaceOp::Detached(g), Some(h)) if g == h => holder = None,
            (SurfaceOp::Detached(_), _) => return false,
        }
    }
    true
}
