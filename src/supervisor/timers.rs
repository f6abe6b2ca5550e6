//! Deadline queue for supervisor timers
//!
//! All timers run on the supervisor's clock (`now_ms`), so tests can drive
//! time by hand. Each timer remembers the backend generation it was armed
//! for; backend-scoped timers from a released backend never fire.

/// Everything the supervisor schedules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Periodic freeze check
    WatchdogSample,
    /// Re-prepare after an in-place restart delay
    RestartBackend,
    /// Unmute if no frame showed up in time
    UnmuteFallback,
    /// Unmute after a post-frame/post-buffer delay
    DelayedUnmute,
    /// Stop waiting for the resync seek to complete
    ResyncTimeout,
    /// Promote to rendering when no first-frame notification ever arrives
    SpinnerFallback,
    /// Show the indicator for a rebuffer that lasts
    DelayedSpinner,
    /// Periodic access re-check
    AccessCheck,
}

impl TimerKind {
    /// Session timers outlive backend instances
    pub fn is_session_scoped(self) -> bool {
        matches!(self, TimerKind::RestartBackend | TimerKind::AccessCheck)
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    deadline_ms: u64,
    seq: u64,
    kind: TimerKind,
    generation: u64,
}

/// At most one pending timer per kind
#[derive(Debug, Default)]
pub struct TimerQueue {
    entries: Vec<Entry>,
    next_seq: u64,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm `kind`, replacing any pending timer of the same kind
    pub fn schedule(&mut self, kind: TimerKind, generation: u64, deadline_ms: u64) {
        self.cancel(kind);
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push(Entry {
            deadline_ms,
            seq,
            kind,
            generation,
        });
    }

    pub fn cancel(&mut self, kind: TimerKind) {
        self.entries.retain(|e| e.kind != kind);
    }

    /// Drop every timer tied to a backend instance
    pub fn cancel_backend_scoped(&mut self) {
        self.entries.retain(|e| e.kind.is_session_scoped());
    }

    pub fn cancel_all(&mut self) {
        self.entries.clear();
    }

    pub fn is_pending(&self, kind: TimerKind) -> bool {
        self.entries.iter().any(|e| e.kind == kind)
    }

    pub fn deadline(&self, kind: TimerKind) -> Option<u64> {
        self.entries.iter().find(|e| e.kind == kind).map(|e| e.deadline_ms)
    }

    /// Earliest pending deadline
    pub fn next_deadline(&self) -> Option<u64> {
        self.entries.iter().map(|e| e.deadline_ms).min()
    }

    /// Remove and return the earliest timer due at `now_ms`, ties in arming order
    pub fn pop_due(&mut self, now_ms: u64) -> Option<(TimerKind, u64)> {
        let index = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.deadline_ms <= now_ms)
            .min_by_key(|(_, e)| (e.deadline_ms, e.seq))
            .map(|(i, _)| i)?;
        let entry = self.entries.swap_remove(index);
        Some((entry.kind, entry.generation))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pop_order() {
        let mut timers = TimerQueue::new();
        timers.schedule(TimerKind::AccessCheck, 0, 30_000);
        timers.schedule(TimerKind::WatchdogSample, 1, 2_000);
        timers.schedule(TimerKind::SpinnerFallback, 1, 2_000);

        assert_eq!(timers.next_deadline(), Some(2_000));
        assert_eq!(timers.pop_due(1_999), None);
        assert_eq!(timers.pop_due(2_000), Some((TimerKind::WatchdogSample, 1)));
        assert_eq!(timers.pop_due(2_000), Some((TimerKind::SpinnerFallback, 1)));
        assert_eq!(timers.pop_due(2_000), None);
        assert_eq!(timers.len(), 1);
    }

    #[test]
    fn test_reschedule_replaces() {
        let mut timers = TimerQueue::new();
        timers.schedule(TimerKind::DelayedUnmute, 1, 100);
        timers.schedule(TimerKind::DelayedUnmute, 1, 500);
        assert_eq!(timers.len(), 1);
        assert_eq!(timers.deadline(TimerKind::DelayedUnmute), Some(500));
    }

    #[test]
    fn test_backend_scoped_cancel() {
        let mut timers = TimerQueue::new();
        timers.schedule(TimerKind::AccessCheck, 0, 30_000);
        timers.schedule(TimerKind::RestartBackend, 2, 400);
        timers.schedule(TimerKind::WatchdogSample, 2, 2_000);
        timers.schedule(TimerKind::ResyncTimeout, 2, 700);

        timers.cancel_backend_scoped();
        assert!(timers.is_pending(TimerKind::AccessCheck));
        assert!(timers.is_pending(TimerKind::RestartBackend));
        assert!(!timers.is_pending(TimerKind::WatchdogSample));
        assert!(!timers.is_pending(TimerKind::ResyncTimeout));

        timers.cancel_all();
        assert!(timers.is_empty());
    }
}
