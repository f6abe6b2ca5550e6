//! Freeze watchdog
//!
//! Detects a backend that claims to be playing while its position stops
//! moving. The supervisor samples it on a timer; the watchdog only keeps the
//! baseline and decides.

use log::debug;

/// Sample outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogVerdict {
    /// Not playing; nothing measured
    Idle,
    /// Position moved (or baseline just taken)
    Advancing,
    /// Same position, still under the threshold
    Unchanged { stuck_for_ms: u64 },
    /// Same position past the threshold
    Stalled { stuck_for_ms: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Baseline {
    position_ms: u64,
    since_ms: u64,
}

/// Stall detector
#[derive(Debug, Clone)]
pub struct FreezeWatchdog {
    interval_ms: u64,
    stall_threshold_ms: u64,
    grace_ms: u64,
    baseline: Option<Baseline>,
}

impl FreezeWatchdog {
    pub fn new(interval_ms: u64, stall_threshold_ms: u64, grace_ms: u64) -> Self {
        Self {
            interval_ms,
            stall_threshold_ms,
            grace_ms,
            baseline: None,
        }
    }

    /// Start measuring from `position_ms` at `now_ms`
    pub fn reset(&mut self, now_ms: u64, position_ms: u64) {
        self.baseline = Some(Baseline {
            position_ms,
            since_ms: now_ms,
        });
    }

    /// Forget the baseline
    pub fn clear(&mut self) {
        self.baseline = None;
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    /// Delay before the first sample of a fresh backend
    pub fn first_sample_delay(&self, after_stall: bool) -> u64 {
        if after_stall {
            self.grace_ms
        } else {
            self.interval_ms
        }
    }

    /// Take one sample
    pub fn sample(&mut self, now_ms: u64, position_ms: u64, playing: bool) -> WatchdogVerdict {
        if !playing {
            // Paused time does not count as stuck time.
            self.reset(now_ms, position_ms);
            return WatchdogVerdict::Idle;
        }

        let baseline = match self.baseline {
            Some(b) if b.position_ms == position_ms => b,
            _ => {
                self.reset(now_ms, position_ms);
                return WatchdogVerdict::Advancing;
            }
        };

        let stuck_for_ms = now_ms.saturating_sub(baseline.since_ms);
        debug!("watchdog: position {} ms unchanged for {} ms", position_ms, stuck_for_ms);
        if stuck_for_ms > self.stall_threshold_ms {
            self.clear();
            WatchdogVerdict::Stalled { stuck_for_ms }
        } else {
            WatchdogVerdict::Unchanged { stuck_for_ms }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_position_stalls_on_seventh_sample() {
        let mut watchdog = FreezeWatchdog::new(2_000, 12_000, 4_000);
        watchdog.reset(0, 5_000);

        let verdicts: Vec<_> = (1..=7).map(|i| watchdog.sample(i * 2_000, 5_000, true)).collect();
        assert!(verdicts[..6].iter().all(|v| matches!(v, WatchdogVerdict::Unchanged { .. })));
        assert_eq!(verdicts[6], WatchdogVerdict::Stalled { stuck_for_ms: 14_000 });
    }

    #[test]
    fn test_advancing_position_never_stalls() {
        let mut watchdog = FreezeWatchdog::new(2_000, 12_000, 4_000);
        watchdog.reset(0, 0);
        for i in 1..50u64 {
            assert_eq!(watchdog.sample(i * 2_000, i * 1_900, true), WatchdogVerdict::Advancing);
        }
    }

    #[test]
    fn test_paused_time_is_not_stuck_time() {
        let mut watchdog = FreezeWatchdog::new(2_000, 12_000, 4_000);
        watchdog.reset(0, 5_000);
        for i in 1..=10 {
            assert_eq!(watchdog.sample(i * 2_000, 5_000, false), WatchdogVerdict::Idle);
        }
        assert_eq!(
            watchdog.sample(22_000, 5_000, true),
            WatchdogVerdict::Unchanged { stuck_for_ms: 2_000 }
        );
    }

    #[test]
    fn test_grace_after_stall() {
        let watchdog = FreezeWatchdog::new(2_000, 12_000, 4_000);
        assert_eq!(watchdog.first_sample_delay(false), 2_000);
        assert_eq!(watchdog.first_sample_delay(true), 4_000);
    }
}
