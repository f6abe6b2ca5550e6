//! Audio gating around first-frame rendering
//!
//! Some boxes start audio before video is visible, and some keep an A/V
//! offset until a seek. The controller keeps audio muted across those
//! windows. It never touches a backend itself: every input returns the
//! actions the supervisor should carry out.

use crate::backend::tuning::MuteTimings;

use super::timers::TimerKind;

/// Side effects requested by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuteAction {
    SetMuted(bool),
    /// Arm `kind` after `delay_ms`
    Schedule(TimerKind, u64),
    Cancel(TimerKind),
    /// Seek to the current position once
    ResyncSeek,
}

/// Mute state machine for one session
#[derive(Debug, Clone)]
pub struct MuteController {
    resync_timeout_ms: u64,
    resync_settle_ms: u64,
    /// `None` for backends that are never muted
    timings: Option<MuteTimings>,
    muted: bool,
    first_frame: bool,
    resync_pending: bool,
    resync_done: bool,
}

impl MuteController {
    pub fn new(resync_timeout_ms: u64, resync_settle_ms: u64) -> Self {
        Self {
            resync_timeout_ms,
            resync_settle_ms,
            timings: None,
            muted: false,
            first_frame: false,
            resync_pending: false,
            resync_done: false,
        }
    }

    /// Arm for a new backend instance. The resync seek runs once per session,
    /// so `resync_done` survives.
    pub fn begin_backend(&mut self, timings: Option<MuteTimings>) {
        self.timings = timings;
        self.muted = false;
        self.first_frame = false;
        self.resync_pending = false;
    }

    /// Forget everything, including the resync
    pub fn reset_session(&mut self) {
        self.begin_backend(None);
        self.resync_done = false;
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn resync_pending(&self) -> bool {
        self.resync_pending
    }

    fn set(&mut self, muted: bool, actions: &mut Vec<MuteAction>) {
        if self.muted != muted {
            self.muted = muted;
            actions.push(MuteAction::SetMuted(muted));
        }
    }

    fn unmute_after(&mut self, delay_ms: u64, actions: &mut Vec<MuteAction>) {
        if delay_ms == 0 {
            actions.push(MuteAction::Cancel(TimerKind::DelayedUnmute));
            self.set(false, actions);
        } else {
            actions.push(MuteAction::Schedule(TimerKind::DelayedUnmute, delay_ms));
        }
    }

    /// Backend is about to prepare
    pub fn on_preparing(&mut self) -> Vec<MuteAction> {
        let mut actions = Vec::new();
        if let Some(t) = self.timings {
            if t.start_muted {
                self.set(true, &mut actions);
            }
        }
        actions
    }

    /// Playback was started on the backend
    pub fn on_playing_started(&mut self) -> Vec<MuteAction> {
        let mut actions = Vec::new();
        if let Some(t) = self.timings {
            // Devices needing a resync stay muted until the frame (or the
            // rendering fallback) says otherwise.
            if self.muted && !t.resync_seek {
                actions.push(MuteAction::Schedule(TimerKind::UnmuteFallback, t.unmute_fallback_ms));
            }
        }
        actions
    }

    pub fn on_buffering_start(&mut self) -> Vec<MuteAction> {
        let mut actions = Vec::new();
        if self.timings.is_some() {
            actions.push(MuteAction::Cancel(TimerKind::DelayedUnmute));
            self.set(true, &mut actions);
        }
        actions
    }

    pub fn on_buffering_end(&mut self) -> Vec<MuteAction> {
        let mut actions = Vec::new();
        if let Some(t) = self.timings {
            if self.first_frame && !self.resync_pending {
                self.unmute_after(t.post_buffer_unmute_ms, &mut actions);
            }
        }
        actions
    }

    pub fn on_first_frame(&mut self) -> Vec<MuteAction> {
        let mut actions = Vec::new();
        if self.first_frame {
            return actions;
        }
        self.first_frame = true;

        let Some(t) = self.timings else {
            return actions;
        };
        actions.push(MuteAction::Cancel(TimerKind::UnmuteFallback));

        if t.resync_seek && !self.resync_done {
            self.resync_done = true;
            self.resync_pending = true;
            self.set(true, &mut actions);
            actions.push(MuteAction::ResyncSeek);
            actions.push(MuteAction::Schedule(TimerKind::ResyncTimeout, self.resync_timeout_ms));
        } else {
            self.unmute_after(t.post_render_unmute_ms, &mut actions);
        }
        actions
    }

    pub fn on_seek_completed(&mut self) -> Vec<MuteAction> {
        let mut actions = Vec::new();
        if self.resync_pending {
            self.resync_pending = false;
            actions.push(MuteAction::Cancel(TimerKind::ResyncTimeout));
            actions.push(MuteAction::Schedule(TimerKind::DelayedUnmute, self.resync_settle_ms));
        }
        actions
    }

    /// Rendering was assumed without a first-frame notification
    ///
    /// An offset-prone device still needs its resync seek before audio comes
    /// back, so the promotion stands in for the first frame there.
    pub fn on_promoted(&mut self) -> Vec<MuteAction> {
        let Some(t) = self.timings else {
            return Vec::new();
        };
        if self.first_frame {
            return Vec::new();
        }
        if t.resync_seek && !self.resync_done {
            return self.on_first_frame();
        }
        let mut actions = vec![MuteAction::Cancel(TimerKind::UnmuteFallback)];
        self.set(false, &mut actions);
        actions
    }

    pub fn on_timer(&mut self, kind: TimerKind) -> Vec<MuteAction> {
        let mut actions = Vec::new();
        match kind {
            TimerKind::UnmuteFallback if !self.first_frame => self.set(false, &mut actions),
            TimerKind::DelayedUnmute if !self.resync_pending => self.set(false, &mut actions),
            TimerKind::ResyncTimeout if self.resync_pending => {
                self.resync_pending = false;
                actions.push(MuteAction::Schedule(TimerKind::DelayedUnmute, self.resync_settle_ms));
            }
            _ => {}
        }
        actions
    }
}
