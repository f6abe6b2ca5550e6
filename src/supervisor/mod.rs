//! Playback supervisor for stbplay
//!
//! [`PlaybackSupervisor`] owns the session, the single live backend and the
//! output surface. It is a deterministic state machine: every input (a
//! command, a backend event, a timer) comes in with the current time in
//! milliseconds, so it can be driven by hand in tests and by
//! [`PlaybackEngine`]'s coordination thread in production.

pub mod coordinator;
pub mod mute;
pub mod observer;
pub mod session;
pub mod timers;
pub mod watchdog;

pub use coordinator::{EngineStatus, PlaybackEngine};
pub use observer::{EventDispatcher, EventSubscription, PlaybackEvent, PlaybackObserver, StopReason};
pub use session::{FailureHistory, FailureKind, FailureRecord, PlaybackRequest, PlaybackSession};

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::access::{AccessDecision, AccessGate, AllowAll};
use crate::backend::{
    self, tuning, BackendEvent, BackendFactory, BackendVariant, DecodeBackend, EventSink,
    OutputSurface,
};
use crate::device::DeviceProfile;
use crate::settings::PlaybackSettings;
use crate::utils::error::{EngineError, Result};
use crate::utils::format_position;

use mute::{MuteAction, MuteController};
use timers::{TimerKind, TimerQueue};
use watchdog::{FreezeWatchdog, WatchdogVerdict};

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    Preparing,
    Buffering,
    Rendering,
    Restarting,
    Escalating,
    Stopped,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Supervisor timing and retry limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Watchdog sample interval
    pub sample_interval_ms: u64,

    /// Unchanged position longer than this is a stall
    pub stall_threshold_ms: u64,

    /// First watchdog sample delay after a stall restart
    pub stall_grace_ms: u64,

    /// Delay before re-preparing after an in-place restart
    pub restart_delay_ms: u64,

    /// In-place restarts allowed per backend variant before escalating
    pub max_restarts: u32,

    /// Rendering with an advancing position for this long refills the
    /// restart budget of the current variant
    pub restart_budget_reset_ms: u64,

    /// Access re-check interval
    pub access_check_interval_ms: u64,

    /// Promote to rendering this long after play() if no first frame is reported
    pub spinner_fallback_ms: u64,

    /// A rebuffer shows the indicator only after this long
    pub delayed_spinner_ms: u64,

    /// Give up waiting for the resync seek after this long
    pub resync_timeout_ms: u64,

    /// Unmute this long after the resync seek settles
    pub resync_settle_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: 2_000,
            stall_threshold_ms: 12_000,
            stall_grace_ms: 4_000,
            restart_delay_ms: 400,
            max_restarts: 3,
            restart_budget_reset_ms: 60_000,
            access_check_interval_ms: 30_000,
            spinner_fallback_ms: 2_500,
            delayed_spinner_ms: 500,
            resync_timeout_ms: 700,
            resync_settle_ms: 120,
        }
    }
}

impl SupervisorConfig {
    pub fn validate(&self) -> Result<()> {
        let intervals = [
            ("sample_interval_ms", self.sample_interval_ms),
            ("stall_threshold_ms", self.stall_threshold_ms),
            ("stall_grace_ms", self.stall_grace_ms),
            ("restart_delay_ms", self.restart_delay_ms),
            ("restart_budget_reset_ms", self.restart_budget_reset_ms),
            ("access_check_interval_ms", self.access_check_interval_ms),
            ("spinner_fallback_ms", self.spinner_fallback_ms),
            ("resync_timeout_ms", self.resync_timeout_ms),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, value)| *value == 0) {
            return Err(EngineError::Config(format!("{} must be greater than zero", name)));
        }
        if self.stall_threshold_ms <= self.sample_interval_ms {
            return Err(EngineError::Config(
                "stall_threshold_ms must exceed sample_interval_ms".into(),
            ));
        }
        Ok(())
    }
}

/// Requests from the hosting screen
#[derive(Debug, Clone, PartialEq)]
pub enum SupervisorCommand {
    Play(PlaybackRequest),
    Stop,
    Pause,
    Resume,
    SeekRelative(i64),
    /// The access collaborator withdrew permission
    AccessRevoked,
    Shutdown,
}

/// Everything that reaches the supervisor's inbox
#[derive(Debug, Clone, PartialEq)]
pub enum SupervisorMessage {
    Command(SupervisorCommand),
    Backend { generation: u64, event: BackendEvent },
}

/// Supervisor builder
pub struct SupervisorBuilder {
    factory: Box<dyn BackendFactory>,
    profile: Option<Arc<DeviceProfile>>,
    settings: PlaybackSettings,
    config: SupervisorConfig,
    gate: Arc<dyn AccessGate>,
    dispatcher: EventDispatcher,
    surface: OutputSurface,
}

impl SupervisorBuilder {
    pub fn new(factory: Box<dyn BackendFactory>) -> Self {
        Self {
            factory,
            profile: None,
            settings: PlaybackSettings::default(),
            config: SupervisorConfig::default(),
            gate: Arc::new(AllowAll),
            dispatcher: EventDispatcher::new(),
            surface: OutputSurface::new(),
        }
    }

    /// Device profile; defaults to the process-wide one
    pub fn with_profile(mut self, profile: Arc<DeviceProfile>) -> Self {
        self.profile = Some(profile);
        self
    }

    pub fn with_settings(mut self, settings: PlaybackSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_config(mut self, config: SupervisorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_access_gate(mut self, gate: Arc<dyn AccessGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: EventDispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn with_observer(self, observer: Arc<dyn PlaybackObserver>) -> Self {
        self.dispatcher.attach(observer);
        self
    }

    pub fn with_surface(mut self, surface: OutputSurface) -> Self {
        self.surface = surface;
        self
    }

    pub fn build(self) -> Result<PlaybackSupervisor> {
        self.settings.validate()?;
        self.config.validate()?;

        let (tx, rx) = unbounded();
        let profile = self.profile.unwrap_or_else(DeviceProfile::current);
        let watchdog = FreezeWatchdog::new(
            self.config.sample_interval_ms,
            self.config.stall_threshold_ms,
            self.config.stall_grace_ms,
        );
        let mute = MuteController::new(self.config.resync_timeout_ms, self.config.resync_settle_ms);

        Ok(PlaybackSupervisor {
            profile,
            settings: self.settings,
            config: self.config,
            factory: self.factory,
            gate: self.gate,
            surface: self.surface,
            dispatcher: self.dispatcher,
            tx,
            rx,
            state: SessionState::Idle,
            session: None,
            last_session: None,
            backend: None,
            generation: 0,
            clock_ms: 0,
            timers: TimerQueue::new(),
            watchdog,
            mute,
            spinner_visible: false,
        })
    }
}

/// The reliability state machine
pub struct PlaybackSupervisor {
    profile: Arc<DeviceProfile>,
    settings: PlaybackSettings,
    config: SupervisorConfig,
    factory: Box<dyn BackendFactory>,
    gate: Arc<dyn AccessGate>,
    surface: OutputSurface,
    dispatcher: EventDispatcher,

    tx: Sender<SupervisorMessage>,
    rx: Receiver<SupervisorMessage>,

    state: SessionState,
    session: Option<PlaybackSession>,
    last_session: Option<PlaybackSession>,

    /// The only live backend instance
    backend: Option<Box<dyn DecodeBackend>>,
    /// Bumped for every backend instance
    generation: u64,

    /// Latest time seen on any input
    clock_ms: u64,
    timers: TimerQueue,
    watchdog: FreezeWatchdog,
    mute: MuteController,
    spinner_visible: bool,
}

impl PlaybackSupervisor {
    pub fn builder(factory: Box<dyn BackendFactory>) -> SupervisorBuilder {
        SupervisorBuilder::new(factory)
    }

    // ---- inspection ----

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The active session, if any
    pub fn session(&self) -> Option<&PlaybackSession> {
        self.session.as_ref()
    }

    /// The most recently ended session
    pub fn last_session(&self) -> Option<&PlaybackSession> {
        self.last_session.as_ref()
    }

    pub fn current_variant(&self) -> Option<BackendVariant> {
        self.backend.as_ref().map(|b| b.variant())
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_muted(&self) -> bool {
        self.session.as_ref().map(|s| s.is_muted).unwrap_or(false)
    }

    pub fn spinner_visible(&self) -> bool {
        self.spinner_visible
    }

    pub fn surface(&self) -> &OutputSurface {
        &self.surface
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    pub fn timers(&self) -> &TimerQueue {
        &self.timers
    }

    /// Sender for commands and backend events
    pub fn sender(&self) -> Sender<SupervisorMessage> {
        self.tx.clone()
    }

    pub fn receiver(&self) -> Receiver<SupervisorMessage> {
        self.rx.clone()
    }

    /// Earliest pending timer deadline
    pub fn next_deadline(&self) -> Option<u64> {
        self.timers.next_deadline()
    }

    // ---- driving ----

    fn tick(&mut self, now_ms: u64) -> u64 {
        self.clock_ms = self.clock_ms.max(now_ms);
        self.clock_ms
    }

    /// Handle one inbox message
    pub fn handle_message(&mut self, message: SupervisorMessage, now_ms: u64) {
        match message {
            SupervisorMessage::Command(command) => self.handle_command(command, now_ms),
            SupervisorMessage::Backend { generation, event } => {
                self.handle_backend_event(generation, event, now_ms)
            }
        }
    }

    /// Drain queued messages, then fire due timers
    pub fn pump(&mut self, now_ms: u64) {
        let now = self.tick(now_ms);
        while let Ok(message) = self.rx.try_recv() {
            self.handle_message(message, now);
        }
        self.fire_due_timers(now);
    }

    /// Run every timer due up to `target_ms` at its own deadline, draining the
    /// inbox in between
    pub fn advance_to(&mut self, target_ms: u64) {
        loop {
            let now = self.clock_ms;
            while let Ok(message) = self.rx.try_recv() {
                self.handle_message(message, now);
            }
            match self.timers.next_deadline() {
                Some(deadline) if deadline <= target_ms => {
                    let now = self.tick(deadline);
                    self.fire_due_timers(now);
                }
                _ => break,
            }
        }
        self.pump(target_ms);
    }

    pub fn fire_due_timers(&mut self, now_ms: u64) {
        let now = self.tick(now_ms);
        while let Some((kind, generation)) = self.timers.pop_due(now) {
            self.on_timer(kind, generation, now);
        }
    }

    pub fn handle_command(&mut self, command: SupervisorCommand, now_ms: u64) {
        let now = self.tick(now_ms);
        match command {
            SupervisorCommand::Play(request) => {
                if let Err(e) = self.play(request, now) {
                    warn!("Play request ignored: {}", e);
                }
            }
            SupervisorCommand::Stop => self.stop(now),
            SupervisorCommand::Pause => self.pause(now),
            SupervisorCommand::Resume => self.resume(now),
            SupervisorCommand::SeekRelative(delta_ms) => self.seek_relative(delta_ms, now),
            SupervisorCommand::AccessRevoked => self.revoke_access(now),
            SupervisorCommand::Shutdown => self.shutdown(now),
        }
    }

    // ---- commands ----

    /// Start a session. A blank URL is rejected without touching any state.
    pub fn play(&mut self, request: PlaybackRequest, now_ms: u64) -> Result<()> {
        request.validate()?;
        let now = self.tick(now_ms);

        if self.session.is_some() {
            self.end_session(StopReason::Replaced);
        }

        if self.gate.check_access() == AccessDecision::Denied {
            warn!("Access denied; not starting {}", request.url);
            return Err(EngineError::AccessDenied);
        }

        let variant = backend::select_initial(&self.profile, &self.settings);
        info!("Starting '{}' ({}) on {} backend", request.title, request.url, variant);

        self.mute.reset_session();
        self.dispatcher.dispatch(&PlaybackEvent::PlaybackStarted {
            title: request.title.clone(),
            url: request.url.clone(),
        });
        self.session = Some(PlaybackSession::new(request, variant, now));
        let access_at = now + self.config.access_check_interval_ms;
        self.timers.schedule(TimerKind::AccessCheck, self.generation, access_at);

        self.enter_preparing(variant, now);
        Ok(())
    }

    /// External stop
    pub fn stop(&mut self, _now_ms: u64) {
        self.end_session(StopReason::UserStopped);
    }

    pub fn shutdown(&mut self, _now_ms: u64) {
        self.end_session(StopReason::Shutdown);
    }

    pub fn revoke_access(&mut self, _now_ms: u64) {
        if self.session.is_some() {
            warn!("Access revoked; stopping playback");
        }
        self.end_session(StopReason::AccessDenied);
    }

    pub fn pause(&mut self, _now_ms: u64) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let active = matches!(self.state, SessionState::Buffering | SessionState::Rendering);
        if session.paused || !active {
            return;
        }
        if let Some(backend) = self.backend.as_mut() {
            if let Err(e) = backend.pause() {
                warn!("Pause failed on {} backend: {}", backend.variant(), e);
                return;
            }
        }
        session.paused = true;
        session.is_playing = false;
        self.watchdog.clear();
        info!("Paused at {}", format_position(session.last_known_position_ms));
    }

    pub fn resume(&mut self, now_ms: u64) {
        let now = self.tick(now_ms);
        let paused = self.session.as_ref().map(|s| s.paused).unwrap_or(false);
        if !paused {
            return;
        }
        if self.gate.check_access() == AccessDecision::Denied {
            warn!("Access denied on resume");
            self.end_session(StopReason::AccessDenied);
            return;
        }

        let mut position = 0;
        if let Some(backend) = self.backend.as_mut() {
            if let Err(e) = backend.play() {
                warn!("Resume failed on {} backend: {}", backend.variant(), e);
                return;
            }
            position = backend.position_ms();
        }
        if let Some(session) = self.session.as_mut() {
            session.paused = false;
            session.is_playing = true;
        }
        if self.state == SessionState::Rendering {
            self.watchdog.reset(now, position);
        }
    }

    pub fn seek_relative(&mut self, delta_ms: i64, now_ms: u64) {
        let now = self.tick(now_ms);
        if !matches!(self.state, SessionState::Buffering | SessionState::Rendering) {
            return;
        }
        let Some(backend) = self.backend.as_mut() else {
            return;
        };
        match backend.seek_relative(delta_ms) {
            Ok(()) => {
                let position = backend.position_ms();
                debug!("Seek {:+} ms from {}", delta_ms, format_position(position));
                if self.state == SessionState::Rendering {
                    self.watchdog.reset(now, position);
                }
            }
            Err(e) => warn!("Seek failed on {} backend: {}", backend.variant(), e),
        }
    }

    // ---- backend events ----

    pub fn handle_backend_event(&mut self, generation: u64, event: BackendEvent, now_ms: u64) {
        let now = self.tick(now_ms);
        if generation != self.generation || self.backend.is_none() || self.session.is_none() {
            debug!(
                "Discarding {:?} from backend #{} (current #{})",
                event, generation, self.generation
            );
            return;
        }

        match event {
            BackendEvent::Prepared => self.on_prepared(now),
            BackendEvent::BufferingStart => self.on_buffering_start(now),
            BackendEvent::BufferingEnd => self.on_buffering_end(now),
            BackendEvent::FirstVideoFrame => self.on_first_frame(now),
            BackendEvent::PositionTick(position) => {
                if let Some(session) = self.session.as_mut() {
                    session.note_position(position, now);
                }
            }
            BackendEvent::SeekCompleted => {
                let actions = self.mute.on_seek_completed();
                self.apply_mute(actions, now);
            }
            BackendEvent::Error { kind, message } => {
                self.on_backend_failure(kind.into(), message, now)
            }
            BackendEvent::Completed => {
                info!("Stream completed");
                self.end_session(StopReason::Completed);
            }
        }
    }

    fn on_prepared(&mut self, now: u64) {
        if self.state != SessionState::Preparing {
            debug!("Ignoring Prepared in {}", self.state);
            return;
        }
        let started = match self.backend.as_mut() {
            Some(backend) => backend.play(),
            None => return,
        };
        if let Err(e) = started {
            let kind = e.backend_kind().unwrap_or(backend::BackendErrorKind::Unknown);
            self.on_backend_failure(kind.into(), e.to_string(), now);
            return;
        }

        let after_stall = match self.session.as_mut() {
            Some(session) => {
                session.is_playing = true;
                std::mem::take(&mut session.after_stall)
            }
            None => false,
        };
        self.set_state(SessionState::Buffering);

        let first_sample = now + self.watchdog.first_sample_delay(after_stall);
        self.timers.schedule(TimerKind::WatchdogSample, self.generation, first_sample);
        let fallback_at = now + self.config.spinner_fallback_ms;
        self.timers.schedule(TimerKind::SpinnerFallback, self.generation, fallback_at);

        let actions = self.mute.on_playing_started();
        self.apply_mute(actions, now);
    }

    fn on_buffering_start(&mut self, now: u64) {
        let first_frame = match self.session.as_mut() {
            Some(session) => {
                session.is_buffering = true;
                session.first_frame_rendered
            }
            None => return,
        };

        if first_frame {
            // The watchdog keeps its baseline: a rebuffer that never ends is a stall.
            if self.state == SessionState::Rendering {
                self.set_state(SessionState::Buffering);
            }
            let at = now + self.config.delayed_spinner_ms;
            self.timers.schedule(TimerKind::DelayedSpinner, self.generation, at);
        } else {
            self.set_spinner(true);
        }

        let actions = self.mute.on_buffering_start();
        self.apply_mute(actions, now);
    }

    fn on_buffering_end(&mut self, now: u64) {
        let first_frame = match self.session.as_mut() {
            Some(session) => {
                session.is_buffering = false;
                session.first_frame_rendered
            }
            None => return,
        };
        self.timers.cancel(TimerKind::DelayedSpinner);

        if first_frame {
            self.set_spinner(false);
            if self.state == SessionState::Buffering {
                self.enter_rendering(now);
            }
        }

        let actions = self.mute.on_buffering_end();
        self.apply_mute(actions, now);
    }

    fn on_first_frame(&mut self, now: u64) {
        if !matches!(self.state, SessionState::Buffering | SessionState::Rendering) {
            debug!("Ignoring first frame in {}", self.state);
            return;
        }
        if let Some(session) = self.session.as_mut() {
            if session.first_frame_rendered {
                return;
            }
            session.first_frame_rendered = true;
            session.is_buffering = false;
        }
        self.timers.cancel(TimerKind::DelayedSpinner);
        self.timers.cancel(TimerKind::SpinnerFallback);
        self.set_spinner(false);
        if self.state == SessionState::Buffering {
            self.enter_rendering(now);
        }

        let actions = self.mute.on_first_frame();
        self.apply_mute(actions, now);
    }

    /// Route a backend failure: restart in place or escalate
    fn on_backend_failure(&mut self, kind: FailureKind, message: String, now: u64) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let variant = session.current_variant;
        warn!("{} backend failed ({:?}): {}", variant, kind, message);

        if kind.is_recoverable() {
            let restarts = session.restarts(variant);
            if restarts < self.config.max_restarts {
                self.restart_in_place(kind, now);
                return;
            }
            warn!("{} backend used all {} restarts", variant, self.config.max_restarts);
            self.escalate(FailureKind::RestartsExhausted, message, now);
        } else {
            self.escalate(kind, message, now);
        }
    }

    fn restart_in_place(&mut self, kind: FailureKind, now: u64) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let variant = session.current_variant;
        session.history.record(variant, kind, now);
        let attempt = session.note_restart(variant);
        session.after_stall = kind == FailureKind::Stall;

        warn!(
            "Restarting {} backend in {} ms (attempt {}/{})",
            variant, self.config.restart_delay_ms, attempt, self.config.max_restarts
        );
        self.teardown_backend();
        self.set_state(SessionState::Restarting);
        self.set_spinner(true);
        let restart_at = now + self.config.restart_delay_ms;
        self.timers.schedule(TimerKind::RestartBackend, self.generation, restart_at);
    }

    fn escalate(&mut self, kind: FailureKind, message: String, now: u64) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let from = session.current_variant;
        session.history.record(from, kind, now);
        let next = backend::select_next(&self.profile, &self.settings, &session.history);

        self.teardown_backend();
        self.set_state(SessionState::Escalating);

        match next {
            Some(to) => {
                warn!("Escalating from {} to {} backend", from, to);
                self.dispatcher.dispatch(&PlaybackEvent::BackendSwitched { from, to });
                self.enter_preparing(to, now);
            }
            None => {
                error!("No backend left to try after {} failed: {}", from, message);
                self.dispatcher.dispatch(&PlaybackEvent::PlaybackFailed {
                    message: format!(
                        "Playback failed: this stream cannot be played on this device ({})",
                        message
                    ),
                });
                self.end_session(StopReason::BackendsExhausted);
            }
        }
    }

    // ---- timers ----

    fn on_timer(&mut self, kind: TimerKind, generation: u64, now: u64) {
        if self.session.is_none() {
            return;
        }
        if !kind.is_session_scoped() && generation != self.generation {
            debug!("Dropping stale {:?} timer for backend #{}", kind, generation);
            return;
        }

        match kind {
            TimerKind::WatchdogSample => self.on_watchdog_sample(now),
            TimerKind::RestartBackend => {
                if self.state == SessionState::Restarting {
                    if let Some(variant) = self.session.as_ref().map(|s| s.current_variant) {
                        self.enter_preparing(variant, now);
                    }
                }
            }
            TimerKind::UnmuteFallback | TimerKind::DelayedUnmute | TimerKind::ResyncTimeout => {
                let actions = self.mute.on_timer(kind);
                self.apply_mute(actions, now);
            }
            TimerKind::SpinnerFallback => self.on_spinner_fallback(now),
            TimerKind::DelayedSpinner => {
                if self.session.as_ref().map(|s| s.is_buffering).unwrap_or(false) {
                    self.set_spinner(true);
                }
            }
            TimerKind::AccessCheck => match self.gate.check_access() {
                AccessDecision::Allowed => {
                    self.timers.schedule(
                        TimerKind::AccessCheck,
                        self.generation,
                        now + self.config.access_check_interval_ms,
                    );
                }
                AccessDecision::Denied => {
                    warn!("Access re-check denied; stopping playback");
                    self.end_session(StopReason::AccessDenied);
                }
            },
        }
    }

    fn on_watchdog_sample(&mut self, now: u64) {
        let next_sample = now + self.watchdog.interval_ms();
        self.timers.schedule(TimerKind::WatchdogSample, self.generation, next_sample);

        let rebuffering = self.state == SessionState::Buffering
            && self.session.as_ref().map(|s| s.first_frame_rendered).unwrap_or(false);
        if self.state != SessionState::Rendering && !rebuffering {
            return;
        }
        let (position, backend_playing) = match self.backend.as_ref() {
            Some(backend) => (backend.position_ms(), backend.is_playing()),
            None => return,
        };
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.note_position(position, now);
        // A rebuffer is expected to end on its own; engines differ on whether
        // they report playing meanwhile.
        let playing = (backend_playing || rebuffering) && session.is_playing && !session.paused;

        match self.watchdog.sample(now, position, playing) {
            WatchdogVerdict::Stalled { stuck_for_ms } => {
                warn!(
                    "Position stuck at {} for {} ms; treating as stall",
                    format_position(position),
                    stuck_for_ms
                );
                let message = format!("no progress for {} ms", stuck_for_ms);
                self.on_backend_failure(FailureKind::Stall, message, now);
            }
            WatchdogVerdict::Advancing => {
                if session.note_progress(now, self.config.restart_budget_reset_ms) {
                    info!(
                        "{} backend healthy for {} ms; restart budget refilled",
                        session.current_variant, self.config.restart_budget_reset_ms
                    );
                }
            }
            verdict => {
                session.note_no_progress();
                debug!("watchdog sample at {}: {:?}", format_position(position), verdict);
            }
        }
    }

    fn on_spinner_fallback(&mut self, now: u64) {
        let first_frame = self.session.as_ref().map(|s| s.first_frame_rendered).unwrap_or(true);
        let backend_playing = self.backend.as_ref().map(|b| b.is_playing()).unwrap_or(false);
        if self.state != SessionState::Buffering || first_frame || !backend_playing {
            return;
        }

        info!("No first-frame report; assuming playback is rendering");
        if let Some(session) = self.session.as_mut() {
            session.is_buffering = false;
        }
        self.set_spinner(false);
        self.enter_rendering(now);

        let actions = self.mute.on_promoted();
        self.apply_mute(actions, now);
    }

    // ---- transitions ----

    fn set_state(&mut self, to: SessionState) {
        let from = self.state;
        if from == to {
            return;
        }
        info!("Playback state: {} -> {}", from, to);
        self.state = to;
        self.dispatcher.dispatch(&PlaybackEvent::StateChanged { from, to });
    }

    fn set_spinner(&mut self, visible: bool) {
        if self.spinner_visible != visible {
            self.spinner_visible = visible;
            self.dispatcher.dispatch(&PlaybackEvent::BufferingIndicator { visible });
        }
    }

    fn enter_rendering(&mut self, now: u64) {
        let position = self.backend.as_ref().map(|b| b.position_ms()).unwrap_or(0);
        self.set_state(SessionState::Rendering);
        self.watchdog.reset(now, position);
        if let Some(session) = self.session.as_mut() {
            session.note_position(position, now);
        }
    }

    /// Release the live backend and hand the surface back
    fn teardown_backend(&mut self) {
        if let Some(mut backend) = self.backend.take() {
            debug!("Tearing down {} backend #{}", backend.variant(), self.generation);
            backend.detach_surface();
            self.surface.detach(self.generation);
            backend.release();
        }
        self.timers.cancel_backend_scoped();
        self.watchdog.clear();
    }

    fn sink_for(&self, generation: u64) -> EventSink {
        let tx = self.tx.clone();
        EventSink::new(generation, move |generation, event| {
            // The supervisor may already be gone during shutdown.
            let _ = tx.send(SupervisorMessage::Backend { generation, event });
        })
    }

    /// Release whatever is live, then build and prepare `variant`
    fn enter_preparing(&mut self, variant: BackendVariant, now: u64) {
        self.teardown_backend();
        self.generation += 1;
        let generation = self.generation;

        let (url, was_muted) = match self.session.as_mut() {
            Some(session) => {
                session.begin_backend(variant);
                (session.request.url.clone(), session.is_muted)
            }
            None => return,
        };
        let timings =
            (variant == BackendVariant::Native).then(|| tuning::mute_timings(&self.profile));
        self.mute.begin_backend(timings);
        if was_muted {
            // A fresh engine starts unmuted.
            if let Some(session) = self.session.as_mut() {
                session.is_muted = false;
            }
            self.dispatcher.dispatch(&PlaybackEvent::MuteChanged { muted: false });
        }

        self.set_state(SessionState::Preparing);
        self.set_spinner(true);

        let mut backend = match self.factory.create(variant) {
            Ok(backend) => backend,
            Err(e) => {
                let kind = e.backend_kind().unwrap_or(backend::BackendErrorKind::Unknown);
                let message = format!("could not create {} backend: {}", variant, e);
                self.on_backend_failure(kind.into(), message, now);
                return;
            }
        };

        if let Err(e) = self.surface.attach(generation) {
            error!("Output surface unavailable for backend #{}: {}", generation, e);
            backend.release();
            self.on_backend_failure(FailureKind::Unknown, e.to_string(), now);
            return;
        }
        if let Err(e) = backend.attach_surface(&self.surface) {
            backend.release();
            self.surface.detach(generation);
            let kind = e.backend_kind().unwrap_or(backend::BackendErrorKind::Unknown);
            self.on_backend_failure(kind.into(), e.to_string(), now);
            return;
        }
        self.backend = Some(backend);

        let actions = self.mute.on_preparing();
        self.apply_mute(actions, now);

        let sink = self.sink_for(generation);
        let prepared = match self.backend.as_mut() {
            Some(backend) => backend.prepare(&url, &self.settings, &self.profile, sink),
            None => return,
        };
        if let Err(e) = prepared {
            let kind = e.backend_kind().unwrap_or(backend::BackendErrorKind::Unknown);
            self.on_backend_failure(kind.into(), e.to_string(), now);
        }
    }

    /// Stop everything in one step: backend, timers, watchdog, mute
    fn end_session(&mut self, reason: StopReason) {
        if self.session.is_none() {
            return;
        }
        self.teardown_backend();
        self.timers.cancel_all();
        self.mute.reset_session();
        self.set_spinner(false);
        self.set_state(SessionState::Stopped);

        if let Some(mut session) = self.session.take() {
            session.is_playing = false;
            info!(
                "Session '{}' ended ({:?}) at {}",
                session.request.title,
                reason,
                format_position(session.last_known_position_ms)
            );
            self.last_session = Some(session);
        }
        self.dispatcher.dispatch(&PlaybackEvent::PlaybackStopped { reason });
    }

    fn apply_mute(&mut self, actions: Vec<MuteAction>, now: u64) {
        for action in actions {
            match action {
                MuteAction::SetMuted(muted) => {
                    if let Some(backend) = self.backend.as_mut() {
                        if let Err(e) = backend.set_muted(muted) {
                            warn!(
                                "Could not set mute={} on {} backend: {}",
                                muted,
                                backend.variant(),
                                e
                            );
                        }
                    }
                    if let Some(session) = self.session.as_mut() {
                        session.is_muted = muted;
                    }
                    debug!("Audio {}", if muted { "muted" } else { "unmuted" });
                    self.dispatcher.dispatch(&PlaybackEvent::MuteChanged { muted });
                }
                MuteAction::Schedule(kind, delay_ms) => {
                    self.timers.schedule(kind, self.generation, now + delay_ms);
                }
                MuteAction::Cancel(kind) => self.timers.cancel(kind),
                MuteAction::ResyncSeek => {
                    if let Some(backend) = self.backend.as_mut() {
                        let position = backend.position_ms();
                        info!("Resync seek to {}", format_position(position));
                        if let Err(e) = backend.seek_to(position) {
                            warn!("Resync seek failed: {}", e);
                        }
                    }
                }
            }
        }
    }
}

impl Drop for PlaybackSupervisor {
    fn drop(&mut self) {
        self.end_session(StopReason::Shutdown);
        self.teardown_backend();
    }
}
