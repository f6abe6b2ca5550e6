//! Coordination thread
//!
//! [`PlaybackEngine`] runs a [`PlaybackSupervisor`] on its own thread. Commands
//! and backend events share one inbox; the loop sleeps until the next
//! message or the next timer deadline, whichever comes first.

use crossbeam_channel::{RecvTimeoutError, Sender};
use log::{debug, error, info};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::observer::{EventSubscription, PlaybackEvent};
use super::session::PlaybackRequest;
use super::{PlaybackSupervisor, SessionState, SupervisorCommand, SupervisorMessage};
use crate::backend::BackendVariant;
use crate::utils::error::{EngineError, Result};

/// Snapshot of the supervisor, refreshed after every loop iteration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineStatus {
    pub state: SessionState,
    pub variant: Option<BackendVariant>,
    pub generation: u64,
    pub muted: bool,
    pub buffering_indicator: bool,
    pub position_ms: u64,
    pub restarts: u32,
}

impl EngineStatus {
    fn snapshot(supervisor: &PlaybackSupervisor) -> Self {
        let session = supervisor.session();
        let variant = supervisor.current_variant();
        Self {
            state: supervisor.state(),
            variant,
            generation: supervisor.generation(),
            muted: supervisor.is_muted(),
            buffering_indicator: supervisor.spinner_visible(),
            position_ms: session.map(|s| s.last_known_position_ms).unwrap_or(0),
            restarts: match (session, variant) {
                (Some(s), Some(v)) => s.restarts(v),
                _ => 0,
            },
        }
    }
}

/// Handle to a supervisor running on its own thread
pub struct PlaybackEngine {
    tx: Sender<SupervisorMessage>,
    dispatcher: super::EventDispatcher,
    status: Arc<RwLock<EngineStatus>>,
    worker: Option<JoinHandle<()>>,
}

impl PlaybackEngine {
    /// Move `supervisor` onto a new coordination thread
    pub fn spawn(supervisor: PlaybackSupervisor) -> Result<Self> {
        let tx = supervisor.sender();
        let dispatcher = supervisor.dispatcher().clone();
        let status = Arc::new(RwLock::new(EngineStatus::snapshot(&supervisor)));

        let status_clone = Arc::clone(&status);
        let worker = thread::Builder::new()
            .name("stbplay-supervisor".into())
            .spawn(move || run_loop(supervisor, status_clone))?;

        info!("Playback engine started");
        Ok(Self {
            tx,
            dispatcher,
            status,
            worker: Some(worker),
        })
    }

    fn send(&self, command: SupervisorCommand) -> Result<()> {
        self.tx.send(SupervisorMessage::Command(command))?;
        Ok(())
    }

    /// Request playback. A blank URL is rejected here and nothing is sent.
    pub fn play<T: Into<String>, U: Into<String>>(&self, title: T, url: U) -> Result<()> {
        let request = PlaybackRequest::new(title, url);
        request.validate()?;
        self.send(SupervisorCommand::Play(request))
    }

    pub fn stop(&self) -> Result<()> {
        self.send(SupervisorCommand::Stop)
    }

    pub fn pause(&self) -> Result<()> {
        self.send(SupervisorCommand::Pause)
    }

    pub fn resume(&self) -> Result<()> {
        self.send(SupervisorCommand::Resume)
    }

    pub fn seek_relative(&self, delta_ms: i64) -> Result<()> {
        self.send(SupervisorCommand::SeekRelative(delta_ms))
    }

    /// Push-style access revocation
    pub fn revoke_access(&self) -> Result<()> {
        self.send(SupervisorCommand::AccessRevoked)
    }

    /// Subscribe to playback events
    pub fn subscribe<F>(&self, callback: F) -> EventSubscription
    where
        F: Fn(&PlaybackEvent) + Send + Sync + 'static,
    {
        self.dispatcher.subscribe(callback)
    }

    pub fn status(&self) -> EngineStatus {
        self.status.read().clone()
    }

    /// Stop playback and join the coordination thread
    pub fn shutdown(mut self) -> Result<()> {
        self.shutdown_inner()
    }

    fn shutdown_inner(&mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        // The loop may already have exited; joining is enough then.
        let _ = self.tx.send(SupervisorMessage::Command(SupervisorCommand::Shutdown));
        worker
            .join()
            .map_err(|_| EngineError::Internal("supervisor thread panicked".into()))?;
        info!("Playback engine stopped");
        Ok(())
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown_inner() {
            error!("Playback engine shutdown failed: {}", e);
        }
    }
}

fn run_loop(mut supervisor: PlaybackSupervisor, status: Arc<RwLock<EngineStatus>>) {
    let epoch = Instant::now();
    let clock = || epoch.elapsed().as_millis() as u64;
    let rx = supervisor.receiver();

    loop {
        let message = match supervisor.next_deadline() {
            Some(deadline) => {
                let wait = deadline.saturating_sub(clock());
                match rx.recv_timeout(Duration::from_millis(wait)) {
                    Ok(message) => Some(message),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            None => match rx.recv() {
                Ok(message) => Some(message),
                Err(_) => break,
            },
        };

        let now = clock();
        if let Some(message) = message {
            if message == SupervisorMessage::Command(SupervisorCommand::Shutdown) {
                supervisor.shutdown(now);
                *status.write() = EngineStatus::snapshot(&supervisor);
                break;
            }
            supervisor.handle_message(message, now);
        }
        supervisor.fire_due_timers(now);
        *status.write() = EngineStatus::snapshot(&supervisor);
    }
    debug!("Supervisor loop exited");
}
