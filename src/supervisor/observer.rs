//! Playback event fan-out
//!
//! Observers (presence reporting, UI overlays) hear about playback but can
//! never influence it: a panicking observer is logged and skipped.

use log::error;
use parking_lot::RwLock;
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::SessionState;
use crate::backend::BackendVariant;

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StopReason {
    /// Stream reached its end
    Completed,
    /// Stop command
    UserStopped,
    /// The access gate refused playback
    AccessDenied,
    /// Every candidate backend failed
    BackendsExhausted,
    /// A new play request replaced the session
    Replaced,
    /// The engine shut down
    Shutdown,
}

/// Events published to observers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PlaybackEvent {
    PlaybackStarted { title: String, url: String },
    PlaybackStopped { reason: StopReason },
    StateChanged { from: SessionState, to: SessionState },
    /// Low-priority notice that a different engine took over
    BackendSwitched { from: BackendVariant, to: BackendVariant },
    BufferingIndicator { visible: bool },
    MuteChanged { muted: bool },
    /// The single user-visible terminal failure message
    PlaybackFailed { message: String },
}

/// Receives playback events
pub trait PlaybackObserver: Send + Sync {
    fn on_event(&self, event: &PlaybackEvent);
}

type Callback = Arc<dyn Fn(&PlaybackEvent) + Send + Sync>;
type Subscribers = Arc<RwLock<Vec<(u64, Callback)>>>;

/// Cloneable fan-out to subscribed callbacks
#[derive(Clone, Default)]
pub struct EventDispatcher {
    subscribers: Subscribers,
    next_id: Arc<AtomicU64>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a callback; it stays subscribed until the handle is dropped
    pub fn subscribe<F>(&self, callback: F) -> EventSubscription
    where
        F: Fn(&PlaybackEvent) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.subscribers.write().push((id, Arc::new(callback)));
        EventSubscription {
            id,
            subscribers: Arc::clone(&self.subscribers),
        }
    }

    /// Subscribe an observer for the dispatcher's lifetime
    pub fn attach(&self, observer: Arc<dyn PlaybackObserver>) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.subscribers
            .write()
            .push((id, Arc::new(move |event: &PlaybackEvent| observer.on_event(event))));
    }

    pub fn dispatch(&self, event: &PlaybackEvent) {
        // Snapshot so callbacks may subscribe or unsubscribe.
        let callbacks: Vec<Callback> =
            self.subscribers.read().iter().map(|(_, cb)| Arc::clone(cb)).collect();
        for callback in callbacks {
            if panic::catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                error!("Observer panicked while handling {:?}", event);
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

/// Subscription handle; dropping it unsubscribes
pub struct EventSubscription {
    id: u64,
    subscribers: Subscribers,
}

impl EventSubscription {
    /// Keep the callback subscribed for the dispatcher's lifetime
    pub fn detach(self) {
        std::mem::forget(self);
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.subscribers.write().retain(|(id, _)| *id != self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_subscribe_and_drop() {
        let dispatcher = EventDispatcher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);

        let sub = dispatcher.subscribe(move |e| seen_clone.lock().push(e.clone()));
        dispatcher.dispatch(&PlaybackEvent::MuteChanged { muted: true });
        assert_eq!(dispatcher.subscriber_count(), 1);

        drop(sub);
        dispatcher.dispatch(&PlaybackEvent::MuteChanged { muted: false });
        assert_eq!(*seen.lock(), vec![PlaybackEvent::MuteChanged { muted: true }]);
        assert_eq!(dispatcher.subscriber_count(), 0);
    }

    #[test]
    fn test_panicking_observer_is_isolated() {
        let dispatcher = EventDispatcher::new();
        let count = Arc::new(AtomicU64::new(0));
        let count_clone = Arc::clone(&count);

        let _bad = dispatcher.subscribe(|_| panic!("observer bug"));
        let _good = dispatcher.subscribe(move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        dispatcher.dispatch(&PlaybackEvent::BufferingIndicator { visible: true });
        dispatcher.dispatch(&PlaybackEvent::BufferingIndicator { visible: false });
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_attached_observer() {
        struct Counter(AtomicU64);
        impl PlaybackObserver for Counter {
            fn on_event(&self, _event: &PlaybackEvent) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let dispatcher = EventDispatcher::new();
        let counter = Arc::new(Counter(AtomicU64::new(0)));
        dispatcher.attach(counter.clone());
        dispatcher.dispatch(&PlaybackEvent::PlaybackStopped { reason: StopReason::Completed });
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_event_json_shape() {
        let json = serde_json::to_string(&PlaybackEvent::BackendSwitched {
            from: BackendVariant::Modern,
            to: BackendVariant::Legacy,
        })
        .unwrap();
        assert_eq!(json, r#"{"event":"backend_switched","from":"modern","to":"legacy"}"#);
    }
}
