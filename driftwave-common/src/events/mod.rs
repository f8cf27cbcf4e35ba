//! Event types for the Driftwave event system
//!
//! Two delivery paths share one event enum:
//! - [`ListenerSet`]: synchronous, in-order delivery to registered
//!   [`EventListener`]s. A listener that fails (or panics) is logged and
//!   skipped; the remaining listeners still receive the event.
//! - [`EventBus`] (tokio::broadcast): one-to-many delivery to async
//!   subscribers. An `EventBus` is itself a listener, so it is usually
//!   registered in the `ListenerSet` like any other sink.

mod playback_types;

pub use playback_types::PlaybackState;

use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use tokio::sync::broadcast;
use tracing::warn;

/// Engine event types
///
/// Serialized with an internal `type` tag so external consumers (UI,
/// visualizer, CLI `--events-json`) can dispatch on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EngineEvent {
    /// Playback state machine moved
    #[serde(rename = "state-change")]
    PlaybackStateChanged {
        old_state: PlaybackState,
        new_state: PlaybackState,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Output gain target changed
    #[serde(rename = "volume-change")]
    VolumeChanged {
        /// New volume (0.0-1.0)
        volume: f32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Producer fell behind the output clock and the timeline was restarted
    #[serde(rename = "underrun")]
    Underrun {
        /// Underruns since the engine was created
        count: u64,
        /// How far the timeline had fallen behind the output clock (seconds)
        lag_seconds: f64,
        /// Output clock time at which playback restarted
        clock_time: f64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Buffered audio changed (chunk enqueued, segment finished, reset)
    #[serde(rename = "buffer-update")]
    BufferUpdate {
        /// Buffered audio relative to the target window (0.0-1.0)
        buffer_health: f32,
        buffered_seconds: f64,
        queued_chunks: usize,
        in_flight_segments: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Output device failed mid-stream; playback has been stopped
    #[serde(rename = "error")]
    DeviceError {
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl EngineEvent {
    /// Short wire name for the event kind, as written in the `type` tag
    pub fn event_type(&self) -> &'static str {
        match self {
            EngineEvent::PlaybackStateChanged { .. } => "state-change",
            EngineEvent::VolumeChanged { .. } => "volume-change",
            EngineEvent::Underrun { .. } => "underrun",
            EngineEvent::BufferUpdate { .. } => "buffer-update",
            EngineEvent::DeviceError { .. } => "error",
        }
    }
}

/// Error type returned by a failing listener
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// Synchronous event sink
///
/// Listeners run on the engine's thread while it holds its own state, so
/// they must return quickly and must not call back into the engine.
pub trait EventListener: Send {
    fn on_event(&mut self, event: &EngineEvent) -> Result<(), ListenerError>;
}

impl<F> EventListener for F
where
    F: FnMut(&EngineEvent) -> Result<(), ListenerError> + Send,
{
    fn on_event(&mut self, event: &EngineEvent) -> Result<(), ListenerError> {
        self(event)
    }
}

/// Handle returned by [`ListenerSet::add`], used to remove the listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Ordered collection of synchronous listeners with per-listener isolation
#[derive(Default)]
pub struct ListenerSet {
    listeners: Vec<(ListenerId, Box<dyn EventListener>)>,
    next_id: u64,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener; events are delivered in registration order
    pub fn add(&mut self, listener: Box<dyn EventListener>) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, listener));
        id
    }

    /// Remove a listener, returning whether it was registered
    pub fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Deliver `event` to every listener
    ///
    /// Returns the number of listeners that accepted the event. Errors and
    /// panics are logged and do not stop delivery to later listeners.
    pub fn dispatch(&mut self, event: &EngineEvent) -> usize {
        let mut delivered = 0;

        for (id, listener) in self.listeners.iter_mut() {
            match catch_unwind(AssertUnwindSafe(|| listener.on_event(event))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    warn!(
                        "Listener {:?} failed on {} event: {}",
                        id,
                        event.event_type(),
                        e
                    );
                }
                Err(_) => {
                    warn!("Listener {:?} panicked on {} event", id, event.event_type());
                }
            }
        }

        delivered
    }
}

/// Broadcast channel for async event subscribers
///
/// Events are buffered up to `capacity`; slow subscribers observe
/// `RecvError::Lagged` rather than blocking the engine.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Examples
    ///
    /// ```
    /// use driftwave_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(256);
    /// assert_eq!(event_bus.capacity(), 256);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: EngineEvent,
    ) -> Result<usize, broadcast::error::SendError<EngineEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl EventListener for EventBus {
    fn on_event(&mut self, event: &EngineEvent) -> Result<(), ListenerError> {
        // No subscribers is not a listener failure
        self.emit_lossy(event.clone());
        Ok(())
    }
}
