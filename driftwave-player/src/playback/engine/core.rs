//! Core stream engine - lifecycle and state machine
//!
//! **Responsibilities:**
//! - StreamEngine struct definition and construction
//! - Device acquisition (initialize) and release (shutdown)
//! - Playback state machine: `Stopped → Connecting → Playing ⇄ Paused`,
//!   with `stop` reachable from every state
//! - Volume control and the periodic safety tick
//! - Device failure handling
//!
//! The engine is a plain `&mut self` state machine. It never spawns tasks
//! or blocks; whoever owns it (normally [`PlayerService`]) feeds it
//! commands, segment completions and ticks one at a time.
//!
//! [`PlayerService`]: crate::playback::service::PlayerService

use std::time::Duration;

use driftwave_common::events::{EngineEvent, EventBus, EventListener, ListenerId, ListenerSet};
use driftwave_common::PlaybackState;
use tracing::{debug, error, info, warn};

use crate::audio::envelope::FadeSpec;
use crate::audio::{LevelAnalyzer, OutputSink};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::playback::queue::ChunkQueue;
use crate::playback::scheduler::GaplessScheduler;
use crate::playback::telemetry::EngineStats;

/// Continuous-stream playback engine over an [`OutputSink`]
pub struct StreamEngine<S: OutputSink> {
    pub(super) config: EngineConfig,
    pub(super) sink: S,
    pub(super) state: PlaybackState,
    pub(super) queue: ChunkQueue,
    pub(super) scheduler: GaplessScheduler,
    pub(super) listeners: ListenerSet,
    pub(super) event_bus: EventBus,
    pub(super) analyzer: LevelAnalyzer,
    pub(super) stats: EngineStats,
    /// Requested volume (0.0-1.0); the sink ramps toward it
    pub(super) volume: f32,
}

impl<S: OutputSink> StreamEngine<S> {
    /// Create an engine in the Stopped state. The device is not touched
    /// until [`initialize`](Self::initialize) or [`play`](Self::play).
    pub fn new(sink: S, config: EngineConfig) -> Self {
        let event_bus = EventBus::new(config.event_capacity);
        let mut listeners = ListenerSet::new();
        listeners.add(Box::new(event_bus.clone()));

        let scheduler = GaplessScheduler::new(
            config.lookahead_ceiling(),
            FadeSpec::new(config.entry_fade_samples(), config.fade_curve),
        );

        info!(
            "Creating stream engine: {} Hz, target buffer {:.1}s, look-ahead {:.2}s",
            config.sample_rate,
            config.target_buffer_seconds,
            config.lookahead_ceiling()
        );

        Self {
            volume: config.initial_volume,
            config,
            sink,
            state: PlaybackState::Stopped,
            queue: ChunkQueue::new(),
            scheduler,
            listeners,
            event_bus,
            analyzer: LevelAnalyzer::new(),
            stats: EngineStats::default(),
        }
    }

    /// Acquire the output device. Idempotent.
    pub fn initialize(&mut self) -> Result<()> {
        if self.sink.is_open() {
            return Ok(());
        }

        self.sink.open().map_err(|e| match e {
            Error::DeviceInit(_) => e,
            other => Error::DeviceInit(other.to_string()),
        })?;
        self.sink.set_gain(self.volume, Duration::ZERO);

        info!(
            "Output device ready ({} Hz device clock)",
            self.sink.device_sample_rate()
        );
        Ok(())
    }

    /// Start or resume playback
    ///
    /// From Stopped this acquires the device (via Connecting) and starts a
    /// fresh timeline at the current clock; the first segment gets an entry
    /// fade. From Paused it resumes the suspended device and keeps the
    /// timeline. On device failure the engine ends up Stopped.
    pub fn play(&mut self) -> Result<()> {
        match self.state {
            PlaybackState::Playing => {
                debug!("Play ignored: already playing");
                Ok(())
            }
            PlaybackState::Connecting => Err(Error::InvalidState(
                "play requested while the device is being acquired".to_string(),
            )),
            PlaybackState::Paused => {
                if let Err(e) = self.sink.resume() {
                    return Err(self.fail_device(e.to_string()));
                }
                self.transition(PlaybackState::Playing);
                self.drain()
            }
            PlaybackState::Stopped => {
                self.transition(PlaybackState::Connecting);

                if let Err(e) = self.initialize() {
                    warn!("Failed to start playback: {}", e);
                    self.transition(PlaybackState::Stopped);
                    return Err(e);
                }
                // The device may still be suspended from a pause before the last stop
                if let Err(e) = self.sink.resume() {
                    return Err(self.fail_device(e.to_string()));
                }

                let now = self.sink.current_time() + self.sink.scheduling_latency();
                self.scheduler.reset(now);
                self.transition(PlaybackState::Playing);
                self.drain()
            }
        }
    }

    /// Suspend output, keeping the timeline and everything scheduled
    ///
    /// Pausing while stopped or connecting does nothing.
    pub fn pause(&mut self) -> Result<()> {
        match self.state {
            PlaybackState::Playing => {
                if let Err(e) = self.sink.suspend() {
                    return Err(self.fail_device(e.to_string()));
                }
                self.transition(PlaybackState::Paused);
                Ok(())
            }
            PlaybackState::Paused => Ok(()),
            state => {
                debug!("Pause ignored while {}", state);
                Ok(())
            }
        }
    }

    /// Hard reset: cancel everything scheduled, drop the queue, go to Stopped
    ///
    /// Idempotent. The device stays open so a later `play` restarts quickly.
    pub fn stop(&mut self) {
        self.sink.cancel_all();
        let dropped = self.queue.clear();
        let forgotten = self.scheduler.reset(self.sink.current_time());

        let was_stopped = self.state == PlaybackState::Stopped;
        if !was_stopped {
            info!(
                "Playback stopped ({} queued chunks dropped, {} segments cancelled)",
                dropped, forgotten
            );
            self.transition(PlaybackState::Stopped);
        }
        if !was_stopped || dropped > 0 || forgotten > 0 {
            self.emit_buffer_update();
        }
    }

    /// Stop and release the device
    pub fn shutdown(&mut self) {
        self.stop();
        if self.sink.is_open() {
            self.sink.close();
            info!("Output device released");
        }
    }

    /// Set output volume, clamped to 0.0-1.0; returns the applied value
    ///
    /// The sink ramps to the new gain over `volume_ramp_ms`.
    pub fn set_volume(&mut self, volume: f32) -> Result<f32> {
        if !volume.is_finite() {
            return Err(Error::InvalidInput(format!("volume {} is not finite", volume)));
        }

        let clamped = volume.clamp(0.0, 1.0);
        self.sink.set_gain(clamped, self.config.volume_ramp());

        if clamped != self.volume {
            self.volume = clamped;
            debug!("Volume set to {:.2}", clamped);
            self.emit(EngineEvent::VolumeChanged {
                volume: clamped,
                timestamp: chrono::Utc::now(),
            });
        }
        Ok(clamped)
    }

    /// Periodic safety net: surface device errors and retry draining
    pub fn tick(&mut self) -> Result<()> {
        if let Some(message) = self.sink.take_error() {
            return Err(self.fail_device(message));
        }
        if self.state == PlaybackState::Playing && !self.queue.is_empty() {
            self.drain()?;
        }
        Ok(())
    }

    /// Register a synchronous listener; delivery is in registration order
    pub fn add_listener(&mut self, listener: Box<dyn EventListener>) -> ListenerId {
        self.listeners.add(listener)
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    /// Broadcast bus that receives every engine event
    pub fn event_bus(&self) -> EventBus {
        self.event_bus.clone()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub(super) fn emit(&mut self, event: EngineEvent) {
        self.listeners.dispatch(&event);
    }

    pub(super) fn transition(&mut self, next: PlaybackState) {
        let old = self.state;
        if old == next {
            return;
        }
        debug_assert!(
            old.can_transition_to(next),
            "illegal transition {} -> {}",
            old,
            next
        );

        info!("Playback state: {} -> {}", old, next);
        self.state = next;
        self.emit(EngineEvent::PlaybackStateChanged {
            old_state: old,
            new_state: next,
            timestamp: chrono::Utc::now(),
        });
    }

    /// End the session after a device failure and report it
    ///
    /// No automatic restart: the caller decides whether to `play` again.
    pub(super) fn fail_device(&mut self, message: String) -> Error {
        error!("Audio device failure: {}", message);

        self.sink.cancel_all();
        self.queue.clear();
        self.scheduler.reset(self.sink.current_time());
        self.sink.close();

        self.transition(PlaybackState::Stopped);
        self.emit(EngineEvent::DeviceError {
            message: message.clone(),
            timestamp: chrono::Utc::now(),
        });
        self.emit_buffer_update();

        Error::DeviceRuntime(message)
    }
}
