//! Async driver for the stream engine
//!
//! [`PlayerService`] owns a [`StreamEngine`] on a single tokio task and is
//! the only code that touches it. Commands from any number of
//! [`PlayerHandle`]s, completion reports from the sink and a periodic tick
//! are interleaved by one `select!` loop, so every engine operation runs to
//! completion before the next one starts.
//!
//! After each step the service publishes a [`TelemetrySnapshot`] that
//! handles can read without a round trip.

use std::sync::Arc;
use std::time::Duration;

use driftwave_common::events::{EngineEvent, EventBus};
use driftwave_common::PlaybackState;
use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::engine::StreamEngine;
use super::telemetry::TelemetrySnapshot;
use crate::audio::{AnalysisTap, CompletionReceiver, EncodedChunk, LevelAnalyzer, OutputSink};
use crate::error::{Error, Result};

/// Pending commands before senders wait
const COMMAND_CAPACITY: usize = 256;

enum PlayerCommand {
    Play(oneshot::Sender<Result<()>>),
    Pause(oneshot::Sender<Result<()>>),
    Stop(oneshot::Sender<()>),
    QueueChunk(EncodedChunk),
    SetVolume(f32, oneshot::Sender<Result<f32>>),
    Snapshot(oneshot::Sender<TelemetrySnapshot>),
    Shutdown,
}

/// Cloneable control handle for a running [`PlayerService`]
#[derive(Clone)]
pub struct PlayerHandle {
    commands: mpsc::Sender<PlayerCommand>,
    events: EventBus,
    telemetry: Arc<RwLock<TelemetrySnapshot>>,
    tap: AnalysisTap,
    analyzer: Arc<LevelAnalyzer>,
}

impl PlayerHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> PlayerCommand,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| Error::ServiceStopped)?;
        rx.await.map_err(|_| Error::ServiceStopped)
    }

    pub async fn play(&self) -> Result<()> {
        self.request(PlayerCommand::Play).await?
    }

    pub async fn pause(&self) -> Result<()> {
        self.request(PlayerCommand::Pause).await?
    }

    pub async fn stop(&self) -> Result<()> {
        self.request(PlayerCommand::Stop).await
    }

    /// Feed one chunk; chunks are processed in the order they are sent
    pub async fn queue_chunk(&self, chunk: impl Into<EncodedChunk>) -> Result<()> {
        self.commands
            .send(PlayerCommand::QueueChunk(chunk.into()))
            .await
            .map_err(|_| Error::ServiceStopped)
    }

    /// Returns the clamped volume actually applied
    pub async fn set_volume(&self, volume: f32) -> Result<f32> {
        self.request(|tx| PlayerCommand::SetVolume(volume, tx)).await?
    }

    /// Fresh snapshot taken on the engine task
    pub async fn snapshot(&self) -> Result<TelemetrySnapshot> {
        self.request(PlayerCommand::Snapshot).await
    }

    /// Snapshot published after the engine's last step
    pub fn telemetry(&self) -> TelemetrySnapshot {
        self.telemetry.read().clone()
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.telemetry.read().state
    }

    pub fn buffer_health(&self) -> f32 {
        self.telemetry.read().buffer_health
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn current_rms_level(&self) -> f32 {
        self.analyzer.current_rms_level(&self.tap)
    }

    pub fn frequency_snapshot(&self) -> Vec<f32> {
        self.analyzer.frequency_snapshot(&self.tap)
    }

    pub fn time_domain_snapshot(&self) -> Vec<f32> {
        self.analyzer.time_domain_snapshot(&self.tap)
    }

    /// Ask the service to stop playback, release the device and exit
    pub async fn shutdown(&self) {
        if self.commands.send(PlayerCommand::Shutdown).await.is_err() {
            debug!("Player service already stopped");
        }
    }
}

/// Single-task owner of a [`StreamEngine`]
pub struct PlayerService<S: OutputSink> {
    engine: StreamEngine<S>,
    commands: mpsc::Receiver<PlayerCommand>,
    completions: CompletionReceiver,
    telemetry: Arc<RwLock<TelemetrySnapshot>>,
    tick_interval: Duration,
}

impl<S: OutputSink + 'static> PlayerService<S> {
    /// Wrap `engine`; `completions` must be the receiver paired with its sink
    pub fn new(engine: StreamEngine<S>, completions: CompletionReceiver) -> (Self, PlayerHandle) {
        let (tx, rx) = mpsc::channel(COMMAND_CAPACITY);
        let telemetry = Arc::new(RwLock::new(engine.snapshot()));

        let handle = PlayerHandle {
            commands: tx,
            events: engine.event_bus(),
            telemetry: Arc::clone(&telemetry),
            tap: engine.analysis_tap(),
            analyzer: Arc::new(LevelAnalyzer::new()),
        };

        let service = Self {
            tick_interval: engine.config().tick_interval(),
            engine,
            commands: rx,
            completions,
            telemetry,
        };
        (service, handle)
    }

    /// Create the service and run it on a new tokio task
    pub fn spawn(
        engine: StreamEngine<S>,
        completions: CompletionReceiver,
    ) -> (PlayerHandle, JoinHandle<()>) {
        let (service, handle) = Self::new(engine, completions);
        let task = tokio::spawn(service.run());
        (handle, task)
    }

    /// Process commands, completions and ticks until shutdown
    ///
    /// Ends when a handle sends shutdown or every handle is dropped. The
    /// engine is stopped and its device released on the way out.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Player service started");

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(PlayerCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some(id) = self.completions.recv() => {
                    if let Err(e) = self.engine.on_segment_finished(id) {
                        warn!("Failed to continue after {}: {}", id, e);
                    }
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.engine.tick() {
                        warn!("Engine tick failed: {}", e);
                    }
                }
            }
            self.publish();
        }

        self.engine.shutdown();
        self.publish();
        info!("Player service stopped");
    }

    fn handle_command(&mut self, command: PlayerCommand) {
        match command {
            PlayerCommand::Play(reply) => {
                let _ = reply.send(self.engine.play());
            }
            PlayerCommand::Pause(reply) => {
                let _ = reply.send(self.engine.pause());
            }
            PlayerCommand::Stop(reply) => {
                self.engine.stop();
                let _ = reply.send(());
            }
            PlayerCommand::QueueChunk(chunk) => {
                if let Err(e) = self.engine.queue_chunk(&chunk) {
                    debug!("Chunk not queued: {}", e);
                }
            }
            PlayerCommand::SetVolume(volume, reply) => {
                let _ = reply.send(self.engine.set_volume(volume));
            }
            PlayerCommand::Snapshot(reply) => {
                let _ = reply.send(self.engine.snapshot());
            }
            PlayerCommand::Shutdown => {}
        }
    }

    fn publish(&self) {
        *self.telemetry.write() = self.engine.snapshot();
    }
}
