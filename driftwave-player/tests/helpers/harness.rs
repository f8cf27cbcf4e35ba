//! Deterministic engine harness
//!
//! Wraps a [`StreamEngine`] over a [`VirtualSink`] whose clock only moves
//! when the test says so. Completion reports are pumped back into the
//! engine synchronously after every clock step.

use std::sync::{Arc, Mutex};

use driftwave_common::events::{EngineEvent, ListenerError};
use driftwave_common::PlaybackState;
use driftwave_player::audio::{completion_channel, CompletionReceiver, VirtualSink};
use driftwave_player::{EngineConfig, StreamEngine};

/// Sample rate used by every harness (24 kHz, 2400 samples per 100 ms)
pub const TEST_RATE: u32 = 24_000;

/// Synchronous listener that records every event it sees
#[derive(Clone, Default)]
pub struct EventRecorder {
    events: Arc<Mutex<Vec<EngineEvent>>>,
}

impl EventRecorder {
    pub fn events(&self) -> Vec<EngineEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }

    pub fn underrun_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, EngineEvent::Underrun { .. }))
            .count()
    }

    /// Buffer health values from BufferUpdate events, in emission order
    pub fn health_values(&self) -> Vec<f32> {
        self.events()
            .iter()
            .filter_map(|e| match e {
                EngineEvent::BufferUpdate { buffer_health, .. } => Some(*buffer_health),
                _ => None,
            })
            .collect()
    }

    pub fn states(&self) -> Vec<PlaybackState> {
        self.events()
            .iter()
            .filter_map(|e| match e {
                EngineEvent::PlaybackStateChanged { new_state, .. } => Some(*new_state),
                _ => None,
            })
            .collect()
    }

    pub fn device_errors(&self) -> Vec<String> {
        self.events()
            .iter()
            .filter_map(|e| match e {
                EngineEvent::DeviceError { message, .. } => Some(message.clone()),
                _ => None,
            })
            .collect()
    }
}

pub struct EngineHarness {
    pub engine: StreamEngine<VirtualSink>,
    pub sink: VirtualSink,
    pub recorder: EventRecorder,
    completions: CompletionReceiver,
}

impl EngineHarness {
    /// Engine at [`TEST_RATE`] with unity volume so rendered output equals input
    pub fn new() -> Self {
        Self::with_config(EngineConfig {
            sample_rate: TEST_RATE,
            initial_volume: 1.0,
            ..EngineConfig::default()
        })
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let (tx, completions) = completion_channel();
        let sink = VirtualSink::new(config.sample_rate, config.analysis_window, tx);
        let mut engine = StreamEngine::new(sink.clone(), config);

        let recorder = EventRecorder::default();
        let events = Arc::clone(&recorder.events);
        engine.add_listener(Box::new(
            move |event: &EngineEvent| -> Result<(), ListenerError> {
                events.lock().unwrap().push(event.clone());
                Ok(())
            },
        ));

        Self {
            engine,
            sink,
            recorder,
            completions,
        }
    }

    /// Move the output clock and deliver every completion it produced
    pub fn advance(&mut self, seconds: f64) {
        self.sink.advance(seconds);
        self.pump();
    }

    /// Deliver pending completion reports; returns how many were delivered
    pub fn pump(&mut self) -> usize {
        let mut delivered = 0;
        while let Ok(id) = self.completions.try_recv() {
            self.engine
                .on_segment_finished(id)
                .expect("completion handling failed");
            delivered += 1;
        }
        delivered
    }

    /// Start times of everything scheduled so far
    pub fn start_times(&self) -> Vec<f64> {
        self.sink.history().iter().map(|r| r.start_time).collect()
    }
}
