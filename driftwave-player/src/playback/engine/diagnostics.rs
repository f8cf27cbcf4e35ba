//! Diagnostics and monitoring
//!
//! **Responsibilities:**
//! - Status accessors (state, volume, buffer levels, timeline position)
//! - Buffer health computation and BufferUpdate emission
//! - Telemetry snapshots and output analysis (RMS, spectrum, waveform)
//!
//! Buffer health counts queued audio plus the full length of every
//! in-flight segment, so it only changes when a chunk is enqueued (up) or a
//! segment finishes (down), never while a segment is playing.

use driftwave_common::events::EngineEvent;
use driftwave_common::PlaybackState;

use super::core::StreamEngine;
use crate::audio::{AnalysisTap, OutputSink};
use crate::config::EngineConfig;
use crate::playback::telemetry::{buffer_health, EngineStats, TelemetrySnapshot};

impl<S: OutputSink> StreamEngine<S> {
    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// Queued plus in-flight audio in seconds
    pub fn buffered_seconds(&self) -> f64 {
        self.queue.total_duration() + self.scheduler.in_flight_duration()
    }

    /// Buffered audio relative to `target_buffer_seconds`, in [0, 1]
    pub fn buffer_health(&self) -> f32 {
        buffer_health(self.buffered_seconds(), self.config.target_buffer_seconds)
    }

    pub fn queued_chunks(&self) -> usize {
        self.queue.len()
    }

    pub fn in_flight_segments(&self) -> usize {
        self.scheduler.in_flight_count()
    }

    /// Where the next scheduled segment will start on the output clock
    pub fn next_start_time(&self) -> f64 {
        self.scheduler.next_start_time()
    }

    pub fn current_time(&self) -> f64 {
        self.sink.current_time()
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            state: self.state,
            volume: self.volume,
            buffer_health: self.buffer_health(),
            buffered_seconds: self.buffered_seconds(),
            queued_chunks: self.queue.len(),
            in_flight_segments: self.scheduler.in_flight_count(),
            clock_time: self.sink.current_time(),
            next_start_time: self.scheduler.next_start_time(),
            stats: self.stats.clone(),
        }
    }

    /// RMS level of the most recent output
    pub fn current_rms_level(&self) -> f32 {
        self.analyzer.current_rms_level(self.sink.analysis_tap())
    }

    /// Log-spaced band magnitudes of the most recent output
    pub fn frequency_snapshot(&self) -> Vec<f32> {
        self.analyzer.frequency_snapshot(self.sink.analysis_tap())
    }

    /// Most recent output samples, oldest first
    pub fn time_domain_snapshot(&self) -> Vec<f32> {
        self.analyzer.time_domain_snapshot(self.sink.analysis_tap())
    }

    /// Handle to the output analysis ring, for readers on other tasks
    pub fn analysis_tap(&self) -> AnalysisTap {
        self.sink.analysis_tap().clone()
    }

    pub(super) fn emit_buffer_update(&mut self) {
        let event = EngineEvent::BufferUpdate {
            buffer_health: self.buffer_health(),
            buffered_seconds: self.buffered_seconds(),
            queued_chunks: self.queue.len(),
            in_flight_segments: self.scheduler.in_flight_count(),
            timestamp: chrono::Utc::now(),
        };
        self.emit(event);
    }
}
