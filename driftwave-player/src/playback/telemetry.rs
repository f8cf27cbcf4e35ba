//! Engine counters and telemetry snapshots

use chrono::{DateTime, Utc};
use driftwave_common::PlaybackState;
use serde::Serialize;

/// Cumulative counters since the engine was created
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EngineStats {
    pub chunks_received: u64,
    /// Chunks that failed to decode
    pub chunks_dropped: u64,
    pub segments_scheduled: u64,
    pub segments_completed: u64,
    pub underruns: u64,
    pub seconds_scheduled: f64,
    pub last_underrun_at: Option<DateTime<Utc>>,
}

/// Point-in-time view of the engine for UIs and logs
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TelemetrySnapshot {
    pub state: PlaybackState,
    pub volume: f32,
    pub buffer_health: f32,
    pub buffered_seconds: f64,
    pub queued_chunks: usize,
    pub in_flight_segments: usize,
    pub clock_time: f64,
    pub next_start_time: f64,
    pub stats: EngineStats,
}

/// Buffered audio as a fraction of the target window, clamped to [0, 1]
pub fn buffer_health(buffered_seconds: f64, target_seconds: f64) -> f32 {
    if target_seconds <= 0.0 {
        return if buffered_seconds > 0.0 { 1.0 } else { 0.0 };
    }
    (buffered_seconds / target_seconds).clamp(0.0, 1.0) as f32
}
