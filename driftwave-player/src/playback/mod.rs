//! Playback: chunk queue, gapless scheduling, engine state machine and its async driver

pub mod engine;
pub mod queue;
pub mod scheduler;
pub mod service;
pub mod telemetry;

pub use engine::StreamEngine;
pub use queue::ChunkQueue;
pub use scheduler::GaplessScheduler;
pub use service::{PlayerHandle, PlayerService};
pub use telemetry::{EngineStats, TelemetrySnapshot};
