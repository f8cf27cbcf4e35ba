//! # Driftwave Player Library (driftwave-player)
//!
//! Continuous audio streaming engine with gapless playback.
//!
//! **Purpose:** Accept a stream of small base64 PCM16 chunks, schedule them
//! back to back on an output device clock with no gaps, absorb producer
//! stalls as counted underruns, and report state, buffer health and output
//! levels to observers.
//!
//! **Architecture:** decoder → FIFO [`playback::ChunkQueue`] →
//! [`playback::GaplessScheduler`] → [`audio::OutputSink`] (cpal or virtual),
//! driven by [`playback::StreamEngine`] on a tokio task.

pub mod audio;
pub mod config;
pub mod error;
pub mod playback;

pub use config::EngineConfig;
pub use error::{Error, Result};
pub use playback::{PlayerHandle, PlayerService, StreamEngine};
