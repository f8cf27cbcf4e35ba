//! Error types for driftwave-player
//!
//! Decode errors are local to one chunk and never stop the pipeline.
//! Device errors end the current playback session and are surfaced to the
//! caller; the engine does not restart the device on its own.

use thiserror::Error;

use crate::audio::decoder::DecodeError;

/// Main error type for driftwave-player
#[derive(Error, Debug)]
pub enum Error {
    /// Shared configuration loading errors
    #[error("{0}")]
    Common(#[from] driftwave_common::Error),

    /// Configuration value out of range
    #[error("Configuration error: {0}")]
    Config(String),

    /// Chunk could not be decoded; the chunk was dropped
    #[error("Chunk decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Output device could not be acquired
    #[error("Audio device initialization failed: {0}")]
    DeviceInit(String),

    /// Output device failed while a session was active
    #[error("Audio device failure: {0}")]
    DeviceRuntime(String),

    /// Output sink rejected a request
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Operation not valid in the current playback state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Invalid caller-supplied value
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The engine task has shut down
    #[error("Player service is not running")]
    ServiceStopped,
}

/// Convenience Result type using driftwave-player Error
pub type Result<T> = std::result::Result<T, Error>;
