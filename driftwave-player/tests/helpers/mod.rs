//! Test helper modules for Driftwave Player integration tests
//!
//! Provides reusable test infrastructure components:
//! - Chunk generation: PCM16LE base64 payloads with known content
//! - EngineHarness: a StreamEngine on a VirtualSink with a manual clock
//! - EventRecorder: synchronous listener that keeps every engine event

#![allow(dead_code)]

pub mod chunk_generator;
pub mod harness;

pub use chunk_generator::{constant_chunk, encode_pcm16, pcm16_value, sine_chunk, sine_samples};
pub use harness::{EngineHarness, EventRecorder, TEST_RATE};
