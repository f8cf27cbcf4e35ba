//! Core audio data types
//!
//! Audio moves through the engine as mono f32 samples in [-1.0, 1.0] at the
//! stream's fixed sample rate. Chunks arrive encoded, are decoded into a
//! [`SampleBuffer`], wait in the FIFO queue, and are handed to the output
//! sink as a [`ScheduledSegment`] with an absolute start time.

use std::fmt;

/// One chunk as received from the producer: base64 text of PCM16LE mono
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedChunk {
    payload: String,
}

impl EncodedChunk {
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.payload
    }

    /// Length of the encoded text in bytes
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

impl From<String> for EncodedChunk {
    fn from(payload: String) -> Self {
        Self::new(payload)
    }
}

impl From<&str> for EncodedChunk {
    fn from(payload: &str) -> Self {
        Self::new(payload)
    }
}

/// Decoded mono audio at a known sample rate
///
/// Immutable once queued; the only later rewrite is the entry fade applied
/// just before scheduling, which takes the buffer by value.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl SampleBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Buffer of `len` zero samples
    pub fn silence(len: usize, sample_rate: u32) -> Self {
        Self::new(vec![0.0; len], sample_rate)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn samples_mut(&mut self) -> &mut [f32] {
        &mut self.samples
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of samples (mono, so also the number of frames)
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Playback duration: `len / sample_rate`
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Identifier of one scheduled segment, unique for the engine's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SegmentId(pub u64);

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seg-{}", self.0)
    }
}

/// A buffer committed to the output timeline
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledSegment {
    pub id: SegmentId,
    /// Absolute output-clock time of the first sample (seconds)
    pub start_time: f64,
    pub buffer: SampleBuffer,
}

impl ScheduledSegment {
    pub fn new(id: SegmentId, start_time: f64, buffer: SampleBuffer) -> Self {
        Self {
            id,
            start_time,
            buffer,
        }
    }

    pub fn duration(&self) -> f64 {
        self.buffer.duration_seconds()
    }

    /// Output-clock time just past the last sample
    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration()
    }
}
