//! Chunk decoder
//!
//! Turns one [`EncodedChunk`] (base64 text of signed 16-bit little-endian
//! mono PCM) into a [`SampleBuffer`] of f32 samples.
//!
//! Each sample is `i16 / 32768.0`, so full-scale negative maps to exactly
//! -1.0 and every value lands in [-1.0, 1.0). ASCII whitespace inside the
//! payload (line-wrapped base64) is ignored. A payload whose byte length is
//! odd is rejected: a trailing half sample means the producer framed the
//! stream incorrectly and the chunk cannot be trusted.

use std::borrow::Cow;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use thiserror::Error;

use super::types::{EncodedChunk, SampleBuffer};

/// Per-chunk decode failure. The chunk is dropped; the stream continues.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("chunk payload is empty")]
    Empty,

    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("PCM16 payload has odd length {bytes} (trailing byte after {samples} samples)")]
    OddByteLength { bytes: usize, samples: usize },
}

const PCM16_SCALE: f32 = 32768.0;

/// Decode one chunk at the stream's sample rate
pub fn decode(chunk: &EncodedChunk, sample_rate: u32) -> Result<SampleBuffer, DecodeError> {
    let payload = strip_whitespace(chunk.as_str());
    if payload.is_empty() {
        return Err(DecodeError::Empty);
    }

    let bytes = STANDARD.decode(payload.as_bytes())?;
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }
    if bytes.len() % 2 != 0 {
        return Err(DecodeError::OddByteLength {
            bytes: bytes.len(),
            samples: bytes.len() / 2,
        });
    }

    let samples = bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / PCM16_SCALE)
        .collect();

    Ok(SampleBuffer::new(samples, sample_rate))
}

fn strip_whitespace(payload: &str) -> Cow<'_, str> {
    if payload.bytes().any(|b| b.is_ascii_whitespace()) {
        Cow::Owned(
            payload
                .chars()
                .filter(|c| !c.is_ascii_whitespace())
                .collect(),
        )
    } else {
        Cow::Borrowed(payload)
    }
}
