//! Chunk payload generation
//!
//! Produces the same wire format a streaming producer sends: mono signed
//! 16-bit little-endian PCM, base64 encoded with the standard alphabet.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use driftwave_player::audio::EncodedChunk;
use std::f32::consts::PI;

/// Quantize a float sample the way the encoder below does
pub fn pcm16_value(sample: f32) -> f32 {
    quantize(sample) as f32 / 32768.0
}

fn quantize(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * 32767.0).round() as i16
}

/// Encode float samples as a base64 PCM16LE chunk
pub fn encode_pcm16(samples: &[f32]) -> EncodedChunk {
    let bytes: Vec<u8> = samples
        .iter()
        .flat_map(|&s| quantize(s).to_le_bytes())
        .collect();
    EncodedChunk::new(STANDARD.encode(bytes))
}

/// `len` samples all equal to `value`
pub fn constant_chunk(value: f32, len: usize) -> EncodedChunk {
    encode_pcm16(&vec![value; len])
}

pub fn sine_samples(frequency: f32, sample_rate: u32, len: usize, amplitude: f32) -> Vec<f32> {
    (0..len)
        .map(|i| amplitude * (2.0 * PI * frequency * i as f32 / sample_rate as f32).sin())
        .collect()
}

pub fn sine_chunk(frequency: f32, sample_rate: u32, len: usize, amplitude: f32) -> EncodedChunk {
    encode_pcm16(&sine_samples(frequency, sample_rate, len, amplitude))
}
