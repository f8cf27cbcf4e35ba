//! Output analysis taps
//!
//! The renderer copies every block it outputs (after gain) into an
//! [`AnalysisTap`] ring. Readers pull RMS level, a log-spaced spectrum and
//! a raw time-domain snapshot from it without touching the playback path:
//! the renderer only ever `try_lock`s the ring and skips the copy when a
//! reader holds it.

use std::sync::Arc;

use parking_lot::Mutex;
use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::config::analysis::{FFT_SIZE, SPECTRUM_BANDS};

#[derive(Debug)]
struct TapRing {
    samples: Vec<f32>,
    write_pos: usize,
    filled: usize,
}

/// Fixed-size ring of the most recent output samples
#[derive(Debug, Clone)]
pub struct AnalysisTap {
    ring: Arc<Mutex<TapRing>>,
    capacity: usize,
}

impl AnalysisTap {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            ring: Arc::new(Mutex::new(TapRing {
                samples: vec![0.0; capacity],
                write_pos: 0,
                filled: 0,
            })),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a block from the render path; dropped if a reader holds the ring
    pub fn write(&self, block: &[f32]) {
        if let Some(mut ring) = self.ring.try_lock() {
            ring.push(block);
        }
    }

    /// Append a block, waiting for the lock (non-realtime callers)
    pub fn write_blocking(&self, block: &[f32]) {
        self.ring.lock().push(block);
    }

    /// Up to `count` most recent samples, oldest first
    pub fn latest(&self, count: usize) -> Vec<f32> {
        let ring = self.ring.lock();
        let count = count.min(ring.filled);
        let cap = ring.samples.len();
        let start = (ring.write_pos + cap - count) % cap;
        (0..count).map(|i| ring.samples[(start + i) % cap]).collect()
    }

    pub fn clear(&self) {
        let mut ring = self.ring.lock();
        ring.samples.iter_mut().for_each(|s| *s = 0.0);
        ring.write_pos = 0;
        ring.filled = 0;
    }
}

impl TapRing {
    fn push(&mut self, block: &[f32]) {
        let cap = self.samples.len();
        // Only the tail of an oversized block can survive
        let block = &block[block.len().saturating_sub(cap)..];
        for &sample in block {
            self.samples[self.write_pos] = sample;
            self.write_pos = (self.write_pos + 1) % cap;
        }
        self.filled = (self.filled + block.len()).min(cap);
    }
}

/// Root-mean-square level of `samples` (0.0 for an empty slice)
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
}

/// Spectrum and level analysis over the most recent output
pub struct LevelAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
}

impl LevelAnalyzer {
    pub fn new() -> Self {
        let fft = FftPlanner::new().plan_fft_forward(FFT_SIZE);
        let window = (0..FFT_SIZE)
            .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / FFT_SIZE as f32).cos()))
            .collect();
        Self { fft, window }
    }

    /// RMS over the last FFT window of output
    pub fn current_rms_level(&self, tap: &AnalysisTap) -> f32 {
        rms(&tap.latest(FFT_SIZE))
    }

    /// Log-spaced band magnitudes in [0, 1] for the last FFT window
    pub fn frequency_snapshot(&self, tap: &AnalysisTap) -> Vec<f32> {
        self.spectrum(&tap.latest(FFT_SIZE))
    }

    /// Raw output samples, as many as the tap holds
    pub fn time_domain_snapshot(&self, tap: &AnalysisTap) -> Vec<f32> {
        tap.latest(tap.capacity())
    }

    /// Band magnitudes for `samples`; short input is zero-padded at the front
    pub fn spectrum(&self, samples: &[f32]) -> Vec<f32> {
        let samples = &samples[samples.len().saturating_sub(FFT_SIZE)..];
        let pad = FFT_SIZE - samples.len();

        let mut buffer: Vec<Complex<f32>> = vec![Complex::new(0.0, 0.0); FFT_SIZE];
        for (i, &sample) in samples.iter().enumerate() {
            buffer[pad + i] = Complex::new(sample * self.window[pad + i], 0.0);
        }
        self.fft.process(&mut buffer);

        let nyquist = FFT_SIZE / 2;
        // Hann coherent gain is 0.5, so a full-scale bin-centred sine reads 1.0
        let norm = 4.0 / FFT_SIZE as f32;

        (0..SPECTRUM_BANDS)
            .map(|band| {
                let low = (band as f32 / SPECTRUM_BANDS as f32).powf(2.0);
                let high = ((band + 1) as f32 / SPECTRUM_BANDS as f32).powf(2.0);
                let start = (low * nyquist as f32) as usize;
                let end = ((high * nyquist as f32) as usize).max(start + 1).min(nyquist);

                buffer[start..end]
                    .iter()
                    .map(|bin| bin.norm() * norm)
                    .fold(0.0f32, f32::max)
                    .min(1.0)
            })
            .collect()
    }
}

impl Default for LevelAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, rate: f32, len: usize, amplitude: f32) -> Vec<f32> {
        (0..len)
            .map(|i| amplitude * (2.0 * std::f32::consts::PI * freq * i as f32 / rate).sin())
            .collect()
    }

    #[test]
    fn test_tap_keeps_most_recent_samples() {
        let tap = AnalysisTap::new(4);
        tap.write(&[1.0, 2.0, 3.0]);
        assert_eq!(tap.latest(10), vec![1.0, 2.0, 3.0]);

        tap.write(&[4.0, 5.0]);
        assert_eq!(tap.latest(4), vec![2.0, 3.0, 4.0, 5.0]);
        assert_eq!(tap.latest(2), vec![4.0, 5.0]);

        tap.write(&[6.0, 7.0, 8.0, 9.0, 10.0, 11.0]);
        assert_eq!(tap.latest(4), vec![8.0, 9.0, 10.0, 11.0]);

        tap.clear();
        assert!(tap.latest(4).is_empty());
    }

    #[test]
    fn test_rms_of_known_signals() {
        assert_eq!(rms(&[]), 0.0);
        assert_eq!(rms(&[0.5; 64]), 0.5);

        let wave = sine(1000.0, 24_000.0, 2400, 1.0);
        assert!((rms(&wave) - std::f32::consts::FRAC_1_SQRT_2).abs() < 0.01);
    }

    #[test]
    fn test_spectrum_of_silence_is_zero() {
        let analyzer = LevelAnalyzer::new();
        let bands = analyzer.spectrum(&vec![0.0; FFT_SIZE]);
        assert_eq!(bands.len(), SPECTRUM_BANDS);
        assert!(bands.iter().all(|&b| b == 0.0));
    }

    #[test]
    fn test_spectrum_peaks_in_tone_band() {
        let analyzer = LevelAnalyzer::new();
        // 1 kHz at 24 kHz lands in bin ~21, inside band 4 (bins 16..25)
        let bands = analyzer.spectrum(&sine(1000.0, 24_000.0, FFT_SIZE, 0.9));

        let (peak_band, &peak) = bands
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .unwrap();
        assert_eq!(peak_band, 4);
        assert!(peak > 0.5);
        assert!(bands.iter().all(|&b| (0.0..=1.0).contains(&b)));
        assert!(bands[12] < 0.05);
    }

    #[test]
    fn test_snapshots_read_from_tap() {
        let tap = AnalysisTap::new(2048);
        let analyzer = LevelAnalyzer::new();
        assert_eq!(analyzer.current_rms_level(&tap), 0.0);

        tap.write_blocking(&vec![0.25; 3000]);
        assert!((analyzer.current_rms_level(&tap) - 0.25).abs() < 1e-6);
        assert_eq!(analyzer.time_domain_snapshot(&tap).len(), 2048);
    }
}
