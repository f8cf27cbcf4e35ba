//! Entry and exit fades
//!
//! Short gain ramps that hide the discontinuity when audio starts out of
//! silence (stream start, resume after stop, restart after an underrun) or
//! is cut off by a hard stop. Contiguous chunks are never faded.
//!
//! Entry ramp: sample `i` of the first `n` gets `curve.gain_in(i / n)`, so
//! the first sample is silent and gain rises strictly until sample `n`,
//! after which the signal is untouched. The exit ramp is the entry ramp
//! reversed in time, ending on a silent sample.

use driftwave_common::FadeCurve;

use super::types::SampleBuffer;

/// Fade length and shape, precomputed from config
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadeSpec {
    pub samples: usize,
    pub curve: FadeCurve,
}

impl FadeSpec {
    pub fn new(samples: usize, curve: FadeCurve) -> Self {
        Self { samples, curve }
    }
}

/// Fade in the head of `buffer`
pub fn apply_entry_fade(mut buffer: SampleBuffer, fade: FadeSpec) -> SampleBuffer {
    ramp_in(buffer.samples_mut(), fade);
    buffer
}

/// Fade out the tail of `buffer`
pub fn apply_exit_fade(mut buffer: SampleBuffer, fade: FadeSpec) -> SampleBuffer {
    ramp_out(buffer.samples_mut(), fade);
    buffer
}

/// In-place entry ramp over `min(fade.samples, samples.len())` samples
pub fn ramp_in(samples: &mut [f32], fade: FadeSpec) {
    let n = fade.samples.min(samples.len());
    if n == 0 {
        return;
    }
    for (i, sample) in samples[..n].iter_mut().enumerate() {
        *sample *= fade.curve.gain_in(i as f32 / n as f32);
    }
}

/// In-place exit ramp over the last `min(fade.samples, samples.len())` samples
pub fn ramp_out(samples: &mut [f32], fade: FadeSpec) {
    let n = fade.samples.min(samples.len());
    if n == 0 {
        return;
    }
    let len = samples.len();
    for (i, sample) in samples[len - n..].iter_mut().rev().enumerate() {
        *sample *= fade.curve.gain_in(i as f32 / n as f32);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ones(len: usize) -> SampleBuffer {
        SampleBuffer::new(vec![1.0; len], 24_000)
    }

    #[test]
    fn test_entry_fade_ramps_head_only() {
        let faded = apply_entry_fade(ones(1000), FadeSpec::new(240, FadeCurve::Linear));
        let s = faded.samples();

        assert_eq!(s[0], 0.0);
        for i in 1..240 {
            assert!(s[i] > s[i - 1], "gain must rise strictly at sample {}", i);
            assert!(s[i] < 1.0);
        }
        assert!(s[240..].iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_exit_fade_mirrors_entry() {
        let fade = FadeSpec::new(100, FadeCurve::SCurve);
        let entry = apply_entry_fade(ones(300), fade);
        let exit = apply_exit_fade(ones(300), fade);

        let head: Vec<f32> = entry.samples()[..100].to_vec();
        let mut tail: Vec<f32> = exit.samples()[200..].to_vec();
        tail.reverse();
        assert_eq!(head, tail);
        assert_eq!(*exit.samples().last().unwrap(), 0.0);
        assert!(exit.samples()[..200].iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_fade_longer_than_buffer_is_clamped() {
        let faded = apply_entry_fade(ones(10), FadeSpec::new(240, FadeCurve::EqualPower));
        assert_eq!(faded.len(), 10);
        assert_eq!(faded.samples()[0], 0.0);
        assert!(faded.samples()[9] < 1.0);
    }

    #[test]
    fn test_zero_length_fade_is_identity() {
        let faded = apply_entry_fade(ones(50), FadeSpec::new(0, FadeCurve::Linear));
        assert!(faded.samples().iter().all(|&v| v == 1.0));

        let mut empty: Vec<f32> = Vec::new();
        ramp_out(&mut empty, FadeSpec::new(10, FadeCurve::Linear));
        assert!(empty.is_empty());
    }

    #[test]
    fn test_fade_preserves_sign() {
        let buffer = SampleBuffer::new(vec![-0.5; 20], 24_000);
        let faded = apply_entry_fade(buffer, FadeSpec::new(20, FadeCurve::Linear));
        assert!(faded.samples()[1..].iter().all(|&v| v < 0.0 && v > -0.5));
    }
}
