//! Output gain with click-free ramping
//!
//! [`GainControl`] is the lock-free handle the engine writes volume
//! changes into. [`GainRamp`] lives on the render side and walks the
//! applied gain toward the latest target one frame at a time.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Shared gain target, written by the engine and read by the renderer
#[derive(Debug, Clone)]
pub struct GainControl {
    target_bits: Arc<AtomicU32>,
    ramp_frames: Arc<AtomicU32>,
}

impl GainControl {
    pub fn new(initial: f32) -> Self {
        Self {
            target_bits: Arc::new(AtomicU32::new(initial.to_bits())),
            ramp_frames: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Set a new target gain reached over `ramp` at `sample_rate`
    pub fn set_target(&self, gain: f32, ramp: Duration, sample_rate: u32) {
        let frames = (ramp.as_secs_f64() * sample_rate as f64).round() as u32;
        self.ramp_frames.store(frames, Ordering::Relaxed);
        self.target_bits.store(gain.to_bits(), Ordering::Release);
    }

    pub fn target_gain(&self) -> f32 {
        f32::from_bits(self.target_bits.load(Ordering::Acquire))
    }

    pub fn ramp_frames(&self) -> u32 {
        self.ramp_frames.load(Ordering::Relaxed)
    }
}

/// Per-frame linear ramp toward the control's target
#[derive(Debug, Clone)]
pub struct GainRamp {
    current: f32,
    target: f32,
    step: f32,
    remaining: u32,
}

impl GainRamp {
    pub fn new(initial: f32) -> Self {
        Self {
            current: initial,
            target: initial,
            step: 0.0,
            remaining: 0,
        }
    }

    /// Gain applied to the most recent frame
    pub fn current(&self) -> f32 {
        self.current
    }

    fn retarget(&mut self, target: f32, ramp_frames: u32) {
        self.target = target;
        if ramp_frames == 0 {
            self.current = target;
            self.step = 0.0;
            self.remaining = 0;
        } else {
            self.step = (target - self.current) / ramp_frames as f32;
            self.remaining = ramp_frames;
        }
    }

    /// Pick up a changed target, then return the gain for the next frame
    pub fn next_gain(&mut self, control: &GainControl) -> f32 {
        let target = control.target_gain();
        if target != self.target {
            self.retarget(target, control.ramp_frames());
        }
        if self.remaining > 0 {
            self.remaining -= 1;
            self.current = if self.remaining == 0 {
                self.target
            } else {
                self.current + self.step
            };
        }
        self.current
    }

    /// Scale a block of mono frames
    pub fn apply(&mut self, frames: &mut [f32], control: &GainControl) {
        for sample in frames.iter_mut() {
            *sample *= self.next_gain(control);
        }
    }
}
