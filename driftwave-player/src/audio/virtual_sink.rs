//! Virtual output sink
//!
//! A sink whose clock only moves when [`VirtualSink::advance`] is called.
//! Advancing renders the mix of every sounding segment through the gain
//! ramp into the analysis tap, then reports segments that ended. It backs
//! the `--null-output` mode (advanced from wall-clock time) and makes the
//! scheduling behaviour deterministic under test.
//!
//! Clones share state, so a caller can keep a handle for driving the clock
//! after moving the sink into the engine.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use super::analysis::AnalysisTap;
use super::gain::{GainControl, GainRamp};
use super::sink::{CompletionSender, OutputSink};
use super::types::{ScheduledSegment, SegmentId};
use crate::error::{Error, Result};

/// What the sink was asked to play
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentRecord {
    pub id: SegmentId,
    pub start_time: f64,
    pub duration: f64,
    pub samples: Vec<f32>,
}

struct ActiveSegment {
    id: SegmentId,
    start_frame: u64,
    samples: Vec<f32>,
}

impl ActiveSegment {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }
}

struct VirtualState {
    open: bool,
    suspended: bool,
    frame: u64,
    active: Vec<ActiveSegment>,
    history: Vec<SegmentRecord>,
    cancelled: usize,
    ramp: GainRamp,
    fail_open: Option<String>,
    pending_error: Option<String>,
    capture: bool,
    rendered: Vec<f32>,
    open_count: u32,
    /// Most unfinished segments accepted at once, like a bounded device queue
    schedule_limit: Option<usize>,
}

#[derive(Clone)]
pub struct VirtualSink {
    state: Arc<Mutex<VirtualState>>,
    sample_rate: u32,
    gain: GainControl,
    tap: AnalysisTap,
    completions: CompletionSender,
}

impl VirtualSink {
    pub fn new(sample_rate: u32, tap_capacity: usize, completions: CompletionSender) -> Self {
        Self {
            state: Arc::new(Mutex::new(VirtualState {
                open: false,
                suspended: false,
                frame: 0,
                active: Vec::new(),
                history: Vec::new(),
                cancelled: 0,
                ramp: GainRamp::new(1.0),
                fail_open: None,
                pending_error: None,
                capture: false,
                rendered: Vec::new(),
                open_count: 0,
                schedule_limit: None,
            })),
            sample_rate,
            gain: GainControl::new(1.0),
            tap: AnalysisTap::new(tap_capacity),
            completions,
        }
    }

    /// Move the clock forward by `seconds`, rounded to whole frames
    pub fn advance(&self, seconds: f64) {
        let frames = (seconds.max(0.0) * self.sample_rate as f64).round() as u64;
        self.advance_frames(frames);
    }

    /// Render `frames` frames and report segments that finished
    ///
    /// A closed or suspended sink does not move its clock.
    pub fn advance_frames(&self, frames: u64) {
        let finished = {
            let mut state = self.state.lock();
            if !state.open || state.suspended || frames == 0 {
                return;
            }

            let start = state.frame;
            let mut block: Vec<f32> = (start..start + frames)
                .map(|f| {
                    state
                        .active
                        .iter()
                        .filter(|seg| f >= seg.start_frame && f < seg.end_frame())
                        .map(|seg| seg.samples[(f - seg.start_frame) as usize])
                        .sum()
                })
                .collect();
            state.ramp.apply(&mut block, &self.gain);
            for sample in block.iter_mut() {
                *sample = sample.clamp(-1.0, 1.0);
            }
            state.frame = start + frames;
            if state.capture {
                state.rendered.extend_from_slice(&block);
            }
            self.tap.write_blocking(&block);

            let now = state.frame;
            let mut finished: Vec<(u64, SegmentId)> = state
                .active
                .iter()
                .filter(|seg| seg.end_frame() <= now)
                .map(|seg| (seg.end_frame(), seg.id))
                .collect();
            state.active.retain(|seg| seg.end_frame() > now);
            finished.sort();
            finished
        };

        for (_, id) in finished {
            // Receiver gone means the engine shut down
            let _ = self.completions.send(id);
        }
    }

    pub fn clock_frames(&self) -> u64 {
        self.state.lock().frame
    }

    /// Every segment scheduled since creation, in scheduling order
    pub fn history(&self) -> Vec<SegmentRecord> {
        self.state.lock().history.clone()
    }

    /// Segments scheduled but not yet finished or cancelled
    pub fn active_count(&self) -> usize {
        self.state.lock().active.len()
    }

    /// Segments dropped by `cancel_all` or `close` before finishing
    pub fn cancelled_count(&self) -> usize {
        self.state.lock().cancelled
    }

    pub fn is_suspended(&self) -> bool {
        self.state.lock().suspended
    }

    pub fn open_count(&self) -> u32 {
        self.state.lock().open_count
    }

    /// Gain the renderer applied to the most recent frame
    pub fn applied_gain(&self) -> f32 {
        self.state.lock().ramp.current()
    }

    /// Make the next `open` fail with `message`
    pub fn fail_next_open(&self, message: impl Into<String>) {
        self.state.lock().fail_open = Some(message.into());
    }

    /// Simulate a device failure reported from the render side
    pub fn inject_error(&self, message: impl Into<String>) {
        self.state.lock().pending_error = Some(message.into());
    }

    /// Keep a copy of every rendered frame for inspection
    pub fn set_capture(&self, capture: bool) {
        self.state.lock().capture = capture;
    }

    pub fn take_rendered(&self) -> Vec<f32> {
        std::mem::take(&mut self.state.lock().rendered)
    }

    /// Bound the number of unfinished segments; `None` lifts the bound
    pub fn set_schedule_limit(&self, limit: Option<usize>) {
        self.state.lock().schedule_limit = limit;
    }

    fn drop_active(state: &mut VirtualState) {
        state.cancelled += state.active.len();
        state.active.clear();
    }
}

impl OutputSink for VirtualSink {
    fn open(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(message) = state.fail_open.take() {
            return Err(Error::DeviceInit(message));
        }
        if !state.open {
            state.open = true;
            state.open_count += 1;
            debug!("Virtual sink opened at {} Hz", self.sample_rate);
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.state.lock().open
    }

    fn close(&mut self) {
        let mut state = self.state.lock();
        Self::drop_active(&mut state);
        state.open = false;
        state.suspended = false;
    }

    fn current_time(&self) -> f64 {
        self.state.lock().frame as f64 / self.sample_rate as f64
    }

    fn device_sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn schedule_capacity(&self) -> usize {
        let state = self.state.lock();
        match state.schedule_limit {
            Some(limit) => limit.saturating_sub(state.active.len()),
            None => usize::MAX,
        }
    }

    fn schedule(&mut self, segment: ScheduledSegment) -> Result<()> {
        let mut state = self.state.lock();
        if !state.open {
            return Err(Error::AudioOutput("virtual sink is closed".to_string()));
        }
        if state
            .schedule_limit
            .is_some_and(|limit| state.active.len() >= limit)
        {
            return Err(Error::AudioOutput("virtual sink queue is full".to_string()));
        }

        let start_frame = (segment.start_time * self.sample_rate as f64).round().max(0.0) as u64;
        state.history.push(SegmentRecord {
            id: segment.id,
            start_time: segment.start_time,
            duration: segment.duration(),
            samples: segment.buffer.samples().to_vec(),
        });
        state.active.push(ActiveSegment {
            id: segment.id,
            start_frame,
            samples: segment.buffer.into_samples(),
        });
        Ok(())
    }

    fn cancel_all(&mut self) {
        Self::drop_active(&mut self.state.lock());
    }

    fn suspend(&mut self) -> Result<()> {
        self.state.lock().suspended = true;
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        self.state.lock().suspended = false;
        Ok(())
    }

    fn set_gain(&mut self, gain: f32, ramp: Duration) {
        self.gain.set_target(gain, ramp, self.sample_rate);
    }

    fn analysis_tap(&self) -> &AnalysisTap {
        &self.tap
    }

    fn take_error(&mut self) -> Option<String> {
        self.state.lock().pending_error.take()
    }
}
