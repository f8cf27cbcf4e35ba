//! Output sink abstraction
//!
//! An [`OutputSink`] owns a monotonic output clock and plays
//! [`ScheduledSegment`]s at the absolute times they were scheduled for.
//! When a segment's last sample has been rendered the sink sends its
//! [`SegmentId`] on the completion channel it was built with. Segments
//! removed by [`OutputSink::cancel_all`] never report completion.
//!
//! Two implementations ship with the crate: [`CpalSink`] for real devices
//! and [`VirtualSink`] with a manually advanced clock.
//!
//! [`CpalSink`]: super::output::CpalSink
//! [`VirtualSink`]: super::virtual_sink::VirtualSink

use std::time::Duration;

use tokio::sync::mpsc;

use super::analysis::AnalysisTap;
use super::types::{ScheduledSegment, SegmentId};
use crate::error::Result;

pub type CompletionSender = mpsc::UnboundedSender<SegmentId>;
pub type CompletionReceiver = mpsc::UnboundedReceiver<SegmentId>;

/// Channel carrying finished segment ids from a sink back to the engine
pub fn completion_channel() -> (CompletionSender, CompletionReceiver) {
    mpsc::unbounded_channel()
}

/// Clocked playback target
pub trait OutputSink: Send {
    /// Acquire the device and start the clock. Opening an open sink is a no-op.
    fn open(&mut self) -> Result<()>;

    fn is_open(&self) -> bool;

    /// Release the device, dropping anything scheduled
    fn close(&mut self);

    /// Current output clock time in seconds
    fn current_time(&self) -> f64;

    /// Minimum distance ahead of [`current_time`](Self::current_time) at which
    /// a newly scheduled segment still starts on time
    fn scheduling_latency(&self) -> f64 {
        0.0
    }

    /// Rate the device actually runs at
    fn device_sample_rate(&self) -> u32;

    /// How many more segments [`schedule`](Self::schedule) accepts right now.
    /// Zero means the caller should hold its audio and retry later.
    fn schedule_capacity(&self) -> usize {
        usize::MAX
    }

    /// Queue a segment to start at `segment.start_time`
    fn schedule(&mut self, segment: ScheduledSegment) -> Result<()>;

    /// Drop every scheduled and sounding segment without completion reports
    fn cancel_all(&mut self);

    /// Freeze the clock and output; scheduled segments are kept
    fn suspend(&mut self) -> Result<()>;

    /// Undo [`suspend`](Self::suspend); resuming a running sink is a no-op
    fn resume(&mut self) -> Result<()>;

    /// Ramp output gain to `gain` over `ramp`
    fn set_gain(&mut self, gain: f32, ramp: Duration);

    /// Ring of recently rendered output for level and spectrum readers
    fn analysis_tap(&self) -> &AnalysisTap;

    /// Runtime device failure reported since the last call, if any
    fn take_error(&mut self) -> Option<String>;
}
