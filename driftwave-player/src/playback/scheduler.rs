//! Gapless scheduler
//!
//! Keeps a single absolute timeline on the sink's clock. Every dequeued
//! buffer starts exactly where the previous one ended
//! (`next_start_time += duration`), so consecutive chunks butt together
//! with no gap and no overlap regardless of when they arrived.
//!
//! Draining stops once the timeline is `lookahead_ceiling` seconds ahead
//! of the clock, or when the sink has no room for another segment; later
//! completions, new chunks and the safety tick resume it. A full sink is
//! backpressure: the remaining chunks simply stay queued.
//!
//! If the timeline has fallen behind the clock when a buffer is about to be
//! scheduled, the producer could not keep up. The timeline jumps forward to
//! the clock, the drain reports one [`Underrun`], and the restarted audio
//! gets an entry fade. Falling behind before anything has been scheduled on
//! the current timeline (right after play or stop) is a normal start, not
//! an underrun.

use std::collections::BTreeMap;

use tracing::{debug, trace, warn};

use super::queue::ChunkQueue;
use crate::audio::envelope::{apply_entry_fade, FadeSpec};
use crate::audio::{OutputSink, ScheduledSegment, SegmentId};
use crate::error::Result;

/// Timeline comparisons ignore float noise well below one sample period
const TIMELINE_EPSILON: f64 = 1e-6;

/// Bookkeeping for a segment handed to the sink but not yet finished
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InFlightSegment {
    pub start_time: f64,
    pub duration: f64,
}

/// The timeline had fallen behind the output clock
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Underrun {
    pub lag_seconds: f64,
    pub clock_time: f64,
}

/// Outcome of one drain pass
#[derive(Debug, Default)]
pub struct DrainReport {
    pub scheduled: Vec<(SegmentId, InFlightSegment)>,
    /// At most one per pass: after a reset the timeline cannot fall behind again
    pub underrun: Option<Underrun>,
    /// The pass ended because the sink could not take more segments
    pub backpressured: bool,
}

impl DrainReport {
    pub fn scheduled_seconds(&self) -> f64 {
        self.scheduled.iter().map(|(_, s)| s.duration).sum()
    }
}

#[derive(Debug)]
pub struct GaplessScheduler {
    next_start_time: f64,
    in_flight: BTreeMap<SegmentId, InFlightSegment>,
    next_id: u64,
    lookahead_ceiling: f64,
    entry_fade: FadeSpec,
    /// Something was scheduled since the last reset
    timeline_started: bool,
    fade_next: bool,
    draining: bool,
}

impl GaplessScheduler {
    pub fn new(lookahead_ceiling: f64, entry_fade: FadeSpec) -> Self {
        Self {
            next_start_time: 0.0,
            in_flight: BTreeMap::new(),
            next_id: 0,
            lookahead_ceiling,
            entry_fade,
            timeline_started: false,
            fade_next: true,
            draining: false,
        }
    }

    /// Start a fresh timeline at `now`, forgetting every in-flight segment
    ///
    /// Returns how many in-flight segments were forgotten.
    pub fn reset(&mut self, now: f64) -> usize {
        let forgotten = self.in_flight.len();
        self.in_flight.clear();
        self.next_start_time = now;
        self.timeline_started = false;
        self.fade_next = true;
        forgotten
    }

    /// Move queued buffers onto the sink's timeline up to the look-ahead ceiling
    ///
    /// A pass that starts while another is running does nothing; the running
    /// pass picks up whatever was queued.
    pub fn drain<S: OutputSink + ?Sized>(
        &mut self,
        queue: &mut ChunkQueue,
        sink: &mut S,
    ) -> Result<DrainReport> {
        if self.draining {
            trace!("Drain already in progress");
            return Ok(DrainReport::default());
        }
        self.draining = true;
        let result = self.drain_inner(queue, sink);
        self.draining = false;
        result
    }

    fn drain_inner<S: OutputSink + ?Sized>(
        &mut self,
        queue: &mut ChunkQueue,
        sink: &mut S,
    ) -> Result<DrainReport> {
        let now = sink.current_time() + sink.scheduling_latency();
        let mut report = DrainReport::default();

        while self.next_start_time - now < self.lookahead_ceiling - TIMELINE_EPSILON {
            if queue.is_empty() {
                break;
            }
            if sink.schedule_capacity() == 0 {
                report.backpressured = true;
                break;
            }
            let Some(mut buffer) = queue.dequeue() else {
                break;
            };

            if now - self.next_start_time > TIMELINE_EPSILON {
                if self.timeline_started {
                    let underrun = Underrun {
                        lag_seconds: now - self.next_start_time,
                        clock_time: now,
                    };
                    warn!(
                        "Underrun: timeline {:.3}s behind output clock, restarting at {:.3}s",
                        underrun.lag_seconds, now
                    );
                    report.underrun = Some(underrun);
                    self.fade_next = true;
                }
                self.next_start_time = now;
            }

            if self.fade_next {
                buffer = apply_entry_fade(buffer, self.entry_fade);
                self.fade_next = false;
            }

            let id = SegmentId(self.next_id);
            self.next_id += 1;
            let segment = InFlightSegment {
                start_time: self.next_start_time,
                duration: buffer.duration_seconds(),
            };

            sink.schedule(ScheduledSegment::new(id, segment.start_time, buffer))?;

            self.in_flight.insert(id, segment);
            self.timeline_started = true;
            self.next_start_time += segment.duration;
            report.scheduled.push((id, segment));
        }

        if report.backpressured {
            trace!(
                "Sink full, {} chunk(s) wait for the next pass",
                queue.len()
            );
        }
        if !report.scheduled.is_empty() {
            debug!(
                "Scheduled {} segment(s), timeline now at {:.3}s (clock {:.3}s)",
                report.scheduled.len(),
                self.next_start_time,
                now
            );
        }
        Ok(report)
    }

    /// Retire a finished segment; `None` if it was not in flight (stale or cancelled)
    pub fn complete(&mut self, id: SegmentId) -> Option<InFlightSegment> {
        self.in_flight.remove(&id)
    }

    pub fn next_start_time(&self) -> f64 {
        self.next_start_time
    }

    pub fn lookahead_ceiling(&self) -> f64 {
        self.lookahead_ceiling
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Full duration of every in-flight segment, including parts already played
    pub fn in_flight_duration(&self) -> f64 {
        self.in_flight.values().map(|s| s.duration).sum()
    }
}
