//! Chunk intake and timeline draining
//!
//! **Responsibilities:**
//! - Decode incoming chunks and append them to the FIFO
//! - Drain the FIFO onto the sink's timeline while playing
//! - Retire finished segments and keep the drain going
//!
//! Chunks are accepted in every state. While not playing they wait in the
//! queue, so a caller can pre-buffer before `play`.

use driftwave_common::events::EngineEvent;
use driftwave_common::PlaybackState;
use tracing::{debug, trace, warn};

use super::core::StreamEngine;
use crate::audio::{decode, EncodedChunk, OutputSink, SampleBuffer, SegmentId};
use crate::error::{Error, Result};
use crate::playback::scheduler::DrainReport;

impl<S: OutputSink> StreamEngine<S> {
    /// Decode and queue one chunk
    ///
    /// A chunk that fails to decode is counted, logged and dropped; the
    /// error is returned for the caller's information only and the stream
    /// carries on.
    pub fn queue_chunk(&mut self, chunk: &EncodedChunk) -> Result<()> {
        self.stats.chunks_received += 1;

        let buffer = match decode(chunk, self.config.sample_rate) {
            Ok(buffer) => buffer,
            Err(e) => {
                self.stats.chunks_dropped += 1;
                warn!("Dropping undecodable chunk ({} bytes): {}", chunk.len(), e);
                return Err(e.into());
            }
        };

        self.queue_buffer(buffer)
    }

    /// Queue already-decoded audio at the stream's sample rate
    pub fn queue_buffer(&mut self, buffer: SampleBuffer) -> Result<()> {
        if buffer.sample_rate() != self.config.sample_rate {
            return Err(Error::InvalidInput(format!(
                "buffer is {} Hz, stream is {} Hz",
                buffer.sample_rate(),
                self.config.sample_rate
            )));
        }
        if buffer.is_empty() {
            trace!("Ignoring empty buffer");
            return Ok(());
        }

        trace!("Queued {:.3}s of audio", buffer.duration_seconds());
        self.queue.enqueue(buffer);
        self.emit_buffer_update();
        self.drain()
    }

    /// Handle a completion report from the sink
    ///
    /// Reports for segments that are no longer in flight (cancelled by a
    /// stop, or from a previous session) are ignored.
    pub fn on_segment_finished(&mut self, id: SegmentId) -> Result<()> {
        if self.scheduler.complete(id).is_none() {
            trace!("Ignoring completion for {} (not in flight)", id);
            return Ok(());
        }

        self.stats.segments_completed += 1;
        self.emit_buffer_update();
        self.drain()
    }

    /// Schedule queued audio up to the look-ahead ceiling (Playing only)
    pub(super) fn drain(&mut self) -> Result<()> {
        if self.state != PlaybackState::Playing {
            return Ok(());
        }

        match self.scheduler.drain(&mut self.queue, &mut self.sink) {
            Ok(report) => {
                self.record_drain(report);
                Ok(())
            }
            Err(e) => Err(self.fail_device(format!("scheduling failed: {}", e))),
        }
    }

    fn record_drain(&mut self, report: DrainReport) {
        self.stats.segments_scheduled += report.scheduled.len() as u64;
        self.stats.seconds_scheduled += report.scheduled_seconds();

        if let Some(underrun) = report.underrun {
            self.stats.underruns += 1;
            let timestamp = chrono::Utc::now();
            self.stats.last_underrun_at = Some(timestamp);
            debug!("Underrun #{} recorded", self.stats.underruns);
            self.emit(EngineEvent::Underrun {
                count: self.stats.underruns,
                lag_seconds: underrun.lag_seconds,
                clock_time: underrun.clock_time,
                timestamp,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::audio::{completion_channel, EncodedChunk, OutputSink, SampleBuffer, VirtualSink};
    use crate::config::EngineConfig;
    use crate::error::Error;
    use crate::playback::StreamEngine;

    fn engine() -> (StreamEngine<VirtualSink>, VirtualSink) {
        let (tx, _rx) = completion_channel();
        let sink = VirtualSink::new(24_000, 2048, tx);
        (StreamEngine::new(sink.clone(), EngineConfig::default()), sink)
    }

    #[test]
    fn test_bad_chunk_is_counted_and_dropped() {
        let (mut engine, _sink) = engine();
        engine.play().unwrap();

        let err = engine.queue_chunk(&EncodedChunk::new("AAEC")).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
        assert_eq!(engine.stats().chunks_received, 1);
        assert_eq!(engine.stats().chunks_dropped, 1);
        assert_eq!(engine.queued_chunks(), 0);
        assert_eq!(engine.in_flight_segments(), 0);
    }

    #[test]
    fn test_chunks_wait_in_queue_until_play() {
        let (mut engine, sink) = engine();
        engine.queue_buffer(SampleBuffer::silence(2400, 24_000)).unwrap();
        engine.queue_buffer(SampleBuffer::silence(2400, 24_000)).unwrap();
        assert_eq!(engine.queued_chunks(), 2);
        assert!(sink.history().is_empty());

        engine.play().unwrap();
        assert_eq!(engine.queued_chunks(), 0);
        assert_eq!(engine.in_flight_segments(), 2);
        assert_eq!(sink.history().len(), 2);
    }

    #[test]
    fn test_wrong_rate_rejected() {
        let (mut engine, _sink) = engine();
        let err = engine.queue_buffer(SampleBuffer::silence(100, 48_000)).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_stale_completion_ignored() {
        let (mut engine, mut sink) = engine();
        engine.play().unwrap();
        engine.queue_buffer(SampleBuffer::silence(2400, 24_000)).unwrap();
        let id = sink.history()[0].id;

        engine.stop();
        sink.cancel_all();
        engine.on_segment_finished(id).unwrap();
        assert_eq!(engine.stats().segments_completed, 0);
    }
}
