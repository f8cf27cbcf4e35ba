//! Audio subsystem: chunk decoding, fades, gain, analysis and output sinks

pub mod analysis;
pub mod decoder;
pub mod envelope;
pub mod gain;
pub mod output;
pub mod sink;
pub mod types;
pub mod virtual_sink;

pub use analysis::{AnalysisTap, LevelAnalyzer};
pub use decoder::{decode, DecodeError};
pub use envelope::{apply_entry_fade, apply_exit_fade, FadeSpec};
pub use output::CpalSink;
pub use sink::{completion_channel, CompletionReceiver, CompletionSender, OutputSink};
pub use types::{EncodedChunk, SampleBuffer, ScheduledSegment, SegmentId};
pub use virtual_sink::{SegmentRecord, VirtualSink};
