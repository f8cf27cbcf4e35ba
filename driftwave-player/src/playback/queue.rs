//! FIFO of decoded chunks waiting to be scheduled
//!
//! Arrival order is playback order: buffers only enter at the back and
//! leave from the front. The queue tracks the total duration it holds so
//! buffer health can be read without walking it.

use std::collections::VecDeque;

use crate::audio::SampleBuffer;

#[derive(Debug, Default)]
pub struct ChunkQueue {
    buffers: VecDeque<SampleBuffer>,
    total_seconds: f64,
}

impl ChunkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, buffer: SampleBuffer) {
        self.total_seconds += buffer.duration_seconds();
        self.buffers.push_back(buffer);
    }

    pub fn dequeue(&mut self) -> Option<SampleBuffer> {
        let buffer = self.buffers.pop_front()?;
        if self.buffers.is_empty() {
            // Avoid accumulating float drift across many add/subtract cycles
            self.total_seconds = 0.0;
        } else {
            self.total_seconds = (self.total_seconds - buffer.duration_seconds()).max(0.0);
        }
        Some(buffer)
    }

    /// Drop every queued buffer, returning how many were discarded
    pub fn clear(&mut self) -> usize {
        let dropped = self.buffers.len();
        self.buffers.clear();
        self.total_seconds = 0.0;
        dropped
    }

    /// Sum of queued buffer durations in seconds
    pub fn total_duration(&self) -> f64 {
        self.total_seconds
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(value: f32, len: usize) -> SampleBuffer {
        SampleBuffer::new(vec![value; len], 1000)
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = ChunkQueue::new();
        for i in 0..5 {
            queue.enqueue(buffer(i as f32, 10));
        }

        let order: Vec<f32> = std::iter::from_fn(|| queue.dequeue())
            .map(|b| b.samples()[0])
            .collect();
        assert_eq!(order, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        assert!(queue.dequeue().is_none());
    }

    #[test]
    fn test_total_duration_tracks_contents() {
        let mut queue = ChunkQueue::new();
        assert_eq!(queue.total_duration(), 0.0);

        queue.enqueue(buffer(0.0, 100));
        queue.enqueue(buffer(0.0, 250));
        assert!((queue.total_duration() - 0.35).abs() < 1e-12);
        assert_eq!(queue.len(), 2);

        queue.dequeue();
        assert!((queue.total_duration() - 0.25).abs() < 1e-12);

        queue.dequeue();
        assert_eq!(queue.total_duration(), 0.0);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_clear() {
        let mut queue = ChunkQueue::new();
        queue.enqueue(buffer(0.0, 10));
        queue.enqueue(buffer(0.0, 10));

        assert_eq!(queue.clear(), 2);
        assert!(queue.is_empty());
        assert_eq!(queue.total_duration(), 0.0);
        assert_eq!(queue.clear(), 0);
    }
}
