//! Buffer health reporting
//!
//! Health counts queued audio plus the full length of in-flight segments,
//! so it moves only on enqueue, completion and reset.

mod helpers;

use helpers::{constant_chunk, EngineHarness};

/// 500 ms at the test rate
const HALF_SECOND: usize = 12_000;

fn assert_close(actual: &[f32], expected: &[f32]) {
    assert_eq!(actual.len(), expected.len(), "{:?} vs {:?}", actual, expected);
    for (a, e) in actual.iter().zip(expected) {
        assert!((a - e).abs() < 1e-6, "{:?} vs {:?}", actual, expected);
    }
}

#[test]
fn test_health_rises_on_enqueue() {
    let mut h = EngineHarness::new();

    for _ in 0..4 {
        h.engine.queue_chunk(&constant_chunk(0.25, HALF_SECOND)).unwrap();
    }

    // Default target is 2 s
    assert_close(&h.recorder.health_values(), &[0.25, 0.5, 0.75, 1.0]);
    assert_eq!(h.engine.buffered_seconds(), 2.0);
}

#[test]
fn test_health_holds_while_segments_play() {
    let mut h = EngineHarness::new();
    for _ in 0..4 {
        h.engine.queue_chunk(&constant_chunk(0.25, HALF_SECOND)).unwrap();
    }

    h.engine.play().unwrap();
    assert_eq!(h.engine.in_flight_segments(), 2);
    assert_eq!(h.engine.queued_chunks(), 2);
    assert_eq!(h.engine.buffer_health(), 1.0);

    h.recorder.clear();
    h.advance(0.25);
    assert!(h.recorder.health_values().is_empty());
    assert_eq!(h.engine.buffer_health(), 1.0);

    // First segment finishes; the next queued one moves into flight
    h.advance(0.25);
    assert_close(&h.recorder.health_values(), &[0.75]);
    assert_eq!(h.engine.in_flight_segments(), 2);
    assert_eq!(h.engine.queued_chunks(), 1);
    assert!((h.engine.buffer_health() - 0.75).abs() < 1e-6);
}

#[test]
fn test_health_drains_monotonically_without_input() {
    let mut h = EngineHarness::new();
    for _ in 0..4 {
        h.engine.queue_chunk(&constant_chunk(0.25, HALF_SECOND)).unwrap();
    }
    h.engine.play().unwrap();
    h.recorder.clear();

    for _ in 0..8 {
        h.advance(0.25);
    }

    let values = h.recorder.health_values();
    assert_close(&values, &[0.75, 0.5, 0.25, 0.0]);
    for pair in values.windows(2) {
        assert!(pair[1] <= pair[0]);
    }
}

#[test]
fn test_health_saturates_at_one() {
    let mut h = EngineHarness::new();
    for _ in 0..6 {
        h.engine.queue_chunk(&constant_chunk(0.25, HALF_SECOND)).unwrap();
    }

    assert_eq!(h.engine.buffered_seconds(), 3.0);
    assert_eq!(h.engine.buffer_health(), 1.0);
    assert!(h.recorder.health_values().iter().all(|&v| v <= 1.0));
}

#[test]
fn test_stop_reports_empty_buffer() {
    let mut h = EngineHarness::new();
    h.engine.play().unwrap();
    for _ in 0..3 {
        h.engine.queue_chunk(&constant_chunk(0.25, HALF_SECOND)).unwrap();
    }

    h.engine.stop();
    assert_eq!(h.engine.buffer_health(), 0.0);
    assert_eq!(h.recorder.health_values().last().copied(), Some(0.0));

    let snapshot = h.engine.snapshot();
    assert_eq!(snapshot.buffered_seconds, 0.0);
    assert_eq!(snapshot.queued_chunks, 0);
    assert_eq!(snapshot.in_flight_segments, 0);
}
