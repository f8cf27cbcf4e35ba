//! Volume, device failure and output analysis through the engine

mod helpers;

use driftwave_common::{EngineEvent, PlaybackState};
use driftwave_player::audio::OutputSink;
use driftwave_player::{EngineConfig, Error};
use helpers::{constant_chunk, pcm16_value, sine_chunk, EngineHarness, TEST_RATE};

#[test]
fn test_volume_ramps_to_clamped_target() {
    let mut h = EngineHarness::new();
    h.sink.set_capture(true);
    h.engine.play().unwrap();
    h.engine.queue_chunk(&constant_chunk(0.5, 12_000)).unwrap();

    // Past the entry fade before changing volume
    h.advance(0.05);
    h.sink.take_rendered();

    assert_eq!(h.engine.set_volume(0.25).unwrap(), 0.25);
    h.advance(0.1);
    let rendered = h.sink.take_rendered();

    // 30 ms ramp at 24 kHz = 720 frames, strictly falling
    for pair in rendered[..720].windows(2) {
        assert!(pair[1] < pair[0]);
    }
    let level = pcm16_value(0.5) * 0.25;
    assert!(rendered[720..].iter().all(|&s| (s - level).abs() < 1e-6));
    assert_eq!(h.sink.applied_gain(), 0.25);
}

#[test]
fn test_volume_events_only_on_change() {
    let mut h = EngineHarness::new();

    assert_eq!(h.engine.set_volume(3.0).unwrap(), 1.0);
    assert_eq!(h.engine.set_volume(0.5).unwrap(), 0.5);
    assert_eq!(h.engine.set_volume(0.5).unwrap(), 0.5);
    assert_eq!(h.engine.set_volume(-1.0).unwrap(), 0.0);
    assert!(matches!(h.engine.set_volume(f32::INFINITY), Err(Error::InvalidInput(_))));

    let volumes: Vec<f32> = h
        .recorder
        .events()
        .iter()
        .filter_map(|e| match e {
            EngineEvent::VolumeChanged { volume, .. } => Some(*volume),
            _ => None,
        })
        .collect();
    // Harness starts at 1.0, so the first clamp is not a change
    assert_eq!(volumes, vec![0.5, 0.0]);
}

#[test]
fn test_volume_set_before_play_applies_on_open() {
    let mut h = EngineHarness::new();
    h.engine.set_volume(0.4).unwrap();
    h.engine.play().unwrap();
    h.engine.queue_chunk(&constant_chunk(0.5, 2400)).unwrap();
    h.advance(0.01);
    assert_eq!(h.sink.applied_gain(), 0.4);
}

#[test]
fn test_runtime_device_error_stops_and_reports() {
    let mut h = EngineHarness::new();
    h.engine.play().unwrap();
    for _ in 0..3 {
        h.engine.queue_chunk(&constant_chunk(0.5, 2400)).unwrap();
    }

    h.sink.inject_error("device unplugged");
    let err = h.engine.tick().unwrap_err();
    assert!(matches!(err, Error::DeviceRuntime(_)));

    assert_eq!(h.engine.state(), PlaybackState::Stopped);
    assert_eq!(h.recorder.device_errors(), vec!["device unplugged".to_string()]);
    assert_eq!(h.engine.in_flight_segments(), 0);
    assert_eq!(h.engine.queued_chunks(), 0);
    assert!(!h.sink.is_open());

    // No automatic restart; an explicit play reopens the device
    h.engine.play().unwrap();
    assert_eq!(h.engine.state(), PlaybackState::Playing);
    assert_eq!(h.sink.open_count(), 2);
}

#[test]
fn test_open_failure_leaves_engine_stopped() {
    let mut h = EngineHarness::new();
    h.sink.fail_next_open("no output device");

    let err = h.engine.play().unwrap_err();
    assert!(matches!(err, Error::DeviceInit(_)));
    assert_eq!(h.engine.state(), PlaybackState::Stopped);
    assert_eq!(
        h.recorder.states(),
        vec![PlaybackState::Connecting, PlaybackState::Stopped]
    );
}

#[test]
fn test_level_and_spectrum_follow_output() {
    let mut h = EngineHarness::new();
    assert_eq!(h.engine.current_rms_level(), 0.0);
    assert!(h.engine.time_domain_snapshot().is_empty());

    h.engine.play().unwrap();
    h.engine
        .queue_chunk(&sine_chunk(1000.0, TEST_RATE, 4800, 0.5))
        .unwrap();
    h.advance(0.2);

    let level = h.engine.current_rms_level();
    assert!((level - 0.5 / 2f32.sqrt()).abs() < 0.01, "rms {}", level);

    let bands = h.engine.frequency_snapshot();
    assert_eq!(bands.len(), 16);
    let peak_band = bands
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
        .unwrap();
    assert_eq!(peak_band, 4);

    let waveform = h.engine.time_domain_snapshot();
    assert_eq!(waveform.len(), EngineConfig::default().analysis_window);

    // Silence after the tone pulls the level back down
    h.advance(0.2);
    assert_eq!(h.engine.current_rms_level(), 0.0);
    assert!(h.engine.frequency_snapshot().iter().all(|&b| b == 0.0));
}
