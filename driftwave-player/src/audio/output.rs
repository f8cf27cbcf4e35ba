//! Audio output using cpal
//!
//! [`CpalSink`] plays scheduled segments on a real output device.
//!
//! The cpal stream lives on a dedicated device thread (streams are not
//! `Send` on every platform) which only handles play/pause/close requests.
//! Segments travel to the audio callback through a lock-free SPSC ring whose
//! free space the sink reports as its scheduling capacity. Cancellation
//! bypasses the ring: it bumps a generation counter the callback checks
//! before taking new segments, so it cannot be lost to a full ring.
//! The callback owns a [`Renderer`] that mixes every segment sounding at the
//! current frame, advances the frame counter that serves as the output
//! clock, and reports finished segments.
//!
//! Chunks at a rate the device does not support are resampled per segment
//! by linear interpolation against the device frame grid.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use driftwave_common::FadeCurve;
use parking_lot::Mutex;
use ringbuf::{traits::*, HeapCons, HeapProd, HeapRb};
use tracing::{debug, error, info, warn};

use super::analysis::AnalysisTap;
use super::envelope::{ramp_out, FadeSpec};
use super::gain::{GainControl, GainRamp};
use super::sink::{CompletionSender, OutputSink};
use super::types::{ScheduledSegment, SegmentId};
use crate::config::EngineConfig;
use crate::error::{Error, Result};

/// Capacity of the engine → callback segment ring
const SEGMENT_CAPACITY: usize = 512;

/// Extra headroom added to the measured callback period when scheduling
const SCHEDULING_MARGIN_SECONDS: f64 = 0.005;

/// Segment prepared for the device frame grid
struct RenderSegment {
    id: SegmentId,
    /// Cancel generation the segment was scheduled in
    generation: u64,
    start_frame: u64,
    samples: Vec<f32>,
    /// Source samples per device frame
    step: f64,
    frames: u64,
}

impl RenderSegment {
    fn new(id: SegmentId, generation: u64, start_frame: u64, samples: Vec<f32>, step: f64) -> Self {
        let frames = (samples.len() as f64 / step).ceil() as u64;
        Self {
            id,
            generation,
            start_frame,
            samples,
            step,
            frames,
        }
    }

    fn end_frame(&self) -> u64 {
        self.start_frame + self.frames
    }

    fn sample_at(&self, frame: u64) -> f32 {
        if frame < self.start_frame || frame >= self.end_frame() {
            return 0.0;
        }
        let pos = (frame - self.start_frame) as f64 * self.step;
        let index = pos as usize;
        let Some(&a) = self.samples.get(index) else {
            return 0.0;
        };
        let b = self.samples.get(index + 1).copied().unwrap_or(a);
        a + (b - a) * (pos - index as f64) as f32
    }
}

/// Latest cancel request, packed as `generation << 1 | quiet`
#[derive(Default)]
struct CancelSignal(AtomicU64);

impl CancelSignal {
    fn request(&self, generation: u64, quiet: bool) {
        self.0.store(generation << 1 | quiet as u64, Ordering::Release);
    }

    fn load(&self) -> (u64, bool) {
        let packed = self.0.load(Ordering::Acquire);
        (packed >> 1, packed & 1 == 1)
    }
}

/// State shared between the sink handle and the callback
#[derive(Clone)]
struct RenderShared {
    gain: GainControl,
    tap: AnalysisTap,
    cancel: Arc<CancelSignal>,
    frames_rendered: Arc<AtomicU64>,
    callback_frames: Arc<AtomicU32>,
    completions: CompletionSender,
}

/// Mixer owned by the audio callback
struct Renderer {
    segments: HeapCons<RenderSegment>,
    shared: RenderShared,
    generation: u64,
    active: Vec<RenderSegment>,
    release: Option<(Vec<f32>, usize)>,
    ramp: GainRamp,
    exit_fade: FadeSpec,
    frame: u64,
    scratch: Vec<f32>,
}

impl Renderer {
    fn new(segments: HeapCons<RenderSegment>, shared: RenderShared, exit_fade: FadeSpec) -> Self {
        let ramp = GainRamp::new(shared.gain.target_gain());
        let (generation, _) = shared.cancel.load();
        Self {
            segments,
            shared,
            generation,
            active: Vec::with_capacity(64),
            release: None,
            ramp,
            exit_fade,
            frame: 0,
            scratch: Vec::with_capacity(4096),
        }
    }

    fn sync_cancel(&mut self) {
        let (generation, quiet) = self.shared.cancel.load();
        if generation != self.generation {
            self.generation = generation;
            self.cut_all(!quiet);
        }
    }

    fn take_segments(&mut self) {
        self.sync_cancel();
        while let Some(segment) = self.segments.try_pop() {
            // Pushed after a cancel this callback has not seen yet
            if segment.generation > self.generation {
                self.sync_cancel();
            }
            if segment.generation == self.generation {
                self.active.push(segment);
            }
        }
    }

    /// Drop everything. With `keep_tail`, what was sounding fades out over
    /// the exit fade instead of stopping dead.
    fn cut_all(&mut self, keep_tail: bool) {
        self.release = None;
        let len = self.exit_fade.samples;
        if keep_tail && len > 0 && self.active.iter().any(|s| s.start_frame <= self.frame) {
            let mut tail: Vec<f32> = (self.frame..self.frame + len as u64)
                .map(|f| self.active.iter().map(|s| s.sample_at(f)).sum())
                .collect();
            ramp_out(&mut tail, self.exit_fade);
            self.release = Some((tail, 0));
        }
        self.active.clear();
    }

    /// Render `frames` mono frames into `self.scratch`
    fn render(&mut self, frames: usize) {
        self.take_segments();
        self.scratch.clear();

        for _ in 0..frames {
            let mut mix: f32 = self.active.iter().map(|s| s.sample_at(self.frame)).sum();
            let mut released = false;
            if let Some((tail, pos)) = self.release.as_mut() {
                mix += tail.get(*pos).copied().unwrap_or(0.0);
                *pos += 1;
                released = *pos >= tail.len();
            }
            if released {
                self.release = None;
            }
            self.scratch.push(mix);
            self.frame += 1;
        }
        self.ramp.apply(&mut self.scratch, &self.shared.gain);
        for sample in self.scratch.iter_mut() {
            *sample = sample.clamp(-1.0, 1.0);
        }

        let now = self.frame;
        let completions = &self.shared.completions;
        self.active.retain(|segment| {
            if segment.end_frame() <= now {
                let _ = completions.send(segment.id);
                false
            } else {
                true
            }
        });

        self.shared.frames_rendered.store(now, Ordering::Release);
        self.shared.callback_frames.store(frames as u32, Ordering::Relaxed);
        self.shared.tap.write(&self.scratch);
    }

    /// Fill an interleaved device buffer, duplicating mono to every channel
    fn fill<T>(&mut self, data: &mut [T], channels: usize)
    where
        T: SizedSample + FromSample<f32>,
    {
        let frames = data.len() / channels;
        self.render(frames);
        for (frame, &sample) in data.chunks_mut(channels).zip(self.scratch.iter()) {
            frame.fill(T::from_sample(sample));
        }
    }
}

enum StreamControl {
    Play(std_mpsc::Sender<Result<()>>),
    Pause(std_mpsc::Sender<Result<()>>),
    Close,
}

struct DeviceSetup {
    device_name: Option<String>,
    preferred_rate: u32,
    exit_fade: Duration,
    fade_curve: FadeCurve,
    shared: RenderShared,
    error_sink: Arc<Mutex<Option<String>>>,
}

struct OpenStream {
    control: std_mpsc::Sender<StreamControl>,
    thread: JoinHandle<()>,
    segments: HeapProd<RenderSegment>,
    device_rate: u32,
}

/// Output sink backed by a cpal device
pub struct CpalSink {
    device_name: Option<String>,
    source_rate: u32,
    exit_fade: Duration,
    fade_curve: FadeCurve,
    shared: RenderShared,
    error_sink: Arc<Mutex<Option<String>>>,
    stream: Option<OpenStream>,
    /// Clock value carried over from previously opened streams
    clock_offset: f64,
    /// Current cancel generation; only this handle advances it
    generation: u64,
    suspended: bool,
}

impl CpalSink {
    pub fn new(config: &EngineConfig, completions: CompletionSender) -> Self {
        Self {
            device_name: config.device.clone(),
            source_rate: config.sample_rate,
            exit_fade: Duration::from_millis(config.exit_fade_ms as u64),
            fade_curve: config.fade_curve,
            shared: RenderShared {
                gain: GainControl::new(config.initial_volume),
                tap: AnalysisTap::new(config.analysis_window),
                cancel: Arc::new(CancelSignal::default()),
                frames_rendered: Arc::new(AtomicU64::new(0)),
                callback_frames: Arc::new(AtomicU32::new(0)),
                completions,
            },
            error_sink: Arc::new(Mutex::new(None)),
            stream: None,
            clock_offset: 0.0,
            generation: 0,
            suspended: false,
        }
    }

    /// List available audio output devices
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();

        let devices: Vec<String> = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?
            .filter_map(|device| device.name().ok())
            .collect();

        debug!("Found {} output devices", devices.len());
        Ok(devices)
    }

    fn device_rate(&self) -> u32 {
        self.stream
            .as_ref()
            .map(|s| s.device_rate)
            .unwrap_or(self.source_rate)
    }

    fn control(&self, make: fn(std_mpsc::Sender<Result<()>>) -> StreamControl) -> Result<()> {
        let Some(stream) = self.stream.as_ref() else {
            return Ok(());
        };
        let (reply_tx, reply_rx) = std_mpsc::channel();
        stream
            .control
            .send(make(reply_tx))
            .map_err(|_| Error::DeviceRuntime("output thread has exited".to_string()))?;
        reply_rx
            .recv()
            .map_err(|_| Error::DeviceRuntime("output thread has exited".to_string()))?
    }
}

impl OutputSink for CpalSink {
    fn open(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let (producer, consumer) = HeapRb::<RenderSegment>::new(SEGMENT_CAPACITY).split();
        let (control_tx, control_rx) = std_mpsc::channel();
        let (ready_tx, ready_rx) = std_mpsc::sync_channel(1);
        self.shared.frames_rendered.store(0, Ordering::Release);

        let setup = DeviceSetup {
            device_name: self.device_name.clone(),
            preferred_rate: self.source_rate,
            exit_fade: self.exit_fade,
            fade_curve: self.fade_curve,
            shared: self.shared.clone(),
            error_sink: Arc::clone(&self.error_sink),
        };

        let thread = std::thread::Builder::new()
            .name("driftwave-output".to_string())
            .spawn(move || run_device_thread(setup, consumer, control_rx, ready_tx))
            .map_err(|e| Error::DeviceInit(format!("Failed to spawn output thread: {}", e)))?;

        match ready_rx.recv() {
            Ok(Ok(device_rate)) => {
                info!(
                    "Audio output open: {} Hz stream on {} Hz device",
                    self.source_rate, device_rate
                );
                self.stream = Some(OpenStream {
                    control: control_tx,
                    thread,
                    segments: producer,
                    device_rate,
                });
                self.suspended = false;
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(Error::DeviceInit(
                    "Output thread exited during setup".to_string(),
                ))
            }
        }
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn close(&mut self) {
        let now = self.current_time();
        if let Some(stream) = self.stream.take() {
            let _ = stream.control.send(StreamControl::Close);
            if stream.thread.join().is_err() {
                warn!("Output thread panicked during shutdown");
            }
            self.clock_offset = now;
            self.suspended = false;
            self.shared.frames_rendered.store(0, Ordering::Release);
            info!("Audio output closed");
        }
    }

    fn current_time(&self) -> f64 {
        let frames = self.shared.frames_rendered.load(Ordering::Acquire);
        self.clock_offset + frames as f64 / self.device_rate() as f64
    }

    fn scheduling_latency(&self) -> f64 {
        let frames = self.shared.callback_frames.load(Ordering::Relaxed);
        frames as f64 / self.device_rate() as f64 + SCHEDULING_MARGIN_SECONDS
    }

    fn device_sample_rate(&self) -> u32 {
        self.device_rate()
    }

    fn schedule_capacity(&self) -> usize {
        self.stream
            .as_ref()
            .map_or(0, |stream| stream.segments.vacant_len())
    }

    fn schedule(&mut self, segment: ScheduledSegment) -> Result<()> {
        let offset = self.clock_offset;
        let generation = self.generation;
        let Some(stream) = self.stream.as_mut() else {
            return Err(Error::AudioOutput("Audio output is not open".to_string()));
        };

        let device_rate = stream.device_rate as f64;
        let step = segment.buffer.sample_rate() as f64 / device_rate;
        let start_frame = ((segment.start_time - offset) * device_rate).round().max(0.0) as u64;
        let render = RenderSegment::new(
            segment.id,
            generation,
            start_frame,
            segment.buffer.into_samples(),
            step,
        );

        // Callers check schedule_capacity first
        stream
            .segments
            .try_push(render)
            .map_err(|_| Error::AudioOutput("Output segment queue is full".to_string()))
    }

    fn cancel_all(&mut self) {
        if self.stream.is_none() {
            return;
        }
        self.generation += 1;
        // A paused stream has nothing audible to fade out, and a tail built
        // on resume would leak the old session into the new one
        self.shared.cancel.request(self.generation, self.suspended);
        debug!(
            "Cancelled scheduled audio (generation {}, quiet={})",
            self.generation, self.suspended
        );
    }

    fn suspend(&mut self) -> Result<()> {
        self.control(StreamControl::Pause)?;
        self.suspended = self.stream.is_some();
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        self.control(StreamControl::Play)?;
        self.suspended = false;
        Ok(())
    }

    fn set_gain(&mut self, gain: f32, ramp: Duration) {
        self.shared.gain.set_target(gain, ramp, self.device_rate());
    }

    fn analysis_tap(&self) -> &AnalysisTap {
        &self.shared.tap
    }

    fn take_error(&mut self) -> Option<String> {
        self.error_sink.lock().take()
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        self.close();
    }
}

fn run_device_thread(
    setup: DeviceSetup,
    segments: HeapCons<RenderSegment>,
    control: std_mpsc::Receiver<StreamControl>,
    ready: std_mpsc::SyncSender<Result<u32>>,
) {
    let (stream, device_rate) = match open_stream(setup, segments) {
        Ok(opened) => opened,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    if ready.send(Ok(device_rate)).is_err() {
        return;
    }

    // Sender dropped means the sink was dropped
    while let Ok(request) = control.recv() {
        match request {
            StreamControl::Play(reply) => {
                let result = stream
                    .play()
                    .map_err(|e| Error::DeviceRuntime(format!("Failed to resume stream: {}", e)));
                let _ = reply.send(result);
            }
            StreamControl::Pause(reply) => {
                let result = stream
                    .pause()
                    .map_err(|e| Error::DeviceRuntime(format!("Failed to pause stream: {}", e)));
                let _ = reply.send(result);
            }
            StreamControl::Close => break,
        }
    }

    if let Err(e) = stream.pause() {
        debug!("Pause on close failed: {}", e);
    }
}

fn open_stream(setup: DeviceSetup, segments: HeapCons<RenderSegment>) -> Result<(Stream, u32)> {
    let host = cpal::default_host();
    let device = select_device(&host, setup.device_name.as_deref())?;
    let (config, sample_format) = best_config(&device, setup.preferred_rate)?;
    let device_rate = config.sample_rate.0;

    debug!(
        "Audio config: sample_rate={}, channels={}, format={:?}",
        device_rate, config.channels, sample_format
    );

    let fade_frames = (setup.exit_fade.as_secs_f64() * device_rate as f64).round() as usize;
    let renderer = Renderer::new(
        segments,
        setup.shared,
        FadeSpec::new(fade_frames, setup.fade_curve),
    );

    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, renderer, setup.error_sink)?,
        SampleFormat::I16 => build_stream::<i16>(&device, &config, renderer, setup.error_sink)?,
        SampleFormat::U16 => build_stream::<u16>(&device, &config, renderer, setup.error_sink)?,
        other => {
            return Err(Error::DeviceInit(format!(
                "Unsupported sample format: {:?}",
                other
            )));
        }
    };

    stream
        .play()
        .map_err(|e| Error::DeviceInit(format!("Failed to start stream: {}", e)))?;

    Ok((stream, device_rate))
}

/// Find the requested device, falling back to the default output
fn select_device(host: &cpal::Host, name: Option<&str>) -> Result<Device> {
    if let Some(name) = name {
        let mut devices = host
            .output_devices()
            .map_err(|e| Error::DeviceInit(format!("Failed to enumerate devices: {}", e)))?;

        if let Some(device) = devices.find(|d| d.name().ok().as_deref() == Some(name)) {
            info!("Using requested audio device: {}", name);
            return Ok(device);
        }
        warn!("Requested device '{}' not found, falling back to default device", name);
    }

    let device = host
        .default_output_device()
        .ok_or_else(|| Error::DeviceInit("No default output device found".to_string()))?;
    info!(
        "Using default audio device: {}",
        device.name().unwrap_or_else(|_| "Unknown".to_string())
    );
    Ok(device)
}

/// Prefer an f32 config running at the stream's own rate, else the device default
fn best_config(device: &Device, preferred_rate: u32) -> Result<(StreamConfig, SampleFormat)> {
    let supported: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| Error::DeviceInit(format!("Failed to get device configs: {}", e)))?
        .filter(|c| {
            c.min_sample_rate().0 <= preferred_rate && c.max_sample_rate().0 >= preferred_rate
        })
        .collect();

    let chosen = supported
        .iter()
        .find(|c| c.sample_format() == SampleFormat::F32)
        .or_else(|| supported.first());

    if let Some(range) = chosen {
        let sample_format = range.sample_format();
        let config = range
            .clone()
            .with_sample_rate(cpal::SampleRate(preferred_rate))
            .config();
        return Ok((config, sample_format));
    }

    let default = device
        .default_output_config()
        .map_err(|e| Error::DeviceInit(format!("Failed to get default config: {}", e)))?;
    debug!(
        "Device cannot run at {} Hz, resampling to {} Hz",
        preferred_rate,
        default.sample_rate().0
    );
    Ok((default.config(), default.sample_format()))
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    mut renderer: Renderer,
    error_sink: Arc<Mutex<Option<String>>>,
) -> Result<Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels.max(1) as usize;

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                renderer.fill(data, channels);
            },
            move |err| {
                error!("Audio stream error: {}", err);
                *error_sink.lock() = Some(err.to_string());
            },
            None,
        )
        .map_err(|e| Error::DeviceInit(format!("Failed to build stream: {}", e)))
}
