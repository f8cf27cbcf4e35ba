//! Driftwave Player (driftwave-player) - Main entry point
//!
//! Reads base64 PCM16LE mono chunks from stdin, one per line, and plays
//! them gaplessly on the default (or named) output device. With
//! `--null-output` the audio is rendered against a wall-clock driven
//! virtual sink instead, which is handy for soak tests and CI.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use driftwave_common::events::EngineEvent;
use driftwave_common::PlaybackState;
use driftwave_player::audio::{
    completion_channel, CompletionReceiver, CpalSink, OutputSink, VirtualSink,
};
use driftwave_player::{EngineConfig, PlayerHandle, PlayerService, StreamEngine};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for driftwave-player
#[derive(Parser, Debug)]
#[command(name = "driftwave-player")]
#[command(about = "Gapless player for streamed PCM16 audio chunks")]
#[command(version)]
struct Args {
    /// Config file (TOML)
    #[arg(short, long, env = "DRIFTWAVE_CONFIG")]
    config: Option<PathBuf>,

    /// Output device name (default device if omitted)
    #[arg(short, long, env = "DRIFTWAVE_DEVICE")]
    device: Option<String>,

    /// Sample rate of the incoming chunks in Hz
    #[arg(long, env = "DRIFTWAVE_SAMPLE_RATE")]
    sample_rate: Option<u32>,

    /// Buffered seconds that count as a full buffer
    #[arg(long)]
    target_buffer: Option<f64>,

    /// Initial volume (0.0-1.0)
    #[arg(long)]
    volume: Option<f32>,

    /// Render to a virtual clocked sink instead of an audio device
    #[arg(long)]
    null_output: bool,

    /// Print engine events to stdout as JSON lines
    #[arg(long)]
    events_json: bool,

    /// List output devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Seconds between telemetry log lines (0 disables)
    #[arg(long, default_value = "5")]
    telemetry_interval: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays clean for --events-json
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "driftwave_player=info,driftwave_common=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    if args.list_devices {
        for name in CpalSink::list_devices().context("Failed to list output devices")? {
            println!("{}", name);
        }
        return Ok(());
    }

    let config = build_config(&args)?;
    info!(
        "Starting Driftwave Player v{} ({} Hz, {})",
        env!("CARGO_PKG_VERSION"),
        config.sample_rate,
        if args.null_output { "null output" } else { "audio device" }
    );

    let (completions_tx, completions_rx) = completion_channel();
    if args.null_output {
        let sink = VirtualSink::new(config.sample_rate, config.analysis_window, completions_tx);
        tokio::spawn(drive_virtual_clock(sink.clone()));
        run(StreamEngine::new(sink, config), completions_rx, &args).await
    } else {
        let sink = CpalSink::new(&config, completions_tx);
        run(StreamEngine::new(sink, config), completions_rx, &args).await
    }
}

/// Defaults < config file < command line
fn build_config(args: &Args) -> Result<EngineConfig> {
    let mut config =
        EngineConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    if let Some(device) = &args.device {
        config.device = Some(device.clone());
    }
    if let Some(rate) = args.sample_rate {
        config.sample_rate = rate;
    }
    if let Some(target) = args.target_buffer {
        config.target_buffer_seconds = target;
    }
    if let Some(volume) = args.volume {
        config.initial_volume = volume;
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

async fn run<S: OutputSink + 'static>(
    engine: StreamEngine<S>,
    completions: CompletionReceiver,
    args: &Args,
) -> Result<()> {
    let (handle, task) = PlayerService::spawn(engine, completions);

    if args.events_json {
        tokio::spawn(print_events(handle.subscribe()));
    }
    if args.telemetry_interval > 0 {
        tokio::spawn(log_telemetry(
            handle.clone(),
            Duration::from_secs(args.telemetry_interval),
        ));
    }

    handle.play().await.context("Failed to start playback")?;

    let session = async {
        let chunks = feed_stdin(&handle).await?;
        info!("Input ended after {} chunks, draining buffered audio", chunks);
        wait_for_drain(&handle).await;
        Ok::<_, anyhow::Error>(())
    };

    tokio::select! {
        result = session => result?,
        _ = shutdown_signal() => {}
    }

    handle.stop().await.context("Failed to stop playback")?;
    let stats = handle.telemetry().stats;
    info!(
        "Session summary: {} chunks received, {} dropped, {} underruns, {:.1}s scheduled",
        stats.chunks_received, stats.chunks_dropped, stats.underruns, stats.seconds_scheduled
    );

    handle.shutdown().await;
    task.await.context("Player task failed")?;
    info!("Shutdown complete");
    Ok(())
}

/// Queue every non-empty stdin line as one chunk
async fn feed_stdin(handle: &PlayerHandle) -> Result<u64> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut count = 0;

    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        handle.queue_chunk(line).await?;
        count += 1;
    }
    Ok(count)
}

async fn wait_for_drain(handle: &PlayerHandle) {
    loop {
        match handle.snapshot().await {
            Ok(snapshot)
                if snapshot.buffered_seconds > 0.0 && snapshot.state != PlaybackState::Stopped =>
            {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            _ => break,
        }
    }
}

/// Advance a virtual sink in step with the wall clock
async fn drive_virtual_clock(sink: VirtualSink) {
    let rate = sink.device_sample_rate() as f64;
    let started = Instant::now();
    let mut emitted: u64 = 0;
    let mut ticker = tokio::time::interval(Duration::from_millis(10));

    loop {
        ticker.tick().await;
        let target = (started.elapsed().as_secs_f64() * rate) as u64;
        sink.advance_frames(target.saturating_sub(emitted));
        emitted = emitted.max(target);
    }
}

async fn print_events(mut events: broadcast::Receiver<EngineEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(line) => println!("{}", line),
                Err(e) => warn!("Failed to serialize {} event: {}", event.event_type(), e),
            },
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!("Event output lagged, {} events skipped", missed);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn log_telemetry(handle: PlayerHandle, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let t = handle.telemetry();
        info!(
            "{}: buffer {:.0}% ({:.2}s, {} queued, {} in flight), underruns {}, level {:.3}",
            t.state,
            t.buffer_health * 100.0,
            t.buffered_seconds,
            t.queued_chunks,
            t.in_flight_segments,
            t.stats.underruns,
            handle.current_rms_level()
        );
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
