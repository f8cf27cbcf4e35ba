//! Engine configuration
//!
//! Values come from (highest priority first) CLI flags, a TOML config file,
//! and the compiled defaults below. Every field has a default, so a config
//! file only needs the keys it overrides.

use std::path::Path;
use std::time::Duration;

use driftwave_common::FadeCurve;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "DRIFTWAVE_CONFIG";

/// Analysis constants for the visualizer taps
pub mod analysis {
    /// FFT window size for spectrum snapshots
    pub const FFT_SIZE: usize = 512;

    /// Number of frequency bands in a spectrum snapshot
    pub const SPECTRUM_BANDS: usize = 16;
}

/// Streaming engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Sample rate of incoming PCM16 chunks (Hz)
    pub sample_rate: u32,

    /// Buffered audio that counts as a full buffer (buffer health 1.0)
    pub target_buffer_seconds: f64,

    /// Base look-ahead unit (seconds)
    pub lookahead_base_seconds: f64,

    /// Scheduling stops once the timeline is this many base units ahead of the clock
    pub lookahead_multiplier: u32,

    /// Entry fade applied after silence (milliseconds)
    pub entry_fade_ms: u32,

    /// Exit fade applied to a segment cut by a hard stop (milliseconds)
    pub exit_fade_ms: u32,

    /// Ramp shape for both fades
    pub fade_curve: FadeCurve,

    /// Volume change ramp time (milliseconds)
    pub volume_ramp_ms: u32,

    /// Safety re-check interval for the driver task (milliseconds)
    pub tick_interval_ms: u64,

    /// Volume applied when the device is opened (0.0-1.0)
    pub initial_volume: f32,

    /// EventBus channel capacity
    pub event_capacity: usize,

    /// Number of recent output samples kept for level/time-domain snapshots
    pub analysis_window: usize,

    /// Output device name (None = system default)
    pub device: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 24_000,
            target_buffer_seconds: 2.0,
            lookahead_base_seconds: 0.1,
            lookahead_multiplier: 10,
            entry_fade_ms: 10,
            exit_fade_ms: 10,
            fade_curve: FadeCurve::Linear,
            volume_ramp_ms: 30,
            tick_interval_ms: 50,
            initial_volume: 0.8,
            event_capacity: 256,
            analysis_window: 2048,
            device: None,
        }
    }
}

impl EngineConfig {
    /// Resolve and load the config file, falling back to defaults
    ///
    /// Values are not validated here; callers apply their overrides first
    /// and then call [`validate`](Self::validate).
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        Ok(driftwave_common::config::load_or_default(cli_path, CONFIG_ENV_VAR)?)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(Error::Config("sample_rate must be positive".to_string()));
        }
        if !(self.target_buffer_seconds > 0.0) {
            return Err(Error::Config(
                "target_buffer_seconds must be positive".to_string(),
            ));
        }
        if !(self.lookahead_base_seconds > 0.0) || self.lookahead_multiplier == 0 {
            return Err(Error::Config(
                "look-ahead base and multiplier must be positive".to_string(),
            ));
        }
        if self.tick_interval_ms == 0 {
            return Err(Error::Config("tick_interval_ms must be positive".to_string()));
        }
        if !(0.0..=1.0).contains(&self.initial_volume) {
            return Err(Error::Config(format!(
                "initial_volume {} outside 0.0-1.0",
                self.initial_volume
            )));
        }
        if self.event_capacity == 0 {
            return Err(Error::Config("event_capacity must be positive".to_string()));
        }
        if self.analysis_window < analysis::FFT_SIZE {
            return Err(Error::Config(format!(
                "analysis_window must hold at least {} samples",
                analysis::FFT_SIZE
            )));
        }
        Ok(())
    }

    /// How far ahead of the output clock the scheduler may queue audio
    pub fn lookahead_ceiling(&self) -> f64 {
        self.lookahead_base_seconds * self.lookahead_multiplier as f64
    }

    pub fn entry_fade_samples(&self) -> usize {
        ms_to_samples(self.entry_fade_ms, self.sample_rate)
    }

    pub fn volume_ramp(&self) -> Duration {
        Duration::from_millis(self.volume_ramp_ms as u64)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

fn ms_to_samples(ms: u32, sample_rate: u32) -> usize {
    (ms as u64 * sample_rate as u64 / 1000) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.sample_rate, 24_000);
        assert!((config.lookahead_ceiling() - 1.0).abs() < 1e-9);
        assert_eq!(config.entry_fade_samples(), 240);
        assert_eq!(config.volume_ramp(), Duration::from_millis(30));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "sample_rate = 48000\nfade_curve = \"s_curve\"\ndevice = \"USB DAC\""
        )
        .unwrap();

        let config = EngineConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.sample_rate, 48_000);
        assert_eq!(config.fade_curve, FadeCurve::SCurve);
        assert_eq!(config.device.as_deref(), Some("USB DAC"));
        assert_eq!(config.lookahead_multiplier, 10);
        assert_eq!(config.entry_fade_samples(), 480);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = EngineConfig::default();
        config.sample_rate = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.target_buffer_seconds = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.initial_volume = 1.5;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.analysis_window = 64;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_file_value_caught_by_validate() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "lookahead_multiplier = 0").unwrap();
        let config = EngineConfig::load(Some(file.path())).unwrap();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_bad_file_value_can_be_overridden_before_validation() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "initial_volume = 3.0").unwrap();

        let mut config = EngineConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.initial_volume, 3.0);
        assert!(config.validate().is_err());

        config.initial_volume = 0.5;
        config.validate().unwrap();
    }
}
