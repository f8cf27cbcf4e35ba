//! Gain ramp shapes for stream-boundary fades
//!
//! A curve maps normalized progress through a ramp (0.0 = first sample,
//! 1.0 = last sample) to a gain multiplier. Every curve is strictly
//! increasing for fade-in and strictly decreasing for fade-out on (0, 1),
//! so an entry ramp never dips and an exit ramp never swells.

use serde::{Deserialize, Serialize};
use std::f32::consts::{FRAC_PI_2, PI};
use std::str::FromStr;

use crate::Error;

/// Ramp shape used by the envelope shaper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FadeCurve {
    /// v(t) = t
    #[default]
    Linear,

    /// v(t) = 0.5 × (1 - cos(π × t))
    SCurve,

    /// v(t) = sin(t × π/2), constant perceived loudness across the ramp
    EqualPower,
}

impl FadeCurve {
    /// Gain for a rising ramp at normalized `position`
    pub fn gain_in(&self, position: f32) -> f32 {
        let t = position.clamp(0.0, 1.0);

        match self {
            FadeCurve::Linear => t,
            FadeCurve::SCurve => 0.5 * (1.0 - (PI * t).cos()),
            FadeCurve::EqualPower => (t * FRAC_PI_2).sin(),
        }
    }

    /// Gain for a falling ramp at normalized `position`
    ///
    /// Mirror image of [`FadeCurve::gain_in`]: `gain_out(t) == gain_in(1 - t)`.
    pub fn gain_out(&self, position: f32) -> f32 {
        self.gain_in(1.0 - position.clamp(0.0, 1.0))
    }

    /// Canonical config-file spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            FadeCurve::Linear => "linear",
            FadeCurve::SCurve => "s_curve",
            FadeCurve::EqualPower => "equal_power",
        }
    }

    pub fn all_variants() -> &'static [FadeCurve] {
        &[FadeCurve::Linear, FadeCurve::SCurve, FadeCurve::EqualPower]
    }
}

impl FromStr for FadeCurve {
    type Err = Error;

    /// Accepts the canonical names plus a few common aliases, case-insensitive
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "linear" => Ok(FadeCurve::Linear),
            "s_curve" | "scurve" | "s-curve" | "cosine" => Ok(FadeCurve::SCurve),
            "equal_power" | "equalpower" | "equal-power" | "sine" => Ok(FadeCurve::EqualPower),
            other => Err(Error::InvalidInput(format!("unknown fade curve '{}'", other))),
        }
    }
}

impl std::fmt::Display for FadeCurve {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gain_in_bounds() {
        for curve in FadeCurve::all_variants() {
            let start = curve.gain_in(0.0);
            let end = curve.gain_in(1.0);
            assert!(start.abs() < 1e-6, "{:?} should start silent, got {}", curve, start);
            assert!((end - 1.0).abs() < 1e-6, "{:?} should end at unity, got {}", curve, end);
        }
    }

    #[test]
    fn test_gain_out_mirrors_gain_in() {
        for curve in FadeCurve::all_variants() {
            for step in 0..=20 {
                let t = step as f32 / 20.0;
                let diff = (curve.gain_out(t) - curve.gain_in(1.0 - t)).abs();
                assert!(diff < 1e-6, "{:?} not mirrored at t={}", curve, t);
            }
        }
    }

    #[test]
    fn test_rising_curves_strictly_increase() {
        for curve in FadeCurve::all_variants() {
            let mut prev = curve.gain_in(0.0);
            for step in 1..=100 {
                let next = curve.gain_in(step as f32 / 100.0);
                assert!(next > prev, "{:?} not increasing at step {}", curve, step);
                prev = next;
            }
        }
    }

    #[test]
    fn test_out_of_range_positions_clamp() {
        assert_eq!(FadeCurve::Linear.gain_in(-1.0), 0.0);
        assert_eq!(FadeCurve::Linear.gain_in(2.0), 1.0);
        assert_eq!(FadeCurve::Linear.gain_out(2.0), 0.0);
    }

    #[test]
    fn test_parse_round_trip_and_aliases() {
        for curve in FadeCurve::all_variants() {
            assert_eq!(curve.as_str().parse::<FadeCurve>().unwrap(), *curve);
        }
        assert_eq!("Cosine".parse::<FadeCurve>().unwrap(), FadeCurve::SCurve);
        assert_eq!("equal-power".parse::<FadeCurve>().unwrap(), FadeCurve::EqualPower);
        assert!("exponential".parse::<FadeCurve>().is_err());
    }

    #[test]
    fn test_serde_uses_snake_case() {
        let json = serde_json::to_string(&FadeCurve::EqualPower).unwrap();
        assert_eq!(json, "\"equal_power\"");
        let parsed: FadeCurve = serde_json::from_str("\"s_curve\"").unwrap();
        assert_eq!(parsed, FadeCurve::SCurve);
    }

    #[test]
    fn test_default_is_linear() {
        assert_eq!(FadeCurve::default(), FadeCurve::Linear);
    }
}
