//! Compiler configuration.

use std::path::PathBuf;

use photoscribe_math::PathTransform;
use serde::{Deserialize, Serialize};

use crate::device::Device;
use crate::error::{GcodeError, Result};

/// Construction-time configuration for a [`GcodeCompiler`](crate::GcodeCompiler).
///
/// Angles are given in degrees and normalized internally; pauses are in
/// seconds, coordinates and speeds in millimeters and mm/s.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Default output artifact name; the `.pgm` extension is enforced at
    /// close. `close()` fails if this is unset and no override is given.
    pub filename: Option<String>,
    /// Directory the artifact is written into; created if missing.
    pub export_dir: Option<PathBuf>,
    /// Refractive index of the substrate glass.
    pub n_glass: f64,
    /// Refractive index of the surrounding medium (air, water, oil).
    pub n_environment: f64,
    /// Substrate footprint `(x, y)` in mm; must be positive when warp
    /// compensation is enabled.
    pub sample_size: (f64, f64),
    /// Fabrication line the program targets.
    pub device: Device,
    /// Return to the initial point when a session ends.
    pub home: bool,
    /// Origin offset subtracted from x, y before any other transform step.
    pub new_origin: (f64, f64),
    /// Apply per-point warp compensation to the depth axis.
    pub warp_enabled: bool,
    /// Sample rotation in degrees, normalized mod 360.
    pub rotation_angle: f64,
    /// Hardware axis-rotation (G84) angle in degrees; 0 disables it.
    pub axis_rotation_angle: f64,
    /// Long settle pause in seconds (after moves and shutter changes).
    pub long_pause: f64,
    /// Short settle pause in seconds (before shutter changes and calls).
    pub short_pause: f64,
    /// Fixed-point decimal digits for coordinates and feed rates.
    pub output_digits: usize,
    /// Default positioning speed in mm/s for `move_to` and friends.
    pub speed_pos: Option<f64>,
    /// Mirror the path along x.
    pub flip_x: bool,
    /// Mirror the path along y.
    pub flip_y: bool,
    /// Target of `go_init` and of the homing step on session exit.
    pub init_point: (f64, f64, f64),
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            filename: None,
            export_dir: None,
            n_glass: 1.50,
            n_environment: 1.33,
            sample_size: (100.0, 50.0),
            device: Device::default(),
            home: false,
            new_origin: (0.0, 0.0),
            warp_enabled: false,
            rotation_angle: 0.0,
            axis_rotation_angle: 0.0,
            long_pause: 0.5,
            short_pause: 0.05,
            output_digits: 6,
            speed_pos: Some(5.0),
            flip_x: false,
            flip_y: false,
            init_point: (-2.0, 0.0, 0.0),
        }
    }
}

impl CompilerConfig {
    /// Default config with the given output name.
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: Some(filename.into()),
            ..Self::default()
        }
    }

    /// Parse a config from a TOML parameter file.
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| GcodeError::Config(e.to_string()))
    }

    /// Effective refractive index ratio `n_glass / n_environment`.
    pub fn neff(&self) -> f64 {
        self.n_glass / self.n_environment
    }

    /// Sample rotation normalized to `[0, 2*pi)` radians.
    pub fn rotation_radians(&self) -> f64 {
        self.rotation_angle.rem_euclid(360.0).to_radians()
    }

    /// Axis-rotation angle normalized to `[0, 360)` degrees.
    pub fn axis_rotation_degrees(&self) -> f64 {
        self.axis_rotation_angle.rem_euclid(360.0)
    }

    /// Smallest feed rate the fixed-point output can resolve.
    pub fn min_feed(&self) -> f64 {
        10f64.powi(-(self.output_digits as i32))
    }

    /// Check invariants that must hold before any instruction is emitted.
    pub fn validate(&self) -> Result<()> {
        let neff = self.neff();
        if !neff.is_finite() || neff <= 0.0 {
            return Err(GcodeError::InvalidRefractiveIndex(neff));
        }
        if self.warp_enabled && (self.sample_size.0 <= 0.0 || self.sample_size.1 <= 0.0) {
            return Err(GcodeError::InvalidSampleSize(
                self.sample_size.0,
                self.sample_size.1,
            ));
        }
        Ok(())
    }

    /// Build the coordinate pipeline described by this config (no warp;
    /// the warp function is injected separately).
    pub(crate) fn transform(&self) -> PathTransform {
        PathTransform::new(self.rotation_radians(), self.neff())
            .with_flips(self.flip_x, self.flip_y)
            .with_origin(self.new_origin.0, self.new_origin.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_defaults() {
        let config = CompilerConfig::default();
        assert_relative_eq!(config.neff(), 1.50 / 1.33);
        assert_eq!(config.device, Device::Pharos);
        assert_eq!(config.output_digits, 6);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rotation_normalization() {
        let mut config = CompilerConfig::default();
        config.rotation_angle = -90.0;
        assert_relative_eq!(config.rotation_radians(), 270.0_f64.to_radians());
        config.rotation_angle = 720.0 + 45.0;
        assert_relative_eq!(config.rotation_radians(), 45.0_f64.to_radians());
    }

    #[test]
    fn test_validate_refractive_index() {
        let mut config = CompilerConfig::default();
        config.n_environment = 0.0;
        assert!(matches!(
            config.validate(),
            Err(GcodeError::InvalidRefractiveIndex(_))
        ));
        config.n_environment = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_sample_size_only_with_warp() {
        let mut config = CompilerConfig::default();
        config.sample_size = (0.0, 50.0);
        assert!(config.validate().is_ok());
        config.warp_enabled = true;
        assert!(matches!(
            config.validate(),
            Err(GcodeError::InvalidSampleSize(..))
        ));
    }

    #[test]
    fn test_from_toml_partial() {
        let config = CompilerConfig::from_toml(
            r#"
            filename = "chip01.pgm"
            rotation_angle = 2.0
            flip_x = true
            device = "uwe"
            "#,
        )
        .unwrap();
        assert_eq!(config.filename.as_deref(), Some("chip01.pgm"));
        assert_eq!(config.device, Device::Uwe);
        assert!(config.flip_x);
        // untouched fields keep their defaults
        assert_relative_eq!(config.long_pause, 0.5);
    }

    #[test]
    fn test_from_toml_rejects_garbage() {
        assert!(matches!(
            CompilerConfig::from_toml("filename = 3"),
            Err(GcodeError::Config(_))
        ));
    }

    #[test]
    fn test_serde_round_trip() {
        let mut config = CompilerConfig::new("wg.pgm");
        config.new_origin = (5.0, -3.0);
        let json = serde_json::to_string(&config).unwrap();
        let back: CompilerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.filename, config.filename);
        assert_relative_eq!(back.new_origin.1, -3.0);
    }

    #[test]
    fn test_min_feed() {
        let mut config = CompilerConfig::default();
        assert_relative_eq!(config.min_feed(), 1e-6);
        config.output_digits = 3;
        assert_relative_eq!(config.min_feed(), 1e-3);
    }
}
