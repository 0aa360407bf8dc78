//! Tuning knobs for calibration, alignment and tone mapping.
//!
//! All fields have defaults, so a config file only needs to list what
//! it changes:
//!
//! ```json
//! { "calibration": { "lambda": 20.0 }, "tonemap": { "key": 0.25 } }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use sensor_analysis::{DebevecParams, RobertsonParams};
use tone_map::{Operator, TonemapParams};

use crate::MergeError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MergeConfig {
    pub calibration: CalibrationConfig,
    pub align: AlignConfig,
    pub tonemap: TonemapConfig,
}

impl MergeConfig {
    pub fn from_json(text: &str) -> Result<MergeConfig, MergeError> {
        let config: MergeConfig =
            serde_json::from_str(text).map_err(|e| MergeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<MergeConfig, MergeError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| MergeError::Config(format!("{}: {}", path.display(), e)))?;
        MergeConfig::from_json(&text)
    }

    pub fn validate(&self) -> Result<(), MergeError> {
        let c = &self.calibration;
        if c.samples == 0 {
            return Err(MergeError::Config("calibration.samples must be > 0".into()));
        }
        if !(c.lambda.is_finite() && c.lambda > 0.0) {
            return Err(MergeError::Config("calibration.lambda must be > 0".into()));
        }
        if c.max_iterations == 0 {
            return Err(MergeError::Config(
                "calibration.max_iterations must be > 0".into(),
            ));
        }
        if !(c.threshold.is_finite() && c.threshold >= 0.0) {
            return Err(MergeError::Config(
                "calibration.threshold must be >= 0".into(),
            ));
        }
        if self.align.max_levels == 0 {
            return Err(MergeError::Config("align.max_levels must be > 0".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CalibrationConfig {
    /// Pixel locations used by Debevec's solver.
    pub samples: usize,
    /// Debevec smoothness weight.
    pub lambda: f32,
    pub max_iterations: usize,
    /// Robertson convergence threshold.
    pub threshold: f32,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        let debevec = DebevecParams::default();
        let robertson = RobertsonParams::default();
        CalibrationConfig {
            samples: debevec.samples,
            lambda: debevec.lambda,
            max_iterations: robertson.max_iterations,
            threshold: robertson.threshold,
        }
    }
}

impl CalibrationConfig {
    pub fn debevec(&self) -> DebevecParams {
        DebevecParams {
            samples: self.samples,
            lambda: self.lambda,
        }
    }

    pub fn robertson(&self) -> RobertsonParams {
        RobertsonParams {
            max_iterations: self.max_iterations,
            threshold: self.threshold,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AlignConfig {
    /// Pyramid depth, including full resolution.  Bounds the search to
    /// `2^max_levels - 1` pixels.
    pub max_levels: usize,
    /// Gray levels around the median left out of the comparison.
    pub exclusion: u8,
}

impl Default for AlignConfig {
    fn default() -> Self {
        AlignConfig {
            max_levels: 6,
            exclusion: 4,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TonemapConfig {
    pub key: f32,
    pub bias: f32,
    pub contrast: f32,
    pub saturation: f32,
}

impl Default for TonemapConfig {
    fn default() -> Self {
        let p = TonemapParams::default();
        TonemapConfig {
            key: p.key,
            bias: p.bias,
            contrast: p.contrast,
            saturation: p.saturation,
        }
    }
}

impl TonemapConfig {
    pub fn params(&self, operator: Operator, gamma: f32) -> TonemapParams {
        TonemapParams {
            operator: operator,
            gamma: gamma,
            key: self.key,
            bias: self.bias,
            contrast: self.contrast,
            saturation: self.saturation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = MergeConfig::default();
        assert_eq!(config.calibration.samples, 70);
        assert_eq!(config.calibration.lambda, 10.0);
        assert_eq!(config.calibration.max_iterations, 30);
        assert_eq!(config.calibration.threshold, 0.01);
        assert_eq!(config.align.max_levels, 6);
        assert_eq!(config.align.exclusion, 4);
        assert_eq!(config.tonemap.key, 0.18);
        assert_eq!(config.tonemap.bias, 0.85);
        assert_eq!(config.tonemap.contrast, 0.75);
        assert_eq!(config.tonemap.saturation, 1.0);
    }

    #[test]
    fn partial_json() {
        let config =
            MergeConfig::from_json(r#"{ "calibration": { "lambda": 20.0 }, "tonemap": { "key": 0.25 } }"#)
                .unwrap();
        assert_eq!(config.calibration.lambda, 20.0);
        assert_eq!(config.calibration.samples, 70);
        assert_eq!(config.tonemap.key, 0.25);
        assert_eq!(config.align, AlignConfig::default());
    }

    #[test]
    fn empty_json_is_default() {
        assert_eq!(MergeConfig::from_json("{}").unwrap(), MergeConfig::default());
    }

    #[test]
    fn rejects_bad_json() {
        assert!(matches!(
            MergeConfig::from_json("{ not json"),
            Err(MergeError::Config(_))
        ));
        assert!(matches!(
            MergeConfig::from_json(r#"{ "calibration": { "lamda": 1.0 } }"#),
            Err(MergeError::Config(_))
        ));
        assert!(matches!(
            MergeConfig::from_json(r#"{ "calibration": { "samples": 0 } }"#),
            Err(MergeError::Config(_))
        ));
    }

    #[test]
    fn tonemap_params_carry_overrides() {
        let config = TonemapConfig {
            key: 0.3,
            ..TonemapConfig::default()
        };
        let params = config.params(Operator::Drago, 1.8);
        assert_eq!(params.operator, Operator::Drago);
        assert_eq!(params.gamma, 1.8);
        assert_eq!(params.key, 0.3);
        assert_eq!(params.bias, 0.85);
    }

    #[test]
    fn missing_file() {
        let result = MergeConfig::load(Path::new("/nonexistent/merge.json"));
        assert!(matches!(result, Err(MergeError::Config(_))));
    }
}
