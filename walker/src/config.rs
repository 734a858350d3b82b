//! Configuration for a beam walk

use clap::{Args, ValueEnum};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::time::Duration;

use crate::error::WalkError;

/// Default initial step, in actuator units
pub const DEFAULT_FIRST_STEP: f64 = 1e-3;

/// Default acceptable distance from target, in detector pixels
pub const DEFAULT_TOLERANCE: f64 = 20.0;

/// Default smallest usable fitted slope magnitude
pub const DEFAULT_MIN_SLOPE: f64 = 1e-12;

/// Default detector field consumed by the walk
pub const DEFAULT_FIELD: &str = "centroid";

/// What to do with a predicted position outside the actuator limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundPolicy {
    /// Fail with `UnreachablePosition`
    #[default]
    Reject,
    /// Clamp to the nearest limit; fail if already sitting on that limit
    Clamp,
}

/// Parameters of one walk.
///
/// Use with `#[command(flatten)]` in a CLI args struct, or load from JSON.
#[derive(Args, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkConfig {
    /// Initial step away from the start position
    #[arg(long, default_value_t = DEFAULT_FIRST_STEP, allow_negative_numbers = true)]
    pub first_step: f64,

    /// Allowed absolute difference between target and reading
    #[arg(long, default_value_t = DEFAULT_TOLERANCE)]
    pub tolerance: f64,

    /// Shots averaged per measurement (1 when unset)
    #[arg(long)]
    pub average: Option<usize>,

    /// Give up after this many seconds, checked between steps
    #[arg(long)]
    pub timeout_secs: Option<f64>,

    /// Lowest position the actuator may be commanded to
    #[arg(long, allow_negative_numbers = true)]
    pub min_position: Option<f64>,

    /// Highest position the actuator may be commanded to
    #[arg(long, allow_negative_numbers = true)]
    pub max_position: Option<f64>,

    /// Handling of predicted positions outside the limits
    #[arg(long, value_enum, default_value_t = BoundPolicy::Reject)]
    pub bound_policy: BoundPolicy,

    /// Fitted slopes at or below this magnitude are treated as no response
    #[arg(long, default_value_t = DEFAULT_MIN_SLOPE)]
    pub min_slope: f64,

    /// Detector field to align
    #[arg(long, default_value = DEFAULT_FIELD)]
    pub field: String,
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self {
            first_step: DEFAULT_FIRST_STEP,
            tolerance: DEFAULT_TOLERANCE,
            average: None,
            timeout_secs: None,
            min_position: None,
            max_position: None,
            bound_policy: BoundPolicy::default(),
            min_slope: DEFAULT_MIN_SLOPE,
            field: DEFAULT_FIELD.to_string(),
        }
    }
}

impl WalkConfig {
    pub fn with_first_step(mut self, first_step: f64) -> Self {
        self.first_step = first_step;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_average(mut self, average: usize) -> Self {
        self.average = Some(average);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = Some(timeout.as_secs_f64());
        self
    }

    pub fn with_limits(mut self, min: f64, max: f64, policy: BoundPolicy) -> Self {
        self.min_position = Some(min);
        self.max_position = Some(max);
        self.bound_policy = policy;
        self
    }

    /// Timeout as a duration; `None` when unset. A validated config always
    /// converts.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }

    /// Actuator range, open-ended where a limit is unset
    pub fn limits(&self) -> (f64, f64) {
        (
            self.min_position.unwrap_or(f64::NEG_INFINITY),
            self.max_position.unwrap_or(f64::INFINITY),
        )
    }

    /// Check the configuration before any motion is attempted
    pub fn validate(&self) -> Result<(), WalkError> {
        let invalid =
            |msg: String| -> Result<(), WalkError> { Err(WalkError::InvalidConfig(msg)) };

        if !self.first_step.is_finite() || self.first_step == 0.0 {
            return invalid(format!(
                "first_step must be finite and non-zero, got {}",
                self.first_step
            ));
        }
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return invalid(format!(
                "tolerance must be finite and non-negative, got {}",
                self.tolerance
            ));
        }
        if self.average == Some(0) {
            return invalid("average must be at least 1".to_string());
        }
        if let Some(t) = self.timeout_secs {
            if !t.is_finite() || t <= 0.0 {
                return invalid(format!("timeout_secs must be positive, got {t}"));
            }
            if Duration::try_from_secs_f64(t).is_err() {
                return invalid(format!("timeout_secs {t} is too large to represent"));
            }
        }
        for limit in [self.min_position, self.max_position].into_iter().flatten() {
            if !limit.is_finite() {
                return invalid(format!("position limits must be finite, got {limit}"));
            }
        }
        let (min, max) = self.limits();
        if min > max {
            return invalid(format!("min_position {min} exceeds max_position {max}"));
        }
        if !self.min_slope.is_finite() || self.min_slope < 0.0 {
            return invalid(format!(
                "min_slope must be finite and non-negative, got {}",
                self.min_slope
            ));
        }
        if self.field.is_empty() {
            return invalid("field must not be empty".to_string());
        }
        Ok(())
    }

    /// Load a configuration from a JSON file. Missing keys take defaults.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let config: Self = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Save the configuration as pretty-printed JSON
    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use clap::Parser;

    #[derive(Parser, Debug)]
    struct TestCli {
        #[command(flatten)]
        walk: WalkConfig,
    }

    #[test]
    fn test_default_config() {
        let config = WalkConfig::default();

        assert_abs_diff_eq!(config.first_step, 1e-3, epsilon = f64::EPSILON);
        assert_abs_diff_eq!(config.tolerance, 20.0, epsilon = f64::EPSILON);
        assert_eq!(config.average, None);
        assert_eq!(config.timeout(), None);
        assert_eq!(config.bound_policy, BoundPolicy::Reject);
        assert_eq!(config.field, "centroid");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cli_defaults_match_default() {
        let cli = TestCli::parse_from(["walk"]);

        assert_eq!(cli.walk, WalkConfig::default());
    }

    #[test]
    fn test_cli_negative_limits() {
        let cli = TestCli::parse_from([
            "walk",
            "--first-step",
            "-0.5",
            "--min-position",
            "-10",
            "--max-position",
            "10",
            "--bound-policy",
            "clamp",
            "--average",
            "4",
        ]);

        assert_abs_diff_eq!(cli.walk.first_step, -0.5);
        assert_eq!(cli.walk.limits(), (-10.0, 10.0));
        assert_eq!(cli.walk.bound_policy, BoundPolicy::Clamp);
        assert_eq!(cli.walk.average, Some(4));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let bad = [
            WalkConfig::default().with_first_step(0.0),
            WalkConfig::default().with_first_step(f64::NAN),
            WalkConfig::default().with_tolerance(-1.0),
            WalkConfig::default().with_average(0),
            WalkConfig {
                timeout_secs: Some(0.0),
                ..Default::default()
            },
            WalkConfig {
                timeout_secs: Some(1e30),
                ..Default::default()
            },
            WalkConfig::default().with_limits(5.0, -5.0, BoundPolicy::Reject),
            WalkConfig {
                min_slope: -1.0,
                ..Default::default()
            },
            WalkConfig {
                field: String::new(),
                ..Default::default()
            },
        ];

        for config in bad {
            assert!(
                matches!(config.validate(), Err(WalkError::InvalidConfig(_))),
                "expected rejection of {config:?}"
            );
        }
    }

    #[test]
    fn test_timeout_conversion() {
        let config = WalkConfig::default().with_timeout(Duration::from_millis(250));

        assert_eq!(config.timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_large_valid_timeout_is_enforced() {
        let config = WalkConfig {
            timeout_secs: Some(1e9),
            ..Default::default()
        };

        assert!(config.validate().is_ok());
        assert_eq!(config.timeout(), Some(Duration::from_secs(1_000_000_000)));
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("walk.json");
        let config = WalkConfig::default()
            .with_tolerance(0.5)
            .with_average(3)
            .with_limits(-1.0, 1.0, BoundPolicy::Clamp);

        config.save(&path).unwrap();
        let loaded = WalkConfig::load(&path).unwrap();

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_partial_json_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.json");
        std::fs::write(&path, r#"{"tolerance": 2.5, "bound_policy": "clamp"}"#).unwrap();

        let loaded = WalkConfig::load(&path).unwrap();

        assert_abs_diff_eq!(loaded.tolerance, 2.5);
        assert_eq!(loaded.bound_policy, BoundPolicy::Clamp);
        assert_abs_diff_eq!(loaded.first_step, DEFAULT_FIRST_STEP);
    }
}
