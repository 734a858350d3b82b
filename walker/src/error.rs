//! Error types for beam walking
//!
//! Measurement faults, model geometry faults and walk-level faults are kept
//! in separate enums so a recovery layer can tell bad instrumentation apart
//! from a bad linear model.

use std::time::Duration;
use thiserror::Error;

/// A measurement cycle failed to produce a usable reading.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MeasurementError {
    /// Requested zero shots per measurement
    #[error("average count must be at least 1, got {0}")]
    InvalidAverage(usize),

    /// The collaborator failed to trigger or read the detector
    #[error("detector {detector} failed on cycle {cycle}: {message}")]
    Detector {
        detector: String,
        cycle: usize,
        message: String,
    },

    /// The reading did not contain the requested field
    #[error("detector {detector} reading has no field {field:?}")]
    MissingField { detector: String, field: String },

    /// The field was present but carried no valid value (no beam)
    #[error("no signal on detector {detector} field {field:?} during cycle {cycle}")]
    NoSignal {
        detector: String,
        field: String,
        cycle: usize,
    },
}

/// The visited samples cannot produce a usable linear model.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DegenerateModelError {
    /// Fewer than two samples, or mismatched input lengths
    #[error("linear fit needs at least 2 paired samples, got {positions} positions and {readings} readings")]
    InsufficientSamples { positions: usize, readings: usize },

    /// Visited positions are numerically indistinguishable
    #[error("all {samples} positions are numerically indistinguishable (near {position}); slope is undefined")]
    ZeroPositionVariance { samples: usize, position: f64 },

    /// Detector appears insensitive to the actuator
    #[error("fitted slope {slope:.3e} is below {min_slope:.3e}; detector appears insensitive to actuator")]
    FlatResponse { slope: f64, min_slope: f64 },

    /// The inverted line produced a non-finite position
    #[error("model predicted a non-finite position (slope={slope}, intercept={intercept})")]
    NonFinitePrediction { slope: f64, intercept: f64 },
}

/// Errors terminating a walk abnormally
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WalkError {
    /// Configuration rejected before any motion
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Metadata overlay conflicts with the base record
    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),

    /// Actuator failed to reach a position
    #[error("actuator {actuator} failed to move to {position}: {message}")]
    Motion {
        actuator: String,
        position: f64,
        message: String,
    },

    /// Averaged measurement failed
    #[error("measurement {sample_index} at position {position} failed: {source}")]
    Measurement {
        sample_index: usize,
        position: f64,
        #[source]
        source: MeasurementError,
    },

    /// Regression could not produce a next position
    #[error("model failed after {samples} samples (last position {position}): {source}")]
    DegenerateModel {
        samples: usize,
        position: f64,
        #[source]
        source: DegenerateModelError,
    },

    /// Predicted position lies outside the actuator limits
    #[error("position {position} is outside actuator range [{min}, {max}]")]
    UnreachablePosition { position: f64, min: f64, max: f64 },

    /// Timeout elapsed before convergence
    #[error("timed out after {elapsed:?} with reading {last_reading} ({samples} samples)")]
    Timeout {
        elapsed: Duration,
        last_reading: f64,
        samples: usize,
    },
}
