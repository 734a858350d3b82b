//! Convergence walker
//!
//! Steps a single actuator until a detector reading lands within tolerance
//! of a target. The relationship between actuator position and reading is
//! unknown up front but assumed locally linear.
//!
//! The first move is a blind step of `first_step` away from the start. The
//! two resulting points define a coarse line, which is inverted to predict
//! the position that should hit the target. Every subsequent measurement is
//! added to the history and the line is refit from scratch over all points,
//! so the model improves with each step.
//!
//! # Loop
//! 1. Move to `start`, measure, seed the history
//! 2. Stop if `|target - reading| <= tolerance` (converged)
//! 3. Stop if the timeout has elapsed (abort the collaborator, timed out)
//! 4. Checkpoint, move to the predicted position, measure, record
//! 5. Refit the line, predict the next position, go to 2

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::config::{BoundPolicy, WalkConfig};
use crate::engine::BeamlineEngine;
use crate::error::WalkError;
use crate::history::History;
use crate::measure::measure_centroid;
use crate::metadata::{MetadataOverlay, RunMetadata, WalkMetadata};
use crate::regression::LinearModel;

/// Reason abort is sent to the collaborator when the timeout expires
pub const TIMEOUT_ABORT_REASON: &str = "timeout";

/// How a walk ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalkStatus {
    /// Reading is within tolerance of the target
    Converged,
    /// Timeout expired first; the collaborator was aborted
    TimedOut,
}

impl fmt::Display for WalkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalkStatus::Converged => write!(f, "converged"),
            WalkStatus::TimedOut => write!(f, "timed out"),
        }
    }
}

/// Result of a walk that ended normally or by timeout
#[derive(Debug, Clone)]
pub struct WalkOutcome {
    pub status: WalkStatus,
    /// Last averaged reading observed
    pub reading: f64,
    pub target: f64,
    /// Every visited position and its reading, seed sample first
    pub history: History,
    /// Number of move/measure/refit iterations performed
    pub steps: usize,
    /// Time spent in the loop after the seed measurement
    pub elapsed: Duration,
    /// Line fitted after the final step, if any step was taken
    pub model: Option<LinearModel>,
    pub metadata: RunMetadata,
}

impl WalkOutcome {
    pub fn is_converged(&self) -> bool {
        self.status == WalkStatus::Converged
    }

    /// Position at which the final reading was taken
    pub fn position(&self) -> Option<f64> {
        self.history.last().map(|s| s.position)
    }

    /// Treat a timeout as an error
    pub fn into_result(self) -> Result<Self, WalkError> {
        match self.status {
            WalkStatus::Converged => Ok(self),
            WalkStatus::TimedOut => Err(WalkError::Timeout {
                elapsed: self.elapsed,
                last_reading: self.reading,
                samples: self.history.len(),
            }),
        }
    }
}

/// Step `motor` until `detector` reads `target` within tolerance.
///
/// The detector must respond approximately linearly to the motor near the
/// path taken. Each reading is an average over `config.average` shots.
///
/// # Arguments
/// * `engine` - Collaborator that moves the motor and reads the detector
/// * `detector` - Detector name
/// * `motor` - Actuator name
/// * `target` - Desired reading
/// * `start` - Initial actuator position
/// * `config` - Step, tolerance, averaging, timeout and limit settings
/// * `md` - Optional metadata overlay merged over the base record
///
/// # Returns
/// * `Ok(WalkOutcome)` with `WalkStatus::Converged` on success
/// * `Ok(WalkOutcome)` with `WalkStatus::TimedOut` after the timeout, once
///   `abort` has been sent to the collaborator
///
/// # Errors
/// Invalid configuration or metadata, a failed move or measurement, a
/// degenerate fit, or a position outside the actuator limits.
pub fn walk_to_target<E: BeamlineEngine + ?Sized>(
    engine: &mut E,
    detector: &str,
    motor: &str,
    target: f64,
    start: f64,
    config: &WalkConfig,
    md: Option<&MetadataOverlay>,
) -> Result<WalkOutcome, WalkError> {
    config.validate()?;
    if !target.is_finite() || !start.is_finite() {
        return Err(WalkError::InvalidConfig(format!(
            "target and start must be finite, got target={target} start={start}"
        )));
    }

    let metadata = WalkMetadata::new(detector, motor, target, config.first_step, config.tolerance)
        .merge(md)?;
    engine.annotate(&metadata);

    info!(
        "Walking {} to {} = {:.3} ± {:.3} with {} from {:.6}",
        motor, detector, target, config.tolerance, config.field, start
    );

    // Initial measurement
    let start = bounded_position(start, None, config)?;
    move_motor(engine, motor, start)?;
    let mut reading = measure_at(engine, detector, config, start, 0)?;
    let mut history = History::seeded(start, reading);
    let mut next_position = first_step_position(start, config);
    let mut model = None;
    let mut steps = 0;

    let timeout = config.timeout();
    let start_time = Instant::now();

    let status = loop {
        if (target - reading).abs() <= config.tolerance {
            break WalkStatus::Converged;
        }

        if let Some(timeout) = timeout {
            if start_time.elapsed() > timeout {
                warn!(
                    "Walk timed out after {:.3} s with {} = {:.3} (target {:.3})",
                    start_time.elapsed().as_secs_f64(),
                    config.field,
                    reading,
                    target
                );
                engine.abort(TIMEOUT_ABORT_REASON);
                break WalkStatus::TimedOut;
            }
        }

        // The blind first step carries no information about reachability
        let last_position = model.and(history.last().map(|s| s.position));
        let position = bounded_position(next_position, last_position, config)?;

        engine.checkpoint();
        move_motor(engine, motor, position)?;
        reading = measure_at(engine, detector, config, position, history.len())?;
        history.push(position, reading);
        steps += 1;

        info!(
            "Step {}: {} at {:.6}, {} = {:.3} (target {:.3})",
            steps, motor, position, config.field, reading, target
        );

        let fit = history.fit().map_err(|source| WalkError::DegenerateModel {
            samples: history.len(),
            position,
            source,
        })?;
        next_position = fit
            .position_for(target, config.min_slope)
            .map_err(|source| WalkError::DegenerateModel {
                samples: history.len(),
                position,
                source,
            })?;
        model = Some(fit);
    };

    let elapsed = start_time.elapsed();
    info!(
        "Walk {} after {} steps: {} = {:.3}",
        status, steps, config.field, reading
    );

    Ok(WalkOutcome {
        status,
        reading,
        target,
        history,
        steps,
        elapsed,
        model,
        metadata,
    })
}

fn move_motor<E: BeamlineEngine + ?Sized>(
    engine: &mut E,
    motor: &str,
    position: f64,
) -> Result<(), WalkError> {
    engine
        .move_to(motor, position)
        .map_err(|message| WalkError::Motion {
            actuator: motor.to_string(),
            position,
            message,
        })
}

fn measure_at<E: BeamlineEngine + ?Sized>(
    engine: &mut E,
    detector: &str,
    config: &WalkConfig,
    position: f64,
    sample_index: usize,
) -> Result<f64, WalkError> {
    measure_centroid(engine, detector, &config.field, config.average).map_err(|source| {
        WalkError::Measurement {
            sample_index,
            position,
            source,
        }
    })
}

/// Blind first step away from `start`, reflected back into the limits when
/// stepping forward would leave them.
fn first_step_position(start: f64, config: &WalkConfig) -> f64 {
    let (min, max) = config.limits();
    let forward = start + config.first_step;
    let backward = start - config.first_step;
    if !(min..=max).contains(&forward) && (min..=max).contains(&backward) {
        backward
    } else {
        forward
    }
}

/// Apply the actuator limits to a position about to be commanded.
///
/// Under `Clamp`, a position that clamps onto the limit the actuator is
/// already sitting at means the target lies beyond reach.
fn bounded_position(
    position: f64,
    last_position: Option<f64>,
    config: &WalkConfig,
) -> Result<f64, WalkError> {
    let (min, max) = config.limits();
    let unreachable = WalkError::UnreachablePosition { position, min, max };
    if !position.is_finite() {
        return Err(unreachable);
    }
    if (min..=max).contains(&position) {
        return Ok(position);
    }

    match config.bound_policy {
        BoundPolicy::Reject => Err(unreachable),
        BoundPolicy::Clamp => {
            let clamped = position.clamp(min, max);
            if last_position == Some(clamped) {
                return Err(unreachable);
            }
            warn!(
                "Position {:.6} outside [{}, {}], clamping to {:.6}",
                position, min, max, clamped
            );
            Ok(clamped)
        }
    }
}
