//! Visited positions and their readings

use serde::{Deserialize, Serialize};

use crate::error::DegenerateModelError;
use crate::regression::LinearModel;

/// One completed measurement at one actuator position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub position: f64,
    pub reading: f64,
}

/// Append-only record of a walk, in visiting order.
///
/// Positions and readings are stored as parallel columns so the
/// regression can consume them without copying.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct History {
    positions: Vec<f64>,
    readings: Vec<f64>,
}

impl History {
    /// Start a history from the seed measurement at the start position
    pub fn seeded(position: f64, reading: f64) -> Self {
        let mut history = Self::default();
        history.push(position, reading);
        history
    }

    pub fn push(&mut self, position: f64, reading: f64) {
        self.positions.push(position);
        self.readings.push(reading);
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn positions(&self) -> &[f64] {
        &self.positions
    }

    pub fn readings(&self) -> &[f64] {
        &self.readings
    }

    pub fn last(&self) -> Option<Sample> {
        Some(Sample {
            position: *self.positions.last()?,
            reading: *self.readings.last()?,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = Sample> + '_ {
        self.positions
            .iter()
            .zip(&self.readings)
            .map(|(&position, &reading)| Sample { position, reading })
    }

    pub fn samples(&self) -> Vec<Sample> {
        self.iter().collect()
    }

    /// Refit a line through every sample recorded so far
    pub fn fit(&self) -> Result<LinearModel, DegenerateModelError> {
        LinearModel::fit(&self.positions, &self.readings)
    }
}
