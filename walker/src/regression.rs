//! Ordinary least squares line fit of reading against position

use serde::{Deserialize, Serialize};

use crate::error::DegenerateModelError;

/// Line fitted through every visited (position, reading) pair.
///
/// `reading = slope * position + intercept`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub slope: f64,
    pub intercept: f64,
    /// Pearson correlation coefficient of the fit, in [-1, 1].
    /// Zero when the readings carry no variance.
    pub r_value: f64,
}

impl LinearModel {
    /// Fit a line to paired samples.
    ///
    /// # Errors
    /// * `InsufficientSamples` - fewer than two pairs or mismatched lengths
    /// * `ZeroPositionVariance` - the positions are numerically
    ///   indistinguishable: their spread is within a few ulps of their
    ///   magnitude, so any slope would be dominated by rounding
    pub fn fit(positions: &[f64], readings: &[f64]) -> Result<Self, DegenerateModelError> {
        if positions.len() != readings.len() || positions.len() < 2 {
            return Err(DegenerateModelError::InsufficientSamples {
                positions: positions.len(),
                readings: readings.len(),
            });
        }

        let n = positions.len() as f64;
        let mean_x = positions.iter().sum::<f64>() / n;
        let mean_y = readings.iter().sum::<f64>() / n;

        // Positions are normalised by their magnitude so the variance test is
        // relative and the sums stay finite for very large coordinates
        let scale = positions.iter().fold(0.0_f64, |acc, x| acc.max(x.abs()));
        let degenerate = DegenerateModelError::ZeroPositionVariance {
            samples: positions.len(),
            position: positions[0],
        };
        if scale == 0.0 || !scale.is_finite() {
            return Err(degenerate);
        }

        let mut sxx = 0.0;
        let mut sxy = 0.0;
        let mut syy = 0.0;
        for (&x, &y) in positions.iter().zip(readings) {
            let dx = (x - mean_x) / scale;
            let dy = y - mean_y;
            sxx += dx * dx;
            sxy += dx * dy;
            syy += dy * dy;
        }

        // A spread within a few ulps of the positions is rounding, not motion
        let resolution = 4.0 * f64::EPSILON;
        if sxx <= resolution * resolution * n {
            return Err(degenerate);
        }

        let slope = sxy / sxx / scale;
        let intercept = mean_y - slope * mean_x;
        let r_value = if syy > 0.0 {
            (sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0)
        } else {
            0.0
        };

        Ok(Self {
            slope,
            intercept,
            r_value,
        })
    }

    /// Reading predicted at `position`
    pub fn eval(&self, position: f64) -> f64 {
        self.slope * position + self.intercept
    }

    /// Position at which the line reaches `target`.
    ///
    /// # Errors
    /// * `FlatResponse` - `|slope| <= min_slope`
    /// * `NonFinitePrediction` - inversion overflowed
    pub fn position_for(&self, target: f64, min_slope: f64) -> Result<f64, DegenerateModelError> {
        if self.slope.is_nan() || self.slope.abs() <= min_slope {
            return Err(DegenerateModelError::FlatResponse {
                slope: self.slope,
                min_slope,
            });
        }

        let position = (target - self.intercept) / self.slope;
        if !position.is_finite() {
            return Err(DegenerateModelError::NonFinitePrediction {
                slope: self.slope,
                intercept: self.intercept,
            });
        }
        Ok(position)
    }

    /// Coefficient of determination
    pub fn r_squared(&self) -> f64 {
        self.r_value * self.r_value
    }
}
