//! In-memory beamline with a linear detector response
//!
//! Stands in for the execution engine in tests and in the `walk_sim`
//! binary. Every call made by the walker is appended to a call log so the
//! ordering of moves, shots, checkpoints and aborts can be inspected.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use std::collections::HashSet;
use std::time::Duration;
use tracing::warn;

use crate::engine::{BeamlineEngine, DetectorReading};
use crate::metadata::RunMetadata;

/// One collaborator call, as seen by the simulated beamline
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    Move { actuator: String, position: f64 },
    TriggerRead { detector: String },
    SaveEvent,
    Annotate { plan_name: Option<String> },
    Checkpoint,
    Abort { reason: String },
}

/// Simulated mirror and detector pair.
///
/// The detector reports `slope * position + intercept` plus optional
/// Gaussian noise in the `centroid` field, and the summed intensity in
/// `sum`.
pub struct SimulatedBeamline {
    slope: f64,
    intercept: f64,
    position: f64,
    noise: Option<Normal<f64>>,
    rng: ChaCha8Rng,
    move_delay: Duration,
    read_delay: Duration,
    dropouts: HashSet<usize>,
    failing_moves: HashSet<usize>,
    shots: usize,
    moves: usize,
    calls: Vec<EngineCall>,
}

impl SimulatedBeamline {
    /// Noise-free beamline with the given linear response
    pub fn new(slope: f64, intercept: f64) -> Self {
        Self {
            slope,
            intercept,
            position: 0.0,
            noise: None,
            rng: ChaCha8Rng::seed_from_u64(0),
            move_delay: Duration::ZERO,
            read_delay: Duration::ZERO,
            dropouts: HashSet::new(),
            failing_moves: HashSet::new(),
            shots: 0,
            moves: 0,
            calls: Vec::new(),
        }
    }

    /// Add Gaussian centroid noise with standard deviation `std_dev`.
    ///
    /// An invalid deviation (negative or NaN) is logged and leaves the
    /// beamline noise-free.
    pub fn with_noise(mut self, std_dev: f64, seed: u64) -> Self {
        self.noise = match Normal::new(0.0, std_dev) {
            Ok(noise) => Some(noise),
            Err(e) => {
                warn!("Ignoring centroid noise std {}: {}", std_dev, e);
                None
            }
        };
        self.rng = ChaCha8Rng::seed_from_u64(seed);
        self
    }

    pub fn has_noise(&self) -> bool {
        self.noise.is_some()
    }

    /// Sleep for `delay` on every detector shot
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = delay;
        self
    }

    /// Sleep for `delay` on every move
    pub fn with_move_delay(mut self, delay: Duration) -> Self {
        self.move_delay = delay;
        self
    }

    /// Report no beam on the given shot indices (0-based, across the run)
    pub fn with_dropouts(mut self, shots: impl IntoIterator<Item = usize>) -> Self {
        self.dropouts.extend(shots);
        self
    }

    /// Fail the given move indices (0-based, across the run)
    pub fn with_failing_moves(mut self, moves: impl IntoIterator<Item = usize>) -> Self {
        self.failing_moves.extend(moves);
        self
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn calls(&self) -> &[EngineCall] {
        &self.calls
    }

    pub fn count(&self, predicate: impl Fn(&EngineCall) -> bool) -> usize {
        self.calls.iter().filter(|c| predicate(*c)).count()
    }

    /// Positions commanded so far, in order
    pub fn moves(&self) -> Vec<f64> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                EngineCall::Move { position, .. } => Some(*position),
                _ => None,
            })
            .collect()
    }

    fn centroid(&mut self) -> f64 {
        let ideal = self.slope * self.position + self.intercept;
        match &self.noise {
            Some(noise) => ideal + noise.sample(&mut self.rng),
            None => ideal,
        }
    }
}

impl BeamlineEngine for SimulatedBeamline {
    fn move_to(&mut self, actuator: &str, position: f64) -> Result<(), String> {
        self.calls.push(EngineCall::Move {
            actuator: actuator.to_string(),
            position,
        });
        let index = self.moves;
        self.moves += 1;
        if self.failing_moves.contains(&index) {
            return Err(format!("{actuator} stalled before reaching {position}"));
        }
        if !self.move_delay.is_zero() {
            std::thread::sleep(self.move_delay);
        }
        self.position = position;
        Ok(())
    }

    fn trigger_and_read(&mut self, detector: &str) -> Result<DetectorReading, String> {
        self.calls.push(EngineCall::TriggerRead {
            detector: detector.to_string(),
        });
        if !self.read_delay.is_zero() {
            std::thread::sleep(self.read_delay);
        }

        let shot = self.shots;
        self.shots += 1;
        if self.dropouts.contains(&shot) {
            return Ok(DetectorReading::new()
                .with_field("centroid", f64::NAN)
                .with_field("sum", 0.0));
        }

        Ok(DetectorReading::new()
            .with_field("centroid", self.centroid())
            .with_field("sum", 1.0e5))
    }

    fn save_event(&mut self) {
        self.calls.push(EngineCall::SaveEvent);
    }

    fn annotate(&mut self, metadata: &RunMetadata) {
        self.calls.push(EngineCall::Annotate {
            plan_name: metadata.plan_name().map(str::to_string),
        });
    }

    fn checkpoint(&mut self) {
        self.calls.push(EngineCall::Checkpoint);
    }

    fn abort(&mut self, reason: &str) {
        warn!("simulated beamline aborted: {}", reason);
        self.calls.push(EngineCall::Abort {
            reason: reason.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_linear_response() {
        let mut beamline = SimulatedBeamline::new(5.0, 2.0);

        beamline.move_to("m1", 10.0).unwrap();
        let reading = beamline.trigger_and_read("yag").unwrap();

        assert_relative_eq!(reading.get("centroid").unwrap(), 52.0);
        assert_relative_eq!(beamline.position(), 10.0);
    }

    #[test]
    fn test_noise_is_seeded() {
        let read = |seed| {
            let mut beamline = SimulatedBeamline::new(1.0, 0.0).with_noise(0.5, seed);
            (0..5)
                .map(|_| beamline.trigger_and_read("yag").unwrap().get("centroid").unwrap())
                .collect::<Vec<_>>()
        };

        assert_eq!(read(7), read(7));
        assert_ne!(read(7), read(8));
    }

    #[test]
    fn test_invalid_noise_stays_noise_free() {
        let mut beamline = SimulatedBeamline::new(2.0, 1.0).with_noise(-1.0, 3);

        assert!(!beamline.has_noise());
        beamline.move_to("m1", 4.0).unwrap();
        assert_relative_eq!(
            beamline.trigger_and_read("yag").unwrap().get("centroid").unwrap(),
            9.0
        );
    }

    #[test]
    fn test_dropout_reports_nan() {
        let mut beamline = SimulatedBeamline::new(1.0, 0.0).with_dropouts([1]);

        let first = beamline.trigger_and_read("yag").unwrap();
        let second = beamline.trigger_and_read("yag").unwrap();

        assert!(first.get("centroid").unwrap().is_finite());
        assert!(second.get("centroid").unwrap().is_nan());
    }

    #[test]
    fn test_failing_move_keeps_position() {
        let mut beamline = SimulatedBeamline::new(1.0, 0.0).with_failing_moves([1]);

        beamline.move_to("m1", 3.0).unwrap();
        assert!(beamline.move_to("m1", 8.0).is_err());
        assert_relative_eq!(beamline.position(), 3.0);
        assert_eq!(beamline.moves(), vec![3.0, 8.0]);
    }
}
