//! Execution collaborator interface
//!
//! The walker never talks to hardware directly. Every move, trigger and
//! read goes through a [`BeamlineEngine`], which blocks until the operation
//! completes. Implementations own retry policy, rollback and safe-state
//! handling; the walker only requests checkpoints and aborts.

use std::collections::BTreeMap;

use crate::metadata::RunMetadata;

/// Named scalar fields produced by one detector trigger/read cycle.
///
/// Detectors typically report several values (centroid, intensity, width);
/// the walker picks out one of them and ignores the rest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectorReading {
    fields: BTreeMap<String, f64>,
}

impl DetectorReading {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert of a field value
    pub fn with_field(mut self, name: impl Into<String>, value: f64) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.fields.insert(name.into(), value);
    }

    /// Raw field value, which may be NaN when the detector saw no signal
    pub fn get(&self, name: &str) -> Option<f64> {
        self.fields.get(name).copied()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, f64)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// Synchronous actuation and measurement collaborator.
///
/// Errors are returned as strings in the same way as the hardware
/// interfaces; the walker wraps them with position and sample context.
pub trait BeamlineEngine {
    /// Move `actuator` to `position`, returning once it reports arrival.
    fn move_to(&mut self, actuator: &str, position: f64) -> Result<(), String>;

    /// Trigger `detector`, wait for the acquisition and return its fields.
    fn trigger_and_read(&mut self, detector: &str) -> Result<DetectorReading, String>;

    /// Close the current measurement event.
    fn save_event(&mut self) {}

    /// Attach provenance metadata to the operation that follows.
    fn annotate(&mut self, _metadata: &RunMetadata) {}

    /// Mark a known-good point that an outer layer may roll back to.
    fn checkpoint(&mut self);

    /// Halt the run and let the collaborator restore a safe state.
    fn abort(&mut self, reason: &str);
}
