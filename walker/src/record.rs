//! Persistent record of a finished walk
//!
//! Captures everything an offline consumer needs to refit or plot a run:
//! the merged metadata, how the walk ended and every visited sample.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use thiserror::Error;

use crate::history::Sample;
use crate::metadata::RunMetadata;
use crate::regression::LinearModel;
use crate::walk::{WalkOutcome, WalkStatus};

/// Error during record save/load
#[derive(Error, Debug)]
pub enum RunRecordError {
    /// IO error during save/load
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub metadata: RunMetadata,
    pub status: WalkStatus,
    pub target: f64,
    pub final_reading: f64,
    pub samples: Vec<Sample>,
    pub steps: usize,
    #[serde(default)]
    pub model: Option<LinearModel>,
    pub elapsed_s: f64,
    /// Record creation time (ISO 8601)
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl RunRecord {
    pub fn from_outcome(outcome: &WalkOutcome) -> Self {
        Self {
            metadata: outcome.metadata.clone(),
            status: outcome.status,
            target: outcome.target,
            final_reading: outcome.reading,
            samples: outcome.history.samples(),
            steps: outcome.steps,
            model: outcome.model,
            elapsed_s: outcome.elapsed.as_secs_f64(),
            timestamp: Some(chrono::Utc::now().to_rfc3339()),
        }
    }

    /// Distance from target of the final reading
    pub fn residual(&self) -> f64 {
        self.final_reading - self.target
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, RunRecordError> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), RunRecordError> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }
}
