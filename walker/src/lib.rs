//! Automated single-axis beam alignment
//!
//! Steps one actuator (a mirror pitch, a motor) until a detector reading such
//! as a beam centroid reaches a target within tolerance. The response of the
//! detector to the actuator is learned online: every visited position is
//! kept, a line is refit through all of them, and the line is inverted to
//! choose the next position.
//!
//! Hardware access is delegated to a [`BeamlineEngine`]; [`SimulatedBeamline`]
//! provides an in-memory one for tests and dry runs.

pub mod config;
pub mod engine;
pub mod error;
pub mod history;
pub mod measure;
pub mod metadata;
pub mod record;
pub mod regression;
pub mod sim;
pub mod walk;

pub use config::{BoundPolicy, WalkConfig};
pub use engine::{BeamlineEngine, DetectorReading};
pub use error::{DegenerateModelError, MeasurementError, WalkError};
pub use history::{History, Sample};
pub use measure::measure_centroid;
pub use metadata::{MetadataOverlay, RunMetadata, WalkMetadata};
pub use record::{RunRecord, RunRecordError};
pub use regression::LinearModel;
pub use sim::{EngineCall, SimulatedBeamline};
pub use walk::{walk_to_target, WalkOutcome, WalkStatus};
