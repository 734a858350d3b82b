//! Run provenance metadata
//!
//! A typed base record is flattened to JSON and an optional free-form
//! overlay is merged on top of it. Overlay values win, but a key that the
//! base record defines must keep its JSON type.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::error::WalkError;

/// Plan name recorded for every averaged measurement
pub const MEASURE_PLAN_NAME: &str = "measure_centroid";

/// Plan name recorded for every walk
pub const WALK_PLAN_NAME: &str = "walk_to_pixel";

/// Free-form overlay supplied by the caller
pub type MetadataOverlay = BTreeMap<String, Value>;

/// Merged metadata handed to the collaborator and stored with a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunMetadata(Map<String, Value>);

impl RunMetadata {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn plan_name(&self) -> Option<&str> {
        self.0.get("plan_name").and_then(Value::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Merge `overlay` over `base`, overlay wins.
    ///
    /// Overriding a base key with a value of a different JSON type (for
    /// example a string `target`) is rejected. Keys absent from the base are
    /// accepted as-is.
    pub fn merge(
        base: Map<String, Value>,
        overlay: Option<&MetadataOverlay>,
    ) -> Result<Self, WalkError> {
        let mut merged = base;
        for (key, value) in overlay.into_iter().flatten() {
            if let Some(existing) = merged.get(key) {
                if !same_kind(existing, value) {
                    return Err(WalkError::InvalidMetadata(format!(
                        "overlay key {key:?} changes type from {} to {}",
                        kind_name(existing),
                        kind_name(value)
                    )));
                }
            }
            merged.insert(key.clone(), value.clone());
        }
        Ok(Self(merged))
    }
}

/// Base metadata for a single measurement call
#[derive(Debug, Clone, Serialize)]
pub struct MeasureMetadata<'a> {
    pub detectors: [&'a str; 1],
    pub nshots: usize,
    pub plan_name: &'static str,
}

impl<'a> MeasureMetadata<'a> {
    pub fn new(detector: &'a str, nshots: usize) -> Self {
        Self {
            detectors: [detector],
            nshots,
            plan_name: MEASURE_PLAN_NAME,
        }
    }

    pub fn into_run_metadata(self) -> RunMetadata {
        RunMetadata(to_object(&self))
    }
}

/// Base metadata for a walk
#[derive(Debug, Clone, Serialize)]
pub struct WalkMetadata {
    pub detectors: Vec<String>,
    pub motors: Vec<String>,
    pub target: f64,
    pub first_step: f64,
    pub tolerance: f64,
    pub plan_name: &'static str,
}

impl WalkMetadata {
    pub fn new(detector: &str, motor: &str, target: f64, first_step: f64, tolerance: f64) -> Self {
        Self {
            detectors: vec![detector.to_string()],
            motors: vec![motor.to_string()],
            target,
            first_step,
            tolerance,
            plan_name: WALK_PLAN_NAME,
        }
    }

    /// Validate `overlay` against this record and produce the merged metadata
    pub fn merge(&self, overlay: Option<&MetadataOverlay>) -> Result<RunMetadata, WalkError> {
        RunMetadata::merge(to_object(self), overlay)
    }
}

fn to_object<T: Serialize>(value: &T) -> Map<String, Value> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

fn same_kind(a: &Value, b: &Value) -> bool {
    std::mem::discriminant(a) == std::mem::discriminant(b)
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Parse a `key=value` overlay entry. Values that parse as JSON keep their
/// JSON type, anything else becomes a string.
pub fn parse_overlay_entry(entry: &str) -> Result<(String, Value), String> {
    let (key, raw) = entry
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {entry:?}"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty metadata key in {entry:?}"));
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}
