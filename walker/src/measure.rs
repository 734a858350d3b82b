//! Averaged detector measurement

use tracing::debug;

use crate::engine::BeamlineEngine;
use crate::error::MeasurementError;
use crate::metadata::MeasureMetadata;

/// Measure the beam centroid, averaged over `average` shots.
///
/// Each shot is one trigger/read cycle followed by a saved event, so the
/// collaborator sees exactly `average` events per call. `None` means a
/// single shot. Any failed shot fails the whole measurement; there is no
/// partial averaging.
///
/// # Arguments
/// * `engine` - Collaborator that triggers and reads the detector
/// * `detector` - Detector name
/// * `field` - Reading field to average (usually `"centroid"`)
/// * `average` - Number of shots, defaults to 1
pub fn measure_centroid<E: BeamlineEngine + ?Sized>(
    engine: &mut E,
    detector: &str,
    field: &str,
    average: Option<usize>,
) -> Result<f64, MeasurementError> {
    let nshots = average.unwrap_or(1);
    if nshots == 0 {
        return Err(MeasurementError::InvalidAverage(nshots));
    }

    engine.annotate(&MeasureMetadata::new(detector, nshots).into_run_metadata());

    let mut centers = vec![0.0; nshots];
    for (cycle, center) in centers.iter_mut().enumerate() {
        let reading =
            engine
                .trigger_and_read(detector)
                .map_err(|message| MeasurementError::Detector {
                    detector: detector.to_string(),
                    cycle,
                    message,
                })?;

        let value = reading
            .get(field)
            .ok_or_else(|| MeasurementError::MissingField {
                detector: detector.to_string(),
                field: field.to_string(),
            })?;

        if !value.is_finite() {
            return Err(MeasurementError::NoSignal {
                detector: detector.to_string(),
                field: field.to_string(),
                cycle,
            });
        }

        *center = value;
        engine.save_event();
        debug!("{}: shot {}/{} {} = {:.4}", detector, cycle + 1, nshots, field, value);
    }

    Ok(centers.iter().sum::<f64>() / nshots as f64)
}
