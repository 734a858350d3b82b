//! End-to-end walks against the simulated beamline

use approx::assert_relative_eq;
use std::time::Duration;
use walker::{
    measure_centroid, walk_to_target, BeamlineEngine, BoundPolicy, EngineCall, RunRecord,
    SimulatedBeamline, WalkConfig, WalkError, WalkStatus,
};

fn shots(beamline: &SimulatedBeamline) -> usize {
    beamline.count(|c| matches!(c, EngineCall::TriggerRead { .. }))
}

#[test]
fn test_reference_scenario() {
    let mut beamline = SimulatedBeamline::new(5.0, 2.0);
    let config = WalkConfig::default()
        .with_first_step(1.0)
        .with_tolerance(1e-3);

    let outcome = walk_to_target(&mut beamline, "yag", "m1", 52.0, 0.0, &config, None).unwrap();

    assert_eq!(outcome.status, WalkStatus::Converged);
    assert!((outcome.reading - 52.0).abs() <= 1e-3);
    assert_relative_eq!(outcome.position().unwrap(), 10.0, epsilon = 1e-9);
    assert!(outcome.steps <= 3, "took {} steps", outcome.steps);
}

#[test]
fn test_history_grows_by_one_per_step() {
    for (slope, intercept, target) in [(5.0, 2.0, 52.0), (-0.3, 480.0, 200.0), (120.0, -40.0, 1.0)] {
        let mut beamline = SimulatedBeamline::new(slope, intercept);
        let config = WalkConfig::default()
            .with_first_step(0.25)
            .with_tolerance(1e-6);

        let outcome =
            walk_to_target(&mut beamline, "yag", "m1", target, 0.0, &config, None).unwrap();

        assert!(outcome.is_converged());
        assert_eq!(outcome.history.len(), outcome.steps + 1);
        // Every commanded position shows up in the history in the same order
        assert_eq!(beamline.moves(), outcome.history.positions());
        assert_eq!(shots(&beamline), outcome.history.len());
    }
}

#[test]
fn test_noisy_walk_converges_with_averaging() {
    let mut beamline = SimulatedBeamline::new(40.0, 150.0).with_noise(2.0, 11);
    let config = WalkConfig::default()
        .with_first_step(0.5)
        .with_tolerance(5.0)
        .with_average(8)
        .with_timeout(Duration::from_secs(10));

    let outcome = walk_to_target(&mut beamline, "yag", "m1", 512.0, 0.0, &config, None).unwrap();

    assert_eq!(outcome.status, WalkStatus::Converged);
    assert!((outcome.reading - 512.0).abs() <= 5.0);
    assert_eq!(shots(&beamline), 8 * outcome.history.len());
    assert_eq!(
        beamline.count(|c| *c == EngineCall::SaveEvent),
        8 * outcome.history.len()
    );

    let model = outcome.model.unwrap();
    assert_relative_eq!(model.slope, 40.0, max_relative = 0.1);
}

#[test]
fn test_measure_counts_events() {
    let mut beamline = SimulatedBeamline::new(2.0, 10.0);
    beamline.move_to("m1", 3.0).unwrap();

    let mean = measure_centroid(&mut beamline, "yag", "centroid", Some(6)).unwrap();

    assert_relative_eq!(mean, 16.0);
    assert_eq!(shots(&beamline), 6);
    assert_eq!(beamline.count(|c| *c == EngineCall::SaveEvent), 6);
}

#[test]
fn test_slow_actuator_times_out() {
    let mut beamline =
        SimulatedBeamline::new(5.0, 2.0).with_move_delay(Duration::from_millis(40));
    let config = WalkConfig::default()
        .with_first_step(1.0)
        .with_tolerance(1e-3)
        .with_timeout(Duration::from_millis(5));

    let outcome = walk_to_target(&mut beamline, "yag", "m1", 52.0, 0.0, &config, None).unwrap();

    assert_eq!(outcome.status, WalkStatus::TimedOut);
    assert_eq!(beamline.count(|c| matches!(c, EngineCall::Abort { .. })), 1);
    // No motion after the abort
    assert!(matches!(
        beamline.calls().last(),
        Some(EngineCall::Abort { .. })
    ));
    assert!(outcome.elapsed > Duration::from_millis(5));

    let record = RunRecord::from_outcome(&outcome);
    assert_eq!(record.status, WalkStatus::TimedOut);
    assert!(matches!(
        outcome.into_result(),
        Err(WalkError::Timeout { .. })
    ));
}

#[test]
fn test_walk_through_trait_object() {
    let mut beamline = SimulatedBeamline::new(5.0, 2.0);
    let engine: &mut dyn BeamlineEngine = &mut beamline;
    let config = WalkConfig::default()
        .with_first_step(1.0)
        .with_tolerance(1e-3)
        .with_limits(-20.0, 20.0, BoundPolicy::Reject);

    let outcome = walk_to_target(engine, "yag", "m1", 52.0, 0.0, &config, None).unwrap();

    assert!(outcome.is_converged());
}

#[test]
fn test_record_written_for_offline_use() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("walk.json");
    let mut beamline = SimulatedBeamline::new(5.0, 2.0);
    let config = WalkConfig::default()
        .with_first_step(1.0)
        .with_tolerance(1e-3);

    let outcome = walk_to_target(&mut beamline, "yag", "m1", 52.0, 0.0, &config, None).unwrap();
    RunRecord::from_outcome(&outcome).save(&path).unwrap();
    let record = RunRecord::load(&path).unwrap();

    let positions: Vec<f64> = record.samples.iter().map(|s| s.position).collect();
    assert_eq!(positions, outcome.history.positions());
    assert_eq!(record.steps, outcome.steps);
    assert_relative_eq!(record.final_reading, outcome.reading);
}
