//! Beam Walk Simulator
//!
//! Runs the convergence walker against a simulated mirror/detector pair
//! with a linear response and optional Gaussian centroid noise. Useful for
//! checking walk settings before using them on hardware.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};
use walker::metadata::parse_overlay_entry;
use walker::{walk_to_target, MetadataOverlay, RunRecord, SimulatedBeamline, WalkConfig};

/// Beam Walk Simulator
///
/// Steps a simulated actuator until the simulated detector centroid reaches
/// the target pixel.
#[derive(Parser, Debug)]
#[command(name = "walk_sim")]
#[command(
    about = "Walk a simulated beam onto a target pixel",
    long_about = "Runs the linear-regression beam walker against a simulated beamline.\n\n\
        The simulated detector reports centroid = slope * position + intercept,\n\
        optionally with Gaussian noise. The walker:\n  \
        1. Moves to the start position and measures\n  \
        2. Takes a blind first step and measures again\n  \
        3. Fits a line through every visited point\n  \
        4. Moves to where the line reaches the target\n  \
        5. Repeats until within tolerance or the timeout expires"
)]
struct Args {
    /// Simulated response in pixels per actuator unit
    #[arg(long, default_value_t = 5.0, allow_negative_numbers = true)]
    slope: f64,

    /// Simulated centroid at actuator position zero
    #[arg(long, default_value_t = 2.0, allow_negative_numbers = true)]
    intercept: f64,

    /// Standard deviation of centroid noise in pixels
    #[arg(long, default_value_t = 0.0)]
    noise_std: f64,

    /// Seed for the noise generator
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Simulated detector readout time in milliseconds
    #[arg(long, default_value_t = 0)]
    read_delay_ms: u64,

    /// Target centroid in pixels
    #[arg(long, allow_negative_numbers = true)]
    target: f64,

    /// Starting actuator position
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    start: f64,

    /// Detector name
    #[arg(long, default_value = "sim_yag")]
    detector: String,

    /// Actuator name
    #[arg(long, default_value = "sim_mirror")]
    motor: String,

    #[arg(
        long = "metadata",
        value_parser = parse_overlay_entry,
        help = "Extra run metadata as key=value (repeatable)",
        long_help = "Extra run metadata merged over the base record. Values that parse as \
            JSON keep their type, anything else is stored as a string. Base keys \
            (detectors, motors, target, first_step, tolerance, plan_name) may be \
            overridden only with a value of the same type."
    )]
    metadata: Vec<(String, serde_json::Value)>,

    #[arg(
        long,
        help = "Load walk settings from a JSON file instead of the flags below",
        long_help = "Load walk settings from a JSON file. Missing keys take their default \
            values. When given, the walk flags on the command line are ignored."
    )]
    config: Option<PathBuf>,

    #[arg(
        long,
        help = "Write the run record to a JSON file",
        long_help = "If provided, writes the run record (metadata, status, every visited \
            position and reading, final fit) to a JSON file for offline analysis."
    )]
    output_json: Option<PathBuf>,

    /// Walk parameters (step, tolerance, averaging, timeout, limits)
    #[command(flatten)]
    walk: WalkConfig,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => WalkConfig::load(path)
            .with_context(|| format!("Failed to load walk config from {path:?}"))?,
        None => args.walk.clone(),
    };

    info!("Beam Walk Simulator");
    info!("===================");
    info!("Response:     {:.4} px/unit + {:.2} px", args.slope, args.intercept);
    info!("Noise:        {:.3} px (seed {})", args.noise_std, args.seed);
    info!("Target:       {:.3} px", args.target);
    info!("Start:        {:.6}", args.start);
    info!("First step:   {:.6}", config.first_step);
    info!("Tolerance:    {:.3} px", config.tolerance);
    info!("Average:      {}", config.average.unwrap_or(1));
    if let Some(timeout) = config.timeout() {
        info!("Timeout:      {:.1} s", timeout.as_secs_f64());
    }
    if let Some(ref path) = args.output_json {
        info!("Output JSON:  {:?}", path);
    }

    let mut beamline = SimulatedBeamline::new(args.slope, args.intercept)
        .with_read_delay(Duration::from_millis(args.read_delay_ms));
    if args.noise_std != 0.0 {
        beamline = beamline.with_noise(args.noise_std, args.seed);
    }

    let overlay: MetadataOverlay = args.metadata.iter().cloned().collect();
    let overlay = (!overlay.is_empty()).then_some(overlay);

    let outcome = match walk_to_target(
        &mut beamline,
        &args.detector,
        &args.motor,
        args.target,
        args.start,
        &config,
        overlay.as_ref(),
    ) {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("Walk failed: {}", e);
            return Err(e.into());
        }
    };

    info!("Status:       {}", outcome.status);
    info!("Steps:        {}", outcome.steps);
    info!("Final:        {:.4} px", outcome.reading);
    if let Some(position) = outcome.position() {
        info!("Position:     {:.6}", position);
    }
    if let Some(model) = &outcome.model {
        info!(
            "Fit:          {:.4} px/unit + {:.2} px (r² = {:.5})",
            model.slope,
            model.intercept,
            model.r_squared()
        );
    }

    if let Some(path) = &args.output_json {
        RunRecord::from_outcome(&outcome)
            .save(path)
            .with_context(|| format!("Failed to write run record to {path:?}"))?;
        info!("Run record written to {:?}", path);
    }

    outcome.into_result()?;
    Ok(())
}
