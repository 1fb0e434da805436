//! Parikrama - lap runner CLI
//!
//! Usage:
//!   parikrama                         # built-in track on the simulated robot
//!   parikrama parikrama.toml          # track and tuning from a config file
//!   parikrama --segments              # distance/turn track
//!   parikrama --fast                  # simulated robot in virtual time
//!
//! Exit codes: 0 after Ctrl-C, 1 on configuration errors, 2 when the robot
//! session could not be kept up.

use clap::Parser;
use parikrama::clock::SystemClock;
use parikrama::config::default_segment_track;
use parikrama::session::{DeviceConnector, run_session};
use parikrama::{CancellationToken, Error, ParikramaConfig, Result};
use std::path::PathBuf;

/// Self-calibrating lap runner
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (TOML); built-in defaults when omitted
    config: Option<PathBuf>,

    /// Robot name to connect to (the simulated robot only logs it)
    #[arg(short, long)]
    robot: Option<String>,

    /// Skip the calibration pulse and use the configured offset/coefficient
    #[arg(long)]
    no_calibrate: bool,

    /// Drive the built-in track as distance/turn segments
    #[arg(long)]
    segments: bool,

    /// Run the simulated robot in virtual time instead of wall-clock time
    #[arg(long)]
    fast: bool,
}

/// Configuration from the optional file plus command-line overrides
fn load_config(args: Args) -> Result<ParikramaConfig> {
    let mut config = match &args.config {
        Some(path) => {
            log::info!("Using config: {}", path.display());
            ParikramaConfig::load(path)?
        }
        None => ParikramaConfig::default(),
    };
    if let Some(name) = args.robot {
        config.device.name = name;
    }
    if args.no_calibrate {
        config.calibration.enabled = false;
    }
    if args.segments {
        config.track = default_segment_track();
    }
    // Unpaced, an endless lap run on the simulator never yields the CPU
    config.sim.realtime = !args.fast;
    Ok(config)
}

fn run(args: Args) -> Result<()> {
    let config = load_config(args)?;
    log::info!(
        "Device: {} ({}), {} legs per lap",
        config.device.name,
        config.device.device_type,
        config.track.leg_count()
    );

    let cancel = CancellationToken::new();
    cancel
        .cancel_on_ctrl_c()
        .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    let mut connector = DeviceConnector::new(config.clone());
    let summary = run_session(&config, &mut connector, &cancel, &SystemClock::new())?;
    log::info!(
        "Done: {} laps in {:.1} s",
        summary.laps_completed,
        summary.elapsed_secs
    );
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if let Err(e) = run(args) {
        log::error!("{}", e);
        std::process::exit(if e.is_connection() { 2 } else { 1 });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulator_paced_unless_fast() {
        let config = load_config(Args::parse_from(["parikrama"])).unwrap();
        assert!(config.sim.realtime);

        let config = load_config(Args::parse_from(["parikrama", "--fast"])).unwrap();
        assert!(!config.sim.realtime);
    }

    #[test]
    fn test_overrides_apply() {
        let config = load_config(Args::parse_from([
            "parikrama",
            "--robot",
            "SB-0001",
            "--no-calibrate",
            "--segments",
        ]))
        .unwrap();
        assert_eq!(config.device.name, "SB-0001");
        assert!(!config.calibration.enabled);
        assert!(matches!(config.track, parikrama::PathDescription::Segments { .. }));
    }
}
