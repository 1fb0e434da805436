//! Session host: connect, calibrate, count down, run laps.
//!
//! Connection-level failures from any stage end the session; the host then
//! reconnects and starts over (calibration included) a bounded number of
//! times before giving up.

use crate::calibration::{CalibrationEngine, CalibrationResult};
use crate::clock::Clock;
use crate::config::ParikramaConfig;
use crate::error::Result;
use crate::indicator;
use crate::lap::{CancellationToken, LapController, LapSummary};
use crate::path::PathExecutor;
use crate::robot::{Connection, RobotCommander, create_device};

/// Opens robot sessions
pub trait Connector {
    fn connect(&mut self) -> Result<Connection>;
}

/// Connector backed by the configured device factory
pub struct DeviceConnector {
    config: ParikramaConfig,
}

impl DeviceConnector {
    pub fn new(config: ParikramaConfig) -> Self {
        Self { config }
    }
}

impl Connector for DeviceConnector {
    fn connect(&mut self) -> Result<Connection> {
        log::info!("Connecting to {}...", self.config.device.name);
        create_device(&self.config)
    }
}

/// One session on an open connection.
///
/// A stop request seen before calibration or before the countdown ends the
/// session at once with the robot stopped and no laps driven.
pub fn run_once(
    config: &ParikramaConfig,
    connection: Connection,
    cancel: &CancellationToken,
) -> Result<LapSummary> {
    let Connection { mut robot, clock } = connection;
    let started = clock.now();
    let stopped_early = |robot: &mut Box<dyn RobotCommander>| -> Result<LapSummary> {
        log::info!("Stop requested before the first lap");
        robot.stop()?;
        Ok(LapSummary {
            laps_completed: 0,
            elapsed_secs: clock.now().saturating_sub(started).as_secs_f32(),
            interrupted: false,
        })
    };

    log::info!("Connected");
    indicator::show_battery(&mut robot);
    if cancel.is_cancelled() {
        return stopped_early(&mut robot);
    }

    let calibration = if config.calibration.enabled {
        CalibrationEngine::new(config.calibration.clone(), &config.motion, clock.clone())
            .calibrate(&mut robot)?
    } else {
        log::info!("Calibration disabled");
        CalibrationResult::uncalibrated(&config.motion)
    };
    log::info!(
        "Heading offset {:.1}°, speed coefficient {:.2} m/s at {}",
        calibration.heading_offset_deg,
        calibration.speed_coefficient,
        config.motion.reference_speed
    );

    if cancel.is_cancelled() {
        return stopped_early(&mut robot);
    }
    indicator::countdown(&mut robot, clock.as_ref(), config.indicator.countdown_secs);

    let executor = PathExecutor::new(config, calibration, clock.clone());
    LapController::new(executor, config.indicator.battery_check_every, clock)
        .run_forever(&mut robot, &config.track, cancel)
}

/// Run sessions until one ends cleanly, retrying connection failures.
///
/// `pause_clock` times the pause between attempts. Errors other than
/// connection failures are returned at once.
pub fn run_session(
    config: &ParikramaConfig,
    connector: &mut dyn Connector,
    cancel: &CancellationToken,
    pause_clock: &dyn Clock,
) -> Result<LapSummary> {
    let attempts = config.connection.attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        let result = connector
            .connect()
            .and_then(|connection| run_once(config, connection, cancel));

        match result {
            Ok(summary) => return Ok(summary),
            Err(e) if e.is_connection() && attempt < attempts && !cancel.is_cancelled() => {
                log::warn!(
                    "Session failed ({}), retrying in {:.1} s ({}/{})",
                    e,
                    config.connection.retry_delay_secs,
                    attempt,
                    attempts
                );
                pause_clock.sleep_secs(config.connection.retry_delay_secs);
            }
            Err(e) => {
                if e.is_connection() {
                    log::error!("Giving up after {} attempts: {}", attempt, e);
                }
                return Err(e);
            }
        }
    }
}
