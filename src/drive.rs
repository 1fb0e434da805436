//! Distance-bounded forward drive for a single leg.
//!
//! With a working locator the leg is closed-loop: drive until the measured
//! displacement reaches the target, bounded by a timeout derived from the
//! speed model. Without one it falls back to driving for the model-estimated
//! duration. Either way the leg ends with a stop and a settle pause.

use crate::calibration::reset_origin;
use crate::clock::SharedClock;
use crate::config::DriveConfig;
use crate::error::Result;
use crate::motion::MotionModel;
use crate::robot::{Position, RobotCommander, halt};
use crate::utils::command_heading;
use std::time::Duration;

/// How a leg ended
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DriveOutcome {
    /// Locator reported the target distance
    Reached { travelled_m: f32, elapsed_secs: f32 },
    /// Target not reached within `timeout_factor` x the estimated duration
    TimedOut { travelled_m: f32, elapsed_secs: f32 },
    /// Locator stopped answering mid-leg
    FeedbackLost { travelled_m: f32, elapsed_secs: f32 },
    /// No locator: drove for the estimated duration
    OpenLoop { duration_secs: f32 },
    /// Nothing to drive (zero distance or zero speed)
    NoMotion,
}

impl DriveOutcome {
    pub fn is_closed_loop(&self) -> bool {
        matches!(
            self,
            DriveOutcome::Reached { .. }
                | DriveOutcome::TimedOut { .. }
                | DriveOutcome::FeedbackLost { .. }
        )
    }
}

/// Drives single legs by distance
pub struct DistanceDriver {
    model: MotionModel,
    heading_offset_deg: f32,
    config: DriveConfig,
    settle_secs: f32,
    clock: SharedClock,
}

impl DistanceDriver {
    pub fn new(
        model: MotionModel,
        heading_offset_deg: f32,
        config: DriveConfig,
        settle_secs: f32,
        clock: SharedClock,
    ) -> Self {
        Self {
            model,
            heading_offset_deg,
            config,
            settle_secs,
            clock,
        }
    }

    pub fn model(&self) -> &MotionModel {
        &self.model
    }

    pub fn heading_offset_deg(&self) -> f32 {
        self.heading_offset_deg
    }

    /// Physical heading sent for a logical track heading
    pub fn command_heading(&self, logical_heading_deg: f32) -> u16 {
        command_heading(logical_heading_deg + self.heading_offset_deg)
    }

    /// Upper bound on a closed-loop leg
    pub fn timeout(&self, distance_m: f32, speed: u8) -> Duration {
        let secs = self.model.duration(distance_m, f32::from(speed)) * self.config.timeout_factor;
        Duration::try_from_secs_f32(secs).unwrap_or(Duration::MAX)
    }

    /// Drive `distance_m` along `logical_heading_deg` at `speed`.
    ///
    /// Returns with the robot stopped. An `Err` means a command could not be
    /// delivered; a best-effort stop has been attempted.
    pub fn drive_distance<R: RobotCommander + ?Sized>(
        &self,
        robot: &mut R,
        logical_heading_deg: f32,
        distance_m: f32,
        speed: u8,
    ) -> Result<DriveOutcome> {
        let heading = self.command_heading(logical_heading_deg);

        if !(distance_m > 0.0) || speed == 0 {
            robot.set_heading(heading)?;
            return Ok(DriveOutcome::NoMotion);
        }

        let driven = match closed_loop_start(robot) {
            Some(start) => self.drive_closed_loop(robot, heading, distance_m, speed, start),
            None => self.drive_open_loop(robot, heading, distance_m, speed),
        };

        match driven {
            Ok(outcome) => {
                self.clock.sleep_secs(self.settle_secs);
                Ok(outcome)
            }
            Err(e) => {
                halt(robot);
                Err(e)
            }
        }
    }

    fn drive_closed_loop<R: RobotCommander + ?Sized>(
        &self,
        robot: &mut R,
        heading: u16,
        distance_m: f32,
        speed: u8,
        start: Position,
    ) -> Result<DriveOutcome> {
        let timeout = self.timeout(distance_m, speed);
        let poll = Duration::from_millis(self.config.poll_interval_ms);

        robot.set_heading(heading)?;
        robot.set_speed(speed)?;
        let started = self.clock.now();
        let mut travelled_m = 0.0;

        let outcome = loop {
            let elapsed = self.clock.now().saturating_sub(started);
            let elapsed_secs = elapsed.as_secs_f32();

            let position = robot
                .position_feedback()
                .map(|feedback| feedback.get_position());
            match position {
                Some(Ok(position)) => travelled_m = start.distance_m(&position),
                Some(Err(e)) => {
                    log::warn!("Locator lost mid-leg after {:.2} m: {}", travelled_m, e);
                    break DriveOutcome::FeedbackLost {
                        travelled_m,
                        elapsed_secs,
                    };
                }
                None => {
                    log::warn!("Locator disappeared mid-leg after {:.2} m", travelled_m);
                    break DriveOutcome::FeedbackLost {
                        travelled_m,
                        elapsed_secs,
                    };
                }
            }

            if travelled_m >= distance_m {
                break DriveOutcome::Reached {
                    travelled_m,
                    elapsed_secs,
                };
            }
            if elapsed >= timeout {
                log::warn!(
                    "Leg timed out after {:.2} s at {:.2}/{:.2} m",
                    elapsed_secs,
                    travelled_m,
                    distance_m
                );
                break DriveOutcome::TimedOut {
                    travelled_m,
                    elapsed_secs,
                };
            }

            log::trace!("Leg progress {:.3}/{:.3} m", travelled_m, distance_m);
            self.clock.sleep(poll);
        };

        robot.stop()?;
        Ok(outcome)
    }

    fn drive_open_loop<R: RobotCommander + ?Sized>(
        &self,
        robot: &mut R,
        heading: u16,
        distance_m: f32,
        speed: u8,
    ) -> Result<DriveOutcome> {
        let duration_secs = self.model.duration(distance_m, f32::from(speed));
        log::debug!(
            "Open-loop leg: {:.2} m for {:.2} s at speed {}",
            distance_m,
            duration_secs,
            speed
        );
        robot.set_heading(heading)?;
        robot.set_speed(speed)?;
        self.clock.sleep_secs(duration_secs);
        robot.stop()?;
        Ok(DriveOutcome::OpenLoop { duration_secs })
    }
}

/// Zero the locator and take the start reading, if feedback works right now.
fn closed_loop_start<R: RobotCommander + ?Sized>(robot: &mut R) -> Option<Position> {
    reset_origin(robot)?;
    match robot.position_feedback()?.get_position() {
        Ok(position) => Some(position),
        Err(e) => {
            log::debug!("Locator unreadable at leg start, driving open-loop: {}", e);
            None
        }
    }
}
