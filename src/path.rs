//! Path description and per-lap traversal.
//!
//! Two path shapes are supported:
//!
//! - **Waypoints**: absolute `(x, y)` points in metres, +y down. Each
//!   consecutive pair is one time-bounded leg; live position is never read.
//! - **Segments**: `(distance, turn)` pairs. Each leg is driven by the
//!   [`DistanceDriver`] (closed-loop when the locator works), then the running
//!   heading is turned and re-aimed without an in-place rotation.
//!
//! Legs entered through a heading change sharper than the turn threshold are
//! driven at the turn speed, all others at the straight speed.

use crate::calibration::CalibrationResult;
use crate::clock::SharedClock;
use crate::config::{MotionConfig, ParikramaConfig};
use crate::drive::{DistanceDriver, DriveOutcome};
use crate::error::{Error, Result};
use crate::lap::CancellationToken;
use crate::motion::MotionModel;
use crate::robot::{RobotCommander, halt};
use crate::utils::{displacement_heading, normalize_heading, signed_heading_delta};
use serde::{Deserialize, Serialize};

/// Point of a waypoint path, metres in the track frame
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(from = "[f32; 2]", into = "[f32; 2]")]
pub struct Waypoint {
    pub x: f32,
    pub y: f32,
}

impl Waypoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

impl From<[f32; 2]> for Waypoint {
    fn from([x, y]: [f32; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Waypoint> for [f32; 2] {
    fn from(w: Waypoint) -> Self {
        [w.x, w.y]
    }
}

/// One leg of a segment path: drive, then turn by `turn_deg`
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(from = "[f32; 2]", into = "[f32; 2]")]
pub struct Segment {
    pub distance_m: f32,
    /// Heading change applied after the leg (positive = counter-clockwise)
    pub turn_deg: f32,
}

impl Segment {
    pub fn new(distance_m: f32, turn_deg: f32) -> Self {
        Self {
            distance_m,
            turn_deg,
        }
    }
}

impl From<[f32; 2]> for Segment {
    fn from([distance_m, turn_deg]: [f32; 2]) -> Self {
        Self {
            distance_m,
            turn_deg,
        }
    }
}

impl From<Segment> for [f32; 2] {
    fn from(s: Segment) -> Self {
        [s.distance_m, s.turn_deg]
    }
}

/// Path driven every lap
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PathDescription {
    Waypoints {
        points: Vec<Waypoint>,
    },
    Segments {
        legs: Vec<Segment>,
        /// Logical heading of the first leg (default: 0, rightward)
        #[serde(default)]
        initial_heading_deg: f32,
    },
}

impl PathDescription {
    /// Number of legs in one lap
    pub fn leg_count(&self) -> usize {
        match self {
            PathDescription::Waypoints { points } => points.len().saturating_sub(1),
            PathDescription::Segments { legs, .. } => legs.len(),
        }
    }

    /// Reject paths that cannot be driven
    pub fn validate(&self) -> Result<()> {
        match self {
            PathDescription::Waypoints { points } => {
                if points.len() < 2 {
                    return Err(Error::Config(format!(
                        "waypoint path needs at least 2 points, got {}",
                        points.len()
                    )));
                }
                if let Some(i) = points
                    .iter()
                    .position(|p| !p.x.is_finite() || !p.y.is_finite())
                {
                    return Err(Error::Config(format!("waypoint {} is not finite", i)));
                }
            }
            PathDescription::Segments {
                legs,
                initial_heading_deg,
            } => {
                if legs.is_empty() {
                    return Err(Error::Config("segment path has no legs".into()));
                }
                if !initial_heading_deg.is_finite() {
                    return Err(Error::Config("initial_heading_deg is not finite".into()));
                }
                if let Some(i) = legs.iter().position(|s| {
                    !s.distance_m.is_finite() || s.distance_m < 0.0 || !s.turn_deg.is_finite()
                }) {
                    return Err(Error::Config(format!(
                        "segment {} needs a finite non-negative distance and finite turn",
                        i
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Diagnostics of one driven leg
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LegReport {
    pub index: usize,
    /// Heading in the track frame, before the offset
    pub logical_heading_deg: f32,
    /// Heading actually sent to the robot
    pub command_heading: u16,
    pub distance_m: f32,
    pub speed: u8,
    /// Entered through a sharp heading change
    pub turn: bool,
    pub outcome: DriveOutcome,
}

/// Outcome of one lap
#[derive(Debug, Clone, PartialEq)]
pub struct LapResult {
    pub duration_secs: f32,
    pub legs_driven: usize,
    /// False when the lap was cut short by cancellation
    pub completed: bool,
    pub legs: Vec<LegReport>,
}

/// Drives one lap of a path with a fixed calibration
pub struct PathExecutor {
    motion: MotionConfig,
    driver: DistanceDriver,
    clock: SharedClock,
}

impl PathExecutor {
    pub fn new(config: &ParikramaConfig, calibration: CalibrationResult, clock: SharedClock) -> Self {
        let model =
            MotionModel::from_config(&config.motion).with_coefficient(calibration.speed_coefficient);
        let driver = DistanceDriver::new(
            model,
            calibration.heading_offset_deg,
            config.drive.clone(),
            config.motion.leg_settle_secs,
            clock.clone(),
        );
        Self {
            motion: config.motion.clone(),
            driver,
            clock,
        }
    }

    pub fn model(&self) -> &MotionModel {
        self.driver.model()
    }

    pub fn heading_offset_deg(&self) -> f32 {
        self.driver.heading_offset_deg()
    }

    /// Speed for a leg entered through `turn_deg` of heading change
    fn leg_speed(&self, turn_deg: Option<f32>) -> (u8, bool) {
        match turn_deg {
            Some(turn) if turn.abs() > self.motion.turn_threshold_deg => {
                (self.motion.turn_speed, true)
            }
            _ => (self.motion.straight_speed, false),
        }
    }

    /// Drive the path once.
    ///
    /// `cancel` is checked between legs; the leg in progress always finishes
    /// with the robot stopped.
    pub fn execute_lap<R: RobotCommander + ?Sized>(
        &self,
        robot: &mut R,
        path: &PathDescription,
        cancel: &CancellationToken,
    ) -> Result<LapResult> {
        let started = self.clock.now();
        let mut legs = Vec::with_capacity(path.leg_count());

        let completed = match path {
            PathDescription::Waypoints { points } => {
                self.waypoint_lap(robot, points, cancel, &mut legs)?
            }
            PathDescription::Segments {
                legs: segments,
                initial_heading_deg,
            } => self.segment_lap(robot, segments, *initial_heading_deg, cancel, &mut legs)?,
        };

        Ok(LapResult {
            duration_secs: self.clock.now().saturating_sub(started).as_secs_f32(),
            legs_driven: legs.len(),
            completed,
            legs,
        })
    }

    fn waypoint_lap<R: RobotCommander + ?Sized>(
        &self,
        robot: &mut R,
        points: &[Waypoint],
        cancel: &CancellationToken,
        legs: &mut Vec<LegReport>,
    ) -> Result<bool> {
        let mut previous_heading = None;

        for (index, pair) in points.windows(2).enumerate() {
            if cancel.is_cancelled() {
                return Ok(false);
            }
            let (from, to) = (pair[0], pair[1]);
            let (dx, dy) = (to.x - from.x, to.y - from.y);
            let heading = displacement_heading(dx, dy);
            let distance_m = dx.hypot(dy);

            let turn_deg = previous_heading.map(|p| signed_heading_delta(heading - p));
            let (speed, turn) = self.leg_speed(turn_deg);
            previous_heading = Some(heading);

            let command_heading = self.driver.command_heading(heading);
            let duration_secs = self.model().duration(distance_m, f32::from(speed));
            log::info!(
                "Leg {}: ({:.2}, {:.2}) -> ({:.2}, {:.2}), heading {:.1}° (cmd {}°), {:.2} m, speed {}{}",
                index + 1,
                from.x,
                from.y,
                to.x,
                to.y,
                heading,
                command_heading,
                distance_m,
                speed,
                if turn { " [turn]" } else { "" }
            );

            self.timed_leg(robot, command_heading, speed, duration_secs)?;
            legs.push(LegReport {
                index,
                logical_heading_deg: heading,
                command_heading,
                distance_m,
                speed,
                turn,
                outcome: DriveOutcome::OpenLoop { duration_secs },
            });
        }
        Ok(true)
    }

    /// Heading + speed for a fixed time, stop, settle.
    fn timed_leg<R: RobotCommander + ?Sized>(
        &self,
        robot: &mut R,
        command_heading: u16,
        speed: u8,
        duration_secs: f32,
    ) -> Result<()> {
        let drive = |robot: &mut R| -> Result<()> {
            robot.set_heading(command_heading)?;
            robot.set_speed(speed)?;
            self.clock.sleep_secs(duration_secs);
            robot.stop()
        };
        if let Err(e) = drive(&mut *robot) {
            halt(robot);
            return Err(e);
        }
        self.clock.sleep_secs(self.motion.leg_settle_secs);
        Ok(())
    }

    fn segment_lap<R: RobotCommander + ?Sized>(
        &self,
        robot: &mut R,
        segments: &[Segment],
        initial_heading_deg: f32,
        cancel: &CancellationToken,
        legs: &mut Vec<LegReport>,
    ) -> Result<bool> {
        let mut heading = normalize_heading(initial_heading_deg);

        for (index, segment) in segments.iter().enumerate() {
            if cancel.is_cancelled() {
                return Ok(false);
            }
            let (speed, turn) = self.leg_speed(Some(segment.turn_deg));
            let command_heading = self.driver.command_heading(heading);
            log::info!(
                "Leg {}: heading {:.1}° (cmd {}°), {:.2} m, speed {}, then turn {:+.1}°",
                index + 1,
                heading,
                command_heading,
                segment.distance_m,
                speed,
                segment.turn_deg
            );

            let outcome = self
                .driver
                .drive_distance(robot, heading, segment.distance_m, speed)?;
            log::debug!("Leg {} outcome: {:?}", index + 1, outcome);
            legs.push(LegReport {
                index,
                logical_heading_deg: heading,
                command_heading,
                distance_m: segment.distance_m,
                speed,
                turn,
                outcome,
            });

            heading = normalize_heading(heading + segment.turn_deg);
            // Re-aim only; the robot swings round as it pulls away on the next leg
            if let Err(e) = robot.set_heading(self.driver.command_heading(heading)) {
                halt(robot);
                return Err(e);
            }
        }
        Ok(true)
    }
}
