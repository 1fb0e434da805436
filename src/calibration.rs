//! Heading and speed self-calibration from a single test pulse.
//!
//! The robot is driven at commanded heading 0 for a short, fixed pulse while
//! the locator measures where it actually went. The direction of travel gives
//! the heading offset; the distance gives the speed coefficient.
//!
//! ```text
//! Start -> CheckFeedbackCapability -> ResetOrigin -> Pulse -> Measure -> Compute -> Done
//!                 |                       |                      |
//!                 +-----------------------+----------------------+--> Skipped(reason)
//! ```
//!
//! Calibration never fails the session for lack of data: every skip keeps the
//! configured defaults. Only a broken command link is returned as an error.

use crate::clock::SharedClock;
use crate::config::{CalibrationConfig, MotionConfig};
use crate::error::Result;
use crate::indicator;
use crate::motion::MotionModel;
use crate::robot::{Color, OriginReset, RobotCommander, halt};
use crate::utils::{displacement_heading, normalize_heading};

/// Why calibration kept the defaults
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Device exposes no locator
    CapabilityAbsent,
    /// No reset method was accepted
    OriginResetFailed,
    /// Locator read failed after the pulse
    ReadFailed,
    /// Displacement too small to trust
    InsufficientSignal,
}

/// What the locator saw during the pulse
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PulseMeasurement {
    pub dx_m: f32,
    pub dy_m: f32,
    /// Direction of travel in the track frame, [0, 360)
    pub angle_moved_deg: f32,
    /// Coefficient estimate before clamping
    pub raw_coefficient: f32,
}

/// Calibration outcome handed to the path executor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationResult {
    /// Added to every logical heading, [0, 360)
    pub heading_offset_deg: f32,
    /// m/s at the reference speed, within the clamp bounds
    pub speed_coefficient: f32,
    pub performed: bool,
    pub skip_reason: Option<SkipReason>,
    pub measurement: Option<PulseMeasurement>,
}

impl CalibrationResult {
    /// Configured defaults, as used when calibration is disabled
    pub fn uncalibrated(config: &MotionConfig) -> Self {
        Self {
            heading_offset_deg: normalize_heading(config.heading_offset_deg),
            speed_coefficient: MotionModel::from_config(config).coefficient(),
            performed: false,
            skip_reason: None,
            measurement: None,
        }
    }

    fn skipped(mut self, reason: SkipReason) -> Self {
        self.performed = false;
        self.skip_reason = Some(reason);
        self
    }
}

/// Calibration state machine states
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CalibrationState {
    Start,
    CheckFeedbackCapability,
    ResetOrigin,
    Pulse,
    Measure,
    Compute { dx_m: f32, dy_m: f32 },
    Done(CalibrationResult),
    Skipped(SkipReason),
}

/// Runs the test pulse and derives offset and coefficient
pub struct CalibrationEngine {
    config: CalibrationConfig,
    defaults: CalibrationResult,
    model: MotionModel,
    clock: SharedClock,
}

impl CalibrationEngine {
    pub fn new(config: CalibrationConfig, motion: &MotionConfig, clock: SharedClock) -> Self {
        Self {
            config,
            defaults: CalibrationResult::uncalibrated(motion),
            model: MotionModel::from_config(motion),
            clock,
        }
    }

    /// Run the calibration once.
    ///
    /// Always leaves the robot stopped. Returns `Err` only when a heading or
    /// speed command could not be delivered.
    pub fn calibrate<R: RobotCommander + ?Sized>(&self, robot: &mut R) -> Result<CalibrationResult> {
        log::info!("Auto-calibration...");
        let mut retries_left = u32::from(self.config.retry_pulse);
        let mut state = CalibrationState::Start;

        loop {
            log::debug!("Calibration state: {:?}", state);
            state = match state {
                CalibrationState::Start => {
                    robot.stop()?;
                    indicator::show_char(robot, 'C', Color::YELLOW);
                    self.clock.sleep_secs(self.config.pre_pause_secs);
                    CalibrationState::CheckFeedbackCapability
                }
                CalibrationState::CheckFeedbackCapability => {
                    if robot.has_position_feedback() {
                        CalibrationState::ResetOrigin
                    } else {
                        CalibrationState::Skipped(SkipReason::CapabilityAbsent)
                    }
                }
                CalibrationState::ResetOrigin => {
                    if reset_origin(robot).is_some() {
                        CalibrationState::Pulse
                    } else {
                        CalibrationState::Skipped(SkipReason::OriginResetFailed)
                    }
                }
                CalibrationState::Pulse => {
                    self.pulse(robot)?;
                    CalibrationState::Measure
                }
                CalibrationState::Measure => match read_displacement(robot) {
                    None => CalibrationState::Skipped(SkipReason::ReadFailed),
                    Some((dx_m, dy_m)) if dx_m.hypot(dy_m) < self.config.min_displacement_m => {
                        if retries_left > 0 {
                            retries_left -= 1;
                            log::warn!(
                                "Calibration moved only {:.3} m, retrying the pulse",
                                dx_m.hypot(dy_m)
                            );
                            CalibrationState::ResetOrigin
                        } else {
                            CalibrationState::Skipped(SkipReason::InsufficientSignal)
                        }
                    }
                    Some((dx_m, dy_m)) => CalibrationState::Compute { dx_m, dy_m },
                },
                CalibrationState::Compute { dx_m, dy_m } => {
                    CalibrationState::Done(self.compute(dx_m, dy_m))
                }
                CalibrationState::Done(result) => {
                    indicator::show_char(robot, 'V', Color::CYAN);
                    return Ok(result);
                }
                CalibrationState::Skipped(reason) => {
                    log::warn!(
                        "Calibration skipped ({}), keeping heading offset {:.1}°",
                        describe(reason),
                        self.defaults.heading_offset_deg
                    );
                    indicator::show_char(robot, 'V', Color::CYAN);
                    self.clock.sleep_secs(0.3);
                    return Ok(self.defaults.skipped(reason));
                }
            };
        }
    }

    /// Drive the pulse at raw heading 0, stop, settle.
    fn pulse<R: RobotCommander + ?Sized>(&self, robot: &mut R) -> Result<()> {
        let drive = |robot: &mut R| -> Result<()> {
            robot.set_heading(0)?;
            robot.set_speed(self.config.pulse_speed)?;
            self.clock.sleep_secs(self.config.pulse_secs);
            robot.stop()
        };
        if let Err(e) = drive(&mut *robot) {
            halt(robot);
            return Err(e);
        }
        self.clock.sleep_secs(self.config.settle_secs);
        Ok(())
    }

    /// Offset and coefficient from the measured displacement
    fn compute(&self, dx_m: f32, dy_m: f32) -> CalibrationResult {
        let angle_moved_deg = displacement_heading(dx_m, dy_m);
        let heading_offset_deg = normalize_heading(-angle_moved_deg);

        let measured_velocity = dx_m.hypot(dy_m) / self.config.pulse_secs;
        let raw_coefficient =
            measured_velocity * self.model.reference_speed() / f32::from(self.config.pulse_speed);
        let speed_coefficient = self.model.clamp_coefficient(raw_coefficient);

        log::info!(
            "Calibrated: dx={:.3} m, dy={:.3} m, angle={:.1}°, offset={:.1}°, coefficient={:.2} m/s",
            dx_m,
            dy_m,
            angle_moved_deg,
            heading_offset_deg,
            speed_coefficient
        );

        CalibrationResult {
            heading_offset_deg,
            speed_coefficient,
            performed: true,
            skip_reason: None,
            measurement: Some(PulseMeasurement {
                dx_m,
                dy_m,
                angle_moved_deg,
                raw_coefficient,
            }),
        }
    }
}

/// Zero the locator, trying each reset method in order.
///
/// Returns the method that worked, or `None` when feedback is absent or every
/// method was rejected.
pub(crate) fn reset_origin<R: RobotCommander + ?Sized>(robot: &mut R) -> Option<OriginReset> {
    let feedback = robot.position_feedback()?;
    for method in OriginReset::FALLBACK_ORDER {
        match feedback.reset_origin(method) {
            Ok(()) => return Some(method),
            Err(e) => log::debug!("Locator reset via {:?} failed: {}", method, e),
        }
    }
    None
}

/// Current locator reading in metres, `None` on absence or read failure.
fn read_displacement<R: RobotCommander + ?Sized>(robot: &mut R) -> Option<(f32, f32)> {
    let feedback = robot.position_feedback()?;
    match feedback.get_position() {
        Ok(position) => Some(position.to_metres()),
        Err(e) => {
            log::warn!("Locator read failed: {}", e);
            None
        }
    }
}

fn describe(reason: SkipReason) -> &'static str {
    match reason {
        SkipReason::CapabilityAbsent => "no locator",
        SkipReason::OriginResetFailed => "locator could not be reset",
        SkipReason::ReadFailed => "locator read failed",
        SkipReason::InsufficientSignal => "too little movement measured",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::robot::sim::{SimCommand, SimWorld};
    use crate::robot::{Position, PositionFeedback};
    use approx::assert_relative_eq;
    use std::sync::Arc;

    fn engine_for(world: &SimWorld, config: CalibrationConfig) -> CalibrationEngine {
        CalibrationEngine::new(config, &MotionConfig::default(), Arc::new(world.clock()))
    }

    fn sim(config: SimConfig) -> SimWorld {
        SimWorld::new(config)
    }

    /// Reports a fixed displacement after any pulse
    struct FixedLocator {
        dx_mm: f32,
        dy_mm: f32,
        speeds: Vec<u8>,
    }

    impl PositionFeedback for FixedLocator {
        fn get_position(&mut self) -> Result<Position> {
            Ok(Position::new(self.dx_mm, self.dy_mm))
        }

        fn reset_origin(&mut self, _method: OriginReset) -> Result<()> {
            Ok(())
        }
    }

    impl RobotCommander for FixedLocator {
        fn set_heading(&mut self, _heading_deg: u16) -> Result<()> {
            Ok(())
        }

        fn set_speed(&mut self, speed: u8) -> Result<()> {
            self.speeds.push(speed);
            Ok(())
        }

        fn position_feedback(&mut self) -> Option<&mut dyn PositionFeedback> {
            Some(self)
        }
    }

    /// Hands out one reading per pulse, in order
    struct ScriptedLocator {
        readings: Vec<Position>,
        speeds: Vec<u8>,
    }

    impl PositionFeedback for ScriptedLocator {
        fn get_position(&mut self) -> Result<Position> {
            Ok(self.readings.remove(0))
        }

        fn reset_origin(&mut self, _method: OriginReset) -> Result<()> {
            Ok(())
        }
    }

    impl RobotCommander for ScriptedLocator {
        fn set_heading(&mut self, _heading_deg: u16) -> Result<()> {
            Ok(())
        }

        fn set_speed(&mut self, speed: u8) -> Result<()> {
            self.speeds.push(speed);
            Ok(())
        }

        fn position_feedback(&mut self) -> Option<&mut dyn PositionFeedback> {
            Some(self)
        }
    }

    fn calibrate_fixed(dx_m: f32, dy_m: f32) -> CalibrationResult {
        let world = sim(SimConfig::default());
        let engine = engine_for(&world, CalibrationConfig::default());
        let mut robot = FixedLocator {
            dx_mm: dx_m * 1000.0,
            dy_mm: dy_m * 1000.0,
            speeds: Vec::new(),
        };
        let result = engine.calibrate(&mut robot).unwrap();
        assert_eq!(robot.speeds.last(), Some(&0));
        result
    }

    #[test]
    fn test_no_locator_keeps_defaults() {
        let world = sim(SimConfig {
            position_feedback: false,
            ..Default::default()
        });
        let motion = MotionConfig {
            heading_offset_deg: 42.0,
            speed_coefficient: 0.72,
            ..Default::default()
        };
        let engine = CalibrationEngine::new(
            CalibrationConfig::default(),
            &motion,
            Arc::new(world.clock()),
        );
        let result = engine.calibrate(&mut world.robot()).unwrap();

        assert!(!result.performed);
        assert_eq!(result.skip_reason, Some(SkipReason::CapabilityAbsent));
        assert_eq!(result.heading_offset_deg, 42.0);
        assert_relative_eq!(result.speed_coefficient, 0.72);
        // Never drove
        assert_eq!(world.speeds(), vec![0]);
    }

    #[test]
    fn test_straight_pulse_clamps_coefficient() {
        // 0.60 m in 0.70 s at speed 120 -> 1.214 m/s at 170, clamped to 0.85
        let result = calibrate_fixed(0.60, 0.0);
        assert!(result.performed);
        let m = result.measurement.unwrap();
        assert_relative_eq!(m.angle_moved_deg, 0.0);
        assert_relative_eq!(result.heading_offset_deg, 0.0);
        assert_relative_eq!(m.raw_coefficient, 0.60 / 0.70 * 170.0 / 120.0, epsilon = 1e-5);
        assert_relative_eq!(result.speed_coefficient, 0.85);
    }

    #[test]
    fn test_unclamped_coefficient() {
        let result = calibrate_fixed(0.30, 0.0);
        assert_relative_eq!(
            result.speed_coefficient,
            0.30 / 0.70 * 170.0 / 120.0,
            epsilon = 1e-5
        );
    }

    #[test]
    fn test_downward_pulse_gives_90_offset() {
        let result = calibrate_fixed(0.0, 0.30);
        let m = result.measurement.unwrap();
        assert_relative_eq!(m.angle_moved_deg, 270.0, epsilon = 1e-3);
        assert_relative_eq!(result.heading_offset_deg, 90.0, epsilon = 1e-3);
    }

    #[test]
    fn test_insufficient_signal() {
        let result = calibrate_fixed(0.01, 0.0);
        assert!(!result.performed);
        assert_eq!(result.skip_reason, Some(SkipReason::InsufficientSignal));
        assert_relative_eq!(result.speed_coefficient, 0.60);
    }

    #[test]
    fn test_recovers_heading_bias_in_sim() {
        let world = sim(SimConfig {
            heading_bias_deg: 30.0,
            metres_per_sec_at_reference: 0.70,
            ..Default::default()
        });
        let engine = engine_for(&world, CalibrationConfig::default());
        let result = engine.calibrate(&mut world.robot()).unwrap();

        assert!(result.performed);
        assert_relative_eq!(result.heading_offset_deg, 330.0, epsilon = 0.01);
        assert_relative_eq!(result.speed_coefficient, 0.70, epsilon = 1e-3);
        assert_eq!(world.speed(), 0);
        // Pulse: raw heading 0, test speed, stop
        let motion: Vec<_> = world
            .commands()
            .into_iter()
            .filter(|c| matches!(c, SimCommand::Heading(_) | SimCommand::Speed(_)))
            .collect();
        assert_eq!(
            motion,
            vec![
                SimCommand::Speed(0),
                SimCommand::Heading(0),
                SimCommand::Speed(120),
                SimCommand::Speed(0),
            ]
        );
    }

    #[test]
    fn test_reset_fallback_order() {
        let world = sim(SimConfig {
            reset_methods: vec![OriginReset::SetLocator],
            ..Default::default()
        });
        let mut robot = world.robot();
        assert_eq!(reset_origin(&mut robot), Some(OriginReset::SetLocator));

        let world = sim(SimConfig {
            reset_methods: Vec::new(),
            ..Default::default()
        });
        let engine = engine_for(&world, CalibrationConfig::default());
        let result = engine.calibrate(&mut world.robot()).unwrap();
        assert_eq!(result.skip_reason, Some(SkipReason::OriginResetFailed));
    }

    #[test]
    fn test_read_failure_skips() {
        let world = sim(SimConfig {
            fail_reads_after: Some(0),
            ..Default::default()
        });
        let engine = engine_for(&world, CalibrationConfig::default());
        let result = engine.calibrate(&mut world.robot()).unwrap();
        assert_eq!(result.skip_reason, Some(SkipReason::ReadFailed));
        assert_eq!(world.speed(), 0);
    }

    #[test]
    fn test_retry_pulse_once() {
        let world = sim(SimConfig {
            traction: 0.0,
            ..Default::default()
        });
        let engine = engine_for(
            &world,
            CalibrationConfig {
                retry_pulse: true,
                ..Default::default()
            },
        );
        let result = engine.calibrate(&mut world.robot()).unwrap();
        assert_eq!(result.skip_reason, Some(SkipReason::InsufficientSignal));
        let pulses = world.speeds().iter().filter(|&&s| s == 120).count();
        assert_eq!(pulses, 2);
    }

    #[test]
    fn test_retry_pulse_recovers() {
        let world = sim(SimConfig::default());
        let engine = engine_for(
            &world,
            CalibrationConfig {
                retry_pulse: true,
                ..Default::default()
            },
        );
        // First pulse barely moves, the second one is usable
        let mut robot = ScriptedLocator {
            readings: vec![Position::new(5.0, 0.0), Position::new(300.0, 0.0)],
            speeds: Vec::new(),
        };
        let result = engine.calibrate(&mut robot).unwrap();

        assert!(result.performed);
        assert_eq!(result.skip_reason, None);
        assert_relative_eq!(result.heading_offset_deg, 0.0);
        assert_relative_eq!(
            result.speed_coefficient,
            0.30 / 0.70 * 170.0 / 120.0,
            epsilon = 1e-5
        );
        assert_eq!(robot.speeds.iter().filter(|&&s| s == 120).count(), 2);
        assert!(robot.readings.is_empty());
    }

    #[test]
    fn test_connection_loss_is_error() {
        let world = sim(SimConfig::default());
        // Stop and heading go through, the pulse speed does not
        world.drop_connection_after(2);
        let engine = engine_for(&world, CalibrationConfig::default());
        let err = engine.calibrate(&mut world.robot()).unwrap_err();
        assert!(err.is_connection());
    }

    #[test]
    fn test_configured_default_offset() {
        let motion = MotionConfig {
            heading_offset_deg: -15.0,
            ..Default::default()
        };
        let result = CalibrationResult::uncalibrated(&motion);
        assert_eq!(result.heading_offset_deg, 345.0);
        assert!(!result.performed);
    }
}
