//! Test utilities for Parikrama integration tests.
//!
//! Simulated robots with a biased heading and a faster-than-assumed drive,
//! plus a wrapper that requests a stop after a number of laps.

#![allow(dead_code)]

use parikrama::config::{ParikramaConfig, SimConfig};
use parikrama::path::Waypoint;
use parikrama::robot::sim::{SimRobot, SimWorld};
use parikrama::robot::{Color, PositionFeedback};
use parikrama::{CancellationToken, PathDescription, Result, RobotCommander};

/// Robot whose heading 0 points 30° up and that drives 0.70 m/s at speed 170.
pub fn biased_sim() -> SimConfig {
    SimConfig {
        heading_bias_deg: 30.0,
        metres_per_sec_at_reference: 0.70,
        ..Default::default()
    }
}

/// Config without the countdown, for faster virtual runs.
pub fn quiet_config() -> ParikramaConfig {
    let mut config = ParikramaConfig::default();
    config.indicator.countdown_secs = 0;
    config
}

/// 1 m square, clockwise on screen (+y down).
pub fn square(side: f32) -> PathDescription {
    PathDescription::Waypoints {
        points: vec![
            Waypoint::new(0.0, 0.0),
            Waypoint::new(side, 0.0),
            Waypoint::new(side, side),
            Waypoint::new(0.0, side),
            Waypoint::new(0.0, 0.0),
        ],
    }
}

/// Cancels the token once `laps` laps have been reported.
///
/// A finished lap shows up as the main LED being switched off.
pub struct StopAfterLaps {
    inner: SimRobot,
    cancel: CancellationToken,
    laps_left: u32,
}

impl StopAfterLaps {
    pub fn new(world: &SimWorld, cancel: CancellationToken, laps: u32) -> Self {
        Self {
            inner: world.robot(),
            cancel,
            laps_left: laps,
        }
    }
}

impl RobotCommander for StopAfterLaps {
    fn set_heading(&mut self, heading_deg: u16) -> Result<()> {
        self.inner.set_heading(heading_deg)
    }

    fn set_speed(&mut self, speed: u8) -> Result<()> {
        self.inner.set_speed(speed)
    }

    fn position_feedback(&mut self) -> Option<&mut dyn PositionFeedback> {
        self.inner.position_feedback()
    }

    fn set_matrix_character(&mut self, ch: char, color: Color) -> Result<()> {
        self.inner.set_matrix_character(ch, color)
    }

    fn set_front_led(&mut self, color: Color) -> Result<()> {
        self.inner.set_front_led(color)
    }

    fn set_main_led(&mut self, color: Color) -> Result<()> {
        self.laps_left = self.laps_left.saturating_sub(1);
        if self.laps_left == 0 {
            self.cancel.cancel();
        }
        self.inner.set_main_led(color)
    }

    fn battery_voltage(&mut self) -> Result<f32> {
        self.inner.battery_voltage()
    }
}
