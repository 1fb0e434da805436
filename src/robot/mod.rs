//! Robot command interface
//!
//! The engine talks to the robot only through [`RobotCommander`]. Heading and
//! speed commands are mandatory; position feedback is a typed optional
//! sub-interface ([`PositionFeedback`]) and indicator operations default to
//! [`Error::NotSupported`].

pub mod sim;

use crate::clock::SharedClock;
use crate::config::ParikramaConfig;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Displacement reported by the locator since the last origin reset.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    /// X in millimetres (+x right)
    pub x_mm: f32,
    /// Y in millimetres (+y down)
    pub y_mm: f32,
}

impl Position {
    pub fn new(x_mm: f32, y_mm: f32) -> Self {
        Self { x_mm, y_mm }
    }

    /// Position in metres as `(x, y)`.
    pub fn to_metres(self) -> (f32, f32) {
        (self.x_mm / 1000.0, self.y_mm / 1000.0)
    }

    /// Straight-line distance to `other` in metres.
    pub fn distance_m(&self, other: &Position) -> f32 {
        (other.x_mm - self.x_mm).hypot(other.y_mm - self.y_mm) / 1000.0
    }
}

/// Ways a device may allow zeroing its locator, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OriginReset {
    /// Dedicated locator reset
    ResetLocator,
    /// `set_location(0, 0)`
    SetLocation,
    /// `set_locator(0, 0)`
    SetLocator,
    /// `set_position(0, 0)`
    SetPosition,
}

impl OriginReset {
    /// Primary reset first, then the named alternatives.
    pub const FALLBACK_ORDER: [OriginReset; 4] = [
        OriginReset::ResetLocator,
        OriginReset::SetLocation,
        OriginReset::SetLocator,
        OriginReset::SetPosition,
    ];
}

/// RGB colour for LED operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const OFF: Color = Color::new(0, 0, 0);
    pub const GREEN: Color = Color::new(0, 255, 0);
    pub const YELLOW: Color = Color::new(255, 255, 0);
    pub const ORANGE: Color = Color::new(255, 128, 0);
    pub const RED: Color = Color::new(255, 0, 0);
    pub const CYAN: Color = Color::new(0, 200, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// Optional locator capability
pub trait PositionFeedback {
    /// Read displacement since the last origin reset
    fn get_position(&mut self) -> Result<Position>;

    /// Zero the locator using `method`
    fn reset_origin(&mut self, method: OriginReset) -> Result<()>;
}

/// Robot command trait
///
/// One command stream: implementations are driven from a single control
/// thread and never need interior locking for correctness.
pub trait RobotCommander {
    /// Command absolute heading in degrees (0..=359)
    fn set_heading(&mut self, heading_deg: u16) -> Result<()>;

    /// Command speed magnitude; 0 stops the robot
    fn set_speed(&mut self, speed: u8) -> Result<()>;

    /// Locator, if the device and firmware expose one
    fn position_feedback(&mut self) -> Option<&mut dyn PositionFeedback> {
        None
    }

    /// Whether a locator is exposed
    fn has_position_feedback(&mut self) -> bool {
        self.position_feedback().is_some()
    }

    /// Stop the robot
    fn stop(&mut self) -> Result<()> {
        self.set_speed(0)
    }

    /// Show an ASCII character on the LED matrix
    fn set_matrix_character(&mut self, ch: char, color: Color) -> Result<()> {
        let _ = (ch, color);
        Err(Error::NotSupported("LED matrix"))
    }

    /// Set the front LED colour
    fn set_front_led(&mut self, color: Color) -> Result<()> {
        let _ = color;
        Err(Error::NotSupported("front LED"))
    }

    /// Set the main LED colour
    fn set_main_led(&mut self, color: Color) -> Result<()> {
        let _ = color;
        Err(Error::NotSupported("main LED"))
    }

    /// Battery voltage in volts
    fn battery_voltage(&mut self) -> Result<f32> {
        Err(Error::NotSupported("battery voltage"))
    }
}

impl<R: RobotCommander + ?Sized> RobotCommander for Box<R> {
    fn set_heading(&mut self, heading_deg: u16) -> Result<()> {
        (**self).set_heading(heading_deg)
    }

    fn set_speed(&mut self, speed: u8) -> Result<()> {
        (**self).set_speed(speed)
    }

    fn position_feedback(&mut self) -> Option<&mut dyn PositionFeedback> {
        (**self).position_feedback()
    }

    fn stop(&mut self) -> Result<()> {
        (**self).stop()
    }

    fn set_matrix_character(&mut self, ch: char, color: Color) -> Result<()> {
        (**self).set_matrix_character(ch, color)
    }

    fn set_front_led(&mut self, color: Color) -> Result<()> {
        (**self).set_front_led(color)
    }

    fn set_main_led(&mut self, color: Color) -> Result<()> {
        (**self).set_main_led(color)
    }

    fn battery_voltage(&mut self) -> Result<f32> {
        (**self).battery_voltage()
    }
}

/// Best-effort stop used on error paths; the triggering error is still returned.
pub(crate) fn halt<R: RobotCommander + ?Sized>(robot: &mut R) {
    if let Err(e) = robot.stop() {
        log::warn!("Failed to stop robot: {}", e);
    }
}

/// An open robot session: the command stream plus the time base it runs on.
pub struct Connection {
    pub robot: Box<dyn RobotCommander>,
    pub clock: SharedClock,
}

/// Create a device connection based on configuration
///
/// Only the simulated device is built in; hardware transports plug in by
/// implementing [`RobotCommander`] and a [`crate::session::Connector`].
pub fn create_device(config: &ParikramaConfig) -> Result<Connection> {
    match config.device.device_type.as_str() {
        "sim" => {
            let world = sim::SimWorld::new(config.sim.clone());
            log::info!(
                "Simulated robot '{}' (bias {:.1}°, {:.2} m/s at speed {})",
                config.device.name,
                config.sim.heading_bias_deg,
                config.sim.metres_per_sec_at_reference,
                config.motion.reference_speed
            );
            Ok(Connection {
                robot: Box::new(world.robot()),
                clock: std::sync::Arc::new(world.clock()),
            })
        }
        _ => Err(Error::UnknownDevice(config.device.device_type.clone())),
    }
}
