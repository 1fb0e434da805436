//! Configuration loading for Parikrama
//!
//! Every constant of the calibration and path engine can be overridden from a
//! TOML file. Missing sections and fields fall back to the values the track
//! was tuned with.

use crate::error::{Error, Result};
use crate::path::{PathDescription, Segment, Waypoint};
use crate::robot::OriginReset;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ParikramaConfig {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub motion: MotionConfig,
    #[serde(default)]
    pub calibration: CalibrationConfig,
    #[serde(default)]
    pub drive: DriveConfig,
    #[serde(default)]
    pub indicator: IndicatorConfig,
    /// Path driven every lap
    #[serde(default = "default_track")]
    pub track: PathDescription,
    #[serde(default)]
    pub sim: SimConfig,
}

/// Which robot to talk to
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DeviceConfig {
    /// Device backend (default: "sim")
    #[serde(rename = "type", default = "default_device_type")]
    pub device_type: String,

    /// Advertised robot name (default: "SB-27A5")
    #[serde(default = "default_device_name")]
    pub name: String,
}

/// Reconnect-and-retry policy of the session host
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ConnectionConfig {
    /// Session attempts before giving up (default: 3)
    #[serde(default = "default_attempts")]
    pub attempts: u32,

    /// Pause between attempts in seconds (default: 2.5)
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: f32,
}

/// Speed model and leg selection
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct MotionConfig {
    /// Commanded speed the coefficient refers to (default: 170)
    #[serde(default = "default_reference_speed")]
    pub reference_speed: f32,

    /// m/s at the reference speed before calibration (default: 0.60)
    #[serde(default = "default_speed_coefficient")]
    pub speed_coefficient: f32,

    /// Lower clamp for the coefficient (default: 0.45)
    #[serde(default = "default_coefficient_min")]
    pub coefficient_min: f32,

    /// Upper clamp for the coefficient (default: 0.85)
    #[serde(default = "default_coefficient_max")]
    pub coefficient_max: f32,

    /// Speed for straight legs (default: 180)
    #[serde(default = "default_straight_speed")]
    pub straight_speed: u8,

    /// Speed for legs entered through a sharp turn (default: 140)
    #[serde(default = "default_turn_speed")]
    pub turn_speed: u8,

    /// Heading change above which a leg counts as a turn, degrees (default: 20)
    #[serde(default = "default_turn_threshold")]
    pub turn_threshold_deg: f32,

    /// Pause after the stop at the end of each leg, seconds (default: 0.07)
    #[serde(default = "default_leg_settle")]
    pub leg_settle_secs: f32,

    /// Heading offset used when calibration is skipped, degrees (default: 0)
    #[serde(default)]
    pub heading_offset_deg: f32,
}

/// Test pulse parameters
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CalibrationConfig {
    /// Run the calibration pulse before the first lap (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Commanded speed of the pulse (default: 120)
    #[serde(default = "default_pulse_speed")]
    pub pulse_speed: u8,

    /// Pulse length in seconds (default: 0.70)
    #[serde(default = "default_pulse_secs")]
    pub pulse_secs: f32,

    /// Pause after the pulse stop before measuring (default: 0.25)
    #[serde(default = "default_pulse_settle")]
    pub settle_secs: f32,

    /// Pause after the initial stop, before anything else (default: 0.2)
    #[serde(default = "default_pre_pause")]
    pub pre_pause_secs: f32,

    /// Displacement below which the measurement is not trusted, metres (default: 0.02)
    #[serde(default = "default_min_displacement")]
    pub min_displacement_m: f32,

    /// Retry one pulse when the displacement is too small (default: false)
    #[serde(default)]
    pub retry_pulse: bool,
}

/// Distance-bounded drive parameters
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DriveConfig {
    /// Locator poll interval in milliseconds (default: 20)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Timeout as a multiple of the model-estimated duration (default: 2.0)
    #[serde(default = "default_timeout_factor")]
    pub timeout_factor: f32,
}

/// Status output on the robot
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct IndicatorConfig {
    /// Countdown before the first lap, seconds (default: 3)
    #[serde(default = "default_countdown")]
    pub countdown_secs: u32,

    /// Refresh the battery LED every N laps, 0 disables (default: 5)
    #[serde(default = "default_battery_check_every")]
    pub battery_check_every: u32,
}

/// Simulated robot parameters
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SimConfig {
    /// Rotation between commanded heading 0 and true forward, degrees (default: 0)
    #[serde(default)]
    pub heading_bias_deg: f32,

    /// True velocity at `reference_speed`, m/s (default: 0.60)
    #[serde(default = "default_speed_coefficient")]
    pub metres_per_sec_at_reference: f32,

    /// Commanded speed the true velocity refers to (default: 170)
    #[serde(default = "default_reference_speed")]
    pub reference_speed: f32,

    /// Fraction of the commanded motion actually achieved, 0 = stalled (default: 1.0)
    #[serde(default = "default_traction")]
    pub traction: f32,

    /// Expose a locator (default: true)
    #[serde(default = "default_true")]
    pub position_feedback: bool,

    /// Locator reset methods the firmware accepts (default: reset_locator)
    #[serde(default = "default_reset_methods")]
    pub reset_methods: Vec<OriginReset>,

    /// Locator reads fail once this many reads succeeded (default: never)
    #[serde(default)]
    pub fail_reads_after: Option<u32>,

    /// Session breaks once this many motion commands were accepted (default: never)
    #[serde(default)]
    pub drop_connection_after: Option<u32>,

    /// Device has an LED matrix (default: true)
    #[serde(default = "default_true")]
    pub has_matrix: bool,

    /// Reported battery voltage (default: 3.95)
    #[serde(default = "default_battery_voltage")]
    pub battery_voltage: f32,

    /// Pace virtual time with wall time (default: false)
    #[serde(default)]
    pub realtime: bool,

    /// Commands kept in the event log, oldest dropped first; 0 disables (default: 10000)
    #[serde(default = "default_event_log_capacity")]
    pub event_log_capacity: usize,
}

// Default value functions
fn default_device_type() -> String {
    "sim".to_string()
}
fn default_device_name() -> String {
    "SB-27A5".to_string()
}
fn default_attempts() -> u32 {
    3
}
fn default_retry_delay() -> f32 {
    2.5
}
fn default_reference_speed() -> f32 {
    170.0
}
fn default_speed_coefficient() -> f32 {
    0.60
}
fn default_coefficient_min() -> f32 {
    0.45
}
fn default_coefficient_max() -> f32 {
    0.85
}
fn default_straight_speed() -> u8 {
    180
}
fn default_turn_speed() -> u8 {
    140
}
fn default_turn_threshold() -> f32 {
    20.0
}
fn default_leg_settle() -> f32 {
    0.07
}
fn default_true() -> bool {
    true
}
fn default_pulse_speed() -> u8 {
    120
}
fn default_pulse_secs() -> f32 {
    0.70
}
fn default_pulse_settle() -> f32 {
    0.25
}
fn default_pre_pause() -> f32 {
    0.2
}
fn default_min_displacement() -> f32 {
    0.02
}
fn default_poll_interval() -> u64 {
    20
}
fn default_timeout_factor() -> f32 {
    2.0
}
fn default_countdown() -> u32 {
    3
}
fn default_battery_check_every() -> u32 {
    5
}
fn default_traction() -> f32 {
    1.0
}
fn default_reset_methods() -> Vec<OriginReset> {
    vec![OriginReset::ResetLocator]
}
fn default_battery_voltage() -> f32 {
    3.95
}
fn default_event_log_capacity() -> usize {
    10_000
}

/// Race track: 0.50 m panels, (0, 0) at the start/finish line, +x right, +y down.
fn default_track() -> PathDescription {
    PathDescription::Waypoints {
        points: vec![
            Waypoint::new(0.00, 0.00),
            Waypoint::new(2.20, 0.00),
            Waypoint::new(2.35, 2.35),
            Waypoint::new(1.95, 2.00),
            Waypoint::new(1.55, 1.65),
            Waypoint::new(1.20, 1.45),
            Waypoint::new(0.80, 1.30),
            Waypoint::new(0.60, 0.70),
            Waypoint::new(0.35, 0.25),
            Waypoint::new(0.00, 0.00),
        ],
    }
}

/// Same track expressed as distance + turn legs (clockwise).
pub fn default_segment_track() -> PathDescription {
    PathDescription::Segments {
        legs: vec![
            Segment::new(2.20, -90.0),
            Segment::new(2.35, -35.0),
            Segment::new(0.60, -25.0),
            Segment::new(0.55, -20.0),
            Segment::new(0.45, -15.0),
            Segment::new(0.45, -20.0),
            Segment::new(0.70, -60.0),
            Segment::new(0.50, -35.0),
            Segment::new(0.35, 0.0),
        ],
        initial_heading_deg: 0.0,
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            device_type: default_device_type(),
            name: default_device_name(),
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            retry_delay_secs: default_retry_delay(),
        }
    }
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            reference_speed: default_reference_speed(),
            speed_coefficient: default_speed_coefficient(),
            coefficient_min: default_coefficient_min(),
            coefficient_max: default_coefficient_max(),
            straight_speed: default_straight_speed(),
            turn_speed: default_turn_speed(),
            turn_threshold_deg: default_turn_threshold(),
            leg_settle_secs: default_leg_settle(),
            heading_offset_deg: 0.0,
        }
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            pulse_speed: default_pulse_speed(),
            pulse_secs: default_pulse_secs(),
            settle_secs: default_pulse_settle(),
            pre_pause_secs: default_pre_pause(),
            min_displacement_m: default_min_displacement(),
            retry_pulse: false,
        }
    }
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            timeout_factor: default_timeout_factor(),
        }
    }
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            countdown_secs: default_countdown(),
            battery_check_every: default_battery_check_every(),
        }
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            heading_bias_deg: 0.0,
            metres_per_sec_at_reference: default_speed_coefficient(),
            reference_speed: default_reference_speed(),
            traction: default_traction(),
            position_feedback: true,
            reset_methods: default_reset_methods(),
            fail_reads_after: None,
            drop_connection_after: None,
            has_matrix: true,
            battery_voltage: default_battery_voltage(),
            realtime: false,
            event_log_capacity: default_event_log_capacity(),
        }
    }
}

impl Default for ParikramaConfig {
    fn default() -> Self {
        Self {
            device: DeviceConfig::default(),
            connection: ConnectionConfig::default(),
            motion: MotionConfig::default(),
            calibration: CalibrationConfig::default(),
            drive: DriveConfig::default(),
            indicator: IndicatorConfig::default(),
            track: default_track(),
            sim: SimConfig::default(),
        }
    }
}

impl ParikramaConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;
        let config: ParikramaConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        let m = &self.motion;
        if !(m.reference_speed > 0.0) {
            return Err(Error::Config("reference_speed must be positive".into()));
        }
        if !(m.coefficient_min > 0.0 && m.coefficient_min <= m.coefficient_max) {
            return Err(Error::Config(format!(
                "invalid coefficient bounds [{}, {}]",
                m.coefficient_min, m.coefficient_max
            )));
        }
        if m.straight_speed == 0 || m.turn_speed == 0 {
            return Err(Error::Config("leg speeds must be non-zero".into()));
        }
        if !m.turn_threshold_deg.is_finite() || m.turn_threshold_deg < 0.0 {
            return Err(Error::Config("turn_threshold_deg must be >= 0".into()));
        }
        if !m.heading_offset_deg.is_finite() {
            return Err(Error::Config("heading_offset_deg must be finite".into()));
        }
        non_negative("leg_settle_secs", m.leg_settle_secs)?;

        let c = &self.calibration;
        if c.pulse_speed == 0 || !(c.pulse_secs > 0.0) || !c.pulse_secs.is_finite() {
            return Err(Error::Config("calibration pulse must move the robot".into()));
        }
        non_negative("calibration.settle_secs", c.settle_secs)?;
        non_negative("calibration.pre_pause_secs", c.pre_pause_secs)?;
        non_negative("min_displacement_m", c.min_displacement_m)?;

        let d = &self.drive;
        if d.poll_interval_ms == 0 {
            return Err(Error::Config("poll_interval_ms must be non-zero".into()));
        }
        if !(d.timeout_factor >= 1.0) {
            return Err(Error::Config("timeout_factor must be >= 1.0".into()));
        }

        if self.connection.attempts == 0 {
            return Err(Error::Config("connection attempts must be >= 1".into()));
        }
        non_negative("retry_delay_secs", self.connection.retry_delay_secs)?;

        self.track.validate()
    }
}

fn non_negative(name: &str, value: f32) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "{} must be finite and >= 0, got {}",
            name, value
        )))
    }
}
