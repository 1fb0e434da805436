//! Speed model: commanded speed units to linear velocity and leg duration.

use crate::config::MotionConfig;

/// Floor for velocities used as a divisor (m/s)
const MIN_VELOCITY: f32 = 1e-6;

/// Linear speed model of the robot
///
/// `coefficient` is the velocity (m/s) achieved at `reference_speed`; it is
/// always kept inside `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionModel {
    coefficient: f32,
    reference_speed: f32,
    min: f32,
    max: f32,
}

impl MotionModel {
    /// Create a model; `coefficient` is clamped into `[min, max]`.
    pub fn new(coefficient: f32, reference_speed: f32, min: f32, max: f32) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        let model = Self {
            coefficient: min,
            reference_speed,
            min,
            max,
        };
        model.with_coefficient(coefficient)
    }

    /// Uncalibrated model from configuration
    pub fn from_config(config: &MotionConfig) -> Self {
        Self::new(
            config.speed_coefficient,
            config.reference_speed,
            config.coefficient_min,
            config.coefficient_max,
        )
    }

    /// Same model with another coefficient, clamped into bounds.
    ///
    /// A non-finite coefficient leaves the model unchanged.
    pub fn with_coefficient(self, coefficient: f32) -> Self {
        if !coefficient.is_finite() {
            return self;
        }
        Self {
            coefficient: coefficient.clamp(self.min, self.max),
            ..self
        }
    }

    /// Clamp a raw coefficient estimate into the model bounds.
    pub fn clamp_coefficient(&self, coefficient: f32) -> f32 {
        coefficient.clamp(self.min, self.max)
    }

    pub fn coefficient(&self) -> f32 {
        self.coefficient
    }

    pub fn reference_speed(&self) -> f32 {
        self.reference_speed
    }

    /// Estimated linear velocity in m/s for a commanded speed
    pub fn velocity(&self, speed: f32) -> f32 {
        if !(speed > 0.0) || !(self.reference_speed > 0.0) {
            return 0.0;
        }
        self.coefficient * speed / self.reference_speed
    }

    /// Estimated time in seconds to cover `distance` metres at `speed`
    ///
    /// Zero for zero (or negative) distance; finite for a zero speed.
    pub fn duration(&self, distance: f32, speed: f32) -> f32 {
        if !(distance > 0.0) {
            return 0.0;
        }
        let duration = distance / self.velocity(speed).max(MIN_VELOCITY);
        if duration.is_finite() { duration } else { f32::MAX }
    }
}

impl Default for MotionModel {
    fn default() -> Self {
        Self::from_config(&MotionConfig::default())
    }
}
