//! Parikrama - self-calibrating lap runner for heading/speed driven robots
//!
//! The robot only understands "head this way" and "roll this fast". Parikrama
//! turns a track description into those commands by dead reckoning, after a
//! short test pulse has measured how the robot's idea of heading 0 and of
//! speed relate to the real world.
//!
//! # Layers
//!
//! ```text
//! session      connect, retry, calibrate, count down
//!    │
//! lap          endless laps until cancelled
//!    │
//! path         one lap: waypoint legs (timed) or segment legs (by distance)
//!    │
//! drive        one leg: closed-loop on the locator, open-loop otherwise
//!    │
//! motion       speed units -> m/s -> seconds
//!    │
//! robot        RobotCommander trait, simulated device
//! ```
//!
//! Everything waits through a [`clock::Clock`], so the whole stack runs on
//! virtual time against [`robot::sim::SimWorld`].

pub mod calibration;
pub mod clock;
pub mod config;
pub mod drive;
pub mod error;
pub mod indicator;
pub mod lap;
pub mod motion;
pub mod path;
pub mod robot;
pub mod session;
pub mod utils;

// Re-export commonly used types
pub use calibration::{CalibrationEngine, CalibrationResult, SkipReason};
pub use config::ParikramaConfig;
pub use drive::{DistanceDriver, DriveOutcome};
pub use error::{Error, Result};
pub use lap::{CancellationToken, LapController, LapSummary};
pub use motion::MotionModel;
pub use path::{LapResult, PathDescription, PathExecutor};
pub use robot::{PositionFeedback, RobotCommander};
