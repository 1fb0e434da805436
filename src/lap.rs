//! Endless lap loop with cooperative cancellation.

use crate::clock::SharedClock;
use crate::error::Result;
use crate::indicator;
use crate::path::{PathDescription, PathExecutor};
use crate::robot::{Color, RobotCommander};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Pause after the lap-finished indicator, seconds
const LAP_FINISH_PAUSE_SECS: f32 = 0.2;

/// Shared stop request, set from the Ctrl-C handler.
///
/// Checked only at lap and leg boundaries; a leg in progress always runs to
/// its stop.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Cancel this token on Ctrl-C.
    pub fn cancel_on_ctrl_c(&self) -> std::result::Result<(), ctrlc::Error> {
        let token = self.clone();
        ctrlc::set_handler(move || {
            log::info!("Stop requested, finishing the current leg");
            token.cancel();
        })
    }
}

/// What a finished lap run amounted to
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LapSummary {
    pub laps_completed: u32,
    pub elapsed_secs: f32,
    /// A lap was cut short between legs
    pub interrupted: bool,
}

/// Drives the same path lap after lap until cancelled
pub struct LapController {
    executor: PathExecutor,
    battery_check_every: u32,
    clock: SharedClock,
}

impl LapController {
    pub fn new(executor: PathExecutor, battery_check_every: u32, clock: SharedClock) -> Self {
        Self {
            executor,
            battery_check_every,
            clock,
        }
    }

    /// Run laps until `cancel` is set.
    ///
    /// Returns with the robot stopped. An `Err` is a connection-level failure
    /// from a lower layer.
    pub fn run_forever<R: RobotCommander + ?Sized>(
        &self,
        robot: &mut R,
        path: &PathDescription,
        cancel: &CancellationToken,
    ) -> Result<LapSummary> {
        let started = self.clock.now();
        let mut laps_completed = 0u32;
        let mut interrupted = false;

        while !cancel.is_cancelled() {
            let lap = laps_completed + 1;
            log::info!("Lap {}", lap);
            indicator::show_char(robot, 'A', Color::GREEN);
            let result = self.executor.execute_lap(robot, path, cancel)?;

            if !result.completed {
                log::info!(
                    "Lap {} interrupted after {} of {} legs",
                    lap,
                    result.legs_driven,
                    path.leg_count()
                );
                interrupted = true;
                break;
            }

            laps_completed = lap;
            log::info!("Lap {} done in {:.2} s", lap, result.duration_secs);
            indicator::show_char(robot, 'V', Color::GREEN);
            self.clock.sleep_secs(LAP_FINISH_PAUSE_SECS);
            indicator::lap_done(robot);
            if self.battery_check_every > 0 && lap % self.battery_check_every == 0 {
                indicator::show_battery(robot);
            }
        }

        robot.stop()?;
        let elapsed_secs = self.clock.now().saturating_sub(started).as_secs_f32();
        log::info!(
            "Stopped after {} laps ({:.1} s)",
            laps_completed,
            elapsed_secs
        );
        Ok(LapSummary {
            laps_completed,
            elapsed_secs,
            interrupted,
        })
    }
}
