//! Status output on the robot (LED matrix, front LED)
//!
//! Purely advisory: every operation here swallows its errors, so a robot
//! without a matrix or LEDs runs exactly the same program.

use crate::clock::Clock;
use crate::robot::{Color, RobotCommander};

/// Character shown when the requested one cannot be displayed
const FALLBACK_CHAR: char = 'V';

/// Show a character on the LED matrix, falling back to the front LED.
pub fn show_char<R: RobotCommander + ?Sized>(robot: &mut R, ch: char, color: Color) {
    let ch = if ch.is_ascii() && !ch.is_ascii_control() {
        ch
    } else {
        FALLBACK_CHAR
    };
    if let Err(e) = robot.set_matrix_character(ch, color) {
        log::debug!("Matrix unavailable ({}), using front LED", e);
        let _ = robot.set_front_led(color);
    }
}

/// Count down on the matrix, one second per step, ending with `>`.
pub fn countdown<R: RobotCommander + ?Sized>(robot: &mut R, clock: &dyn Clock, seconds: u32) {
    for n in (1..=seconds).rev() {
        // Only the leading digit fits the matrix
        let digit = n.to_string().chars().next().unwrap_or(FALLBACK_CHAR);
        log::info!("Starting in {}...", n);
        show_char(robot, digit, Color::GREEN);
        clock.sleep_secs(1.0);
    }
    show_char(robot, '>', Color::GREEN);
}

/// Front LED colour for a battery voltage
pub fn battery_color(voltage: f32) -> Color {
    if voltage > 4.1 {
        Color::GREEN
    } else if voltage > 3.9 {
        Color::YELLOW
    } else if voltage > 3.7 {
        Color::ORANGE
    } else {
        Color::RED
    }
}

/// Read the battery and show its level on the front LED.
///
/// Returns the voltage when the device reports one.
pub fn show_battery<R: RobotCommander + ?Sized>(robot: &mut R) -> Option<f32> {
    match robot.battery_voltage() {
        Ok(voltage) => {
            let _ = robot.set_front_led(battery_color(voltage));
            log::info!("Battery: {:.2} V", voltage);
            Some(voltage)
        }
        Err(e) => {
            log::debug!("Battery level unavailable: {}", e);
            None
        }
    }
}

/// Lap finished: main LED off, front LED green.
pub fn lap_done<R: RobotCommander + ?Sized>(robot: &mut R) {
    let _ = robot.set_main_led(Color::OFF);
    let _ = robot.set_front_led(Color::GREEN);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::robot::sim::{SimCommand, SimWorld};
    use std::time::Duration;

    #[test]
    fn test_show_char_replaces_non_ascii() {
        let world = SimWorld::new(SimConfig::default());
        let mut robot = world.robot();
        show_char(&mut robot, 'é', Color::GREEN);
        show_char(&mut robot, 'A', Color::GREEN);
        assert_eq!(
            world.commands(),
            vec![SimCommand::Matrix('V'), SimCommand::Matrix('A')]
        );
    }

    #[test]
    fn test_show_char_falls_back_to_front_led() {
        let world = SimWorld::new(SimConfig {
            has_matrix: false,
            ..Default::default()
        });
        let mut robot = world.robot();
        show_char(&mut robot, 'C', Color::YELLOW);
        assert_eq!(world.commands(), vec![SimCommand::FrontLed(Color::YELLOW)]);
    }

    #[test]
    fn test_countdown_sequence_and_time() {
        let world = SimWorld::new(SimConfig::default());
        let mut robot = world.robot();
        let clock = world.clock();
        countdown(&mut robot, &clock, 3);
        assert_eq!(
            world.commands(),
            vec![
                SimCommand::Matrix('3'),
                SimCommand::Matrix('2'),
                SimCommand::Matrix('1'),
                SimCommand::Matrix('>'),
            ]
        );
        assert_eq!(world.now(), Duration::from_secs(3));
    }

    #[test]
    fn test_battery_levels() {
        assert_eq!(battery_color(4.2), Color::GREEN);
        assert_eq!(battery_color(4.0), Color::YELLOW);
        assert_eq!(battery_color(3.8), Color::ORANGE);
        assert_eq!(battery_color(3.5), Color::RED);

        let world = SimWorld::new(SimConfig::default());
        let mut robot = world.robot();
        assert_eq!(show_battery(&mut robot), Some(3.95));
        assert_eq!(world.commands(), vec![SimCommand::FrontLed(Color::YELLOW)]);
    }
}
