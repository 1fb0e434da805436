//! Simulated robot for hardware-free runs and tests
//!
//! A [`SimWorld`] holds the true robot state. It hands out a [`SimRobot`]
//! (the command stream) and a [`SimClock`] (the time base); both share the
//! same state, and motion is integrated whenever the clock advances.
//!
//! # Model
//!
//! | Quantity | Behaviour |
//! |----------|-----------|
//! | Velocity | `metres_per_sec_at_reference * speed / reference_speed * traction` |
//! | Direction | commanded heading + `heading_bias_deg` (track frame, +y down) |
//! | Locator | true position minus the last reset origin, in millimetres |
//!
//! Turns are instantaneous: a new heading applies from the next instant on.
//! Fault injection covers missing locators, rejected reset methods, failing
//! reads and a session that breaks after a number of commands.
//!
//! The command log keeps only the most recent `event_log_capacity` events, so
//! an endless lap run stays within a fixed amount of memory.

use super::{Color, OriginReset, Position, PositionFeedback, RobotCommander};
use crate::clock::Clock;
use crate::config::SimConfig;
use crate::error::{Error, Result};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Command observed by the simulated robot
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimCommand {
    Heading(u16),
    Speed(u8),
    Matrix(char),
    FrontLed(Color),
    MainLed(Color),
}

/// Command with the virtual time it arrived at
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimEvent {
    pub at: Duration,
    pub command: SimCommand,
}

#[derive(Debug)]
struct SimState {
    config: SimConfig,
    now: Duration,
    /// True position in metres (track frame)
    x: f32,
    y: f32,
    /// Locator origin in metres
    origin_x: f32,
    origin_y: f32,
    heading: u16,
    speed: u8,
    reads: u32,
    motion_commands: u32,
    connected: bool,
    /// Most recent commands, oldest first
    events: VecDeque<SimEvent>,
}

impl SimState {
    fn advance(&mut self, dt: Duration) {
        let secs = dt.as_secs_f32();
        if self.speed > 0 && secs > 0.0 {
            let v = self.velocity();
            let theta = (self.heading as f32 + self.config.heading_bias_deg).to_radians();
            self.x += v * secs * theta.cos();
            // +y points down
            self.y -= v * secs * theta.sin();
        }
        self.now += dt;
    }

    fn velocity(&self) -> f32 {
        let reference = self.config.reference_speed.max(f32::EPSILON);
        self.config.metres_per_sec_at_reference * self.speed as f32 / reference
            * self.config.traction.max(0.0)
    }

    fn accept_motion_command(&mut self) -> Result<()> {
        if !self.connected {
            return Err(Error::Connection("simulated link is down".into()));
        }
        if let Some(limit) = self.config.drop_connection_after
            && self.motion_commands >= limit
        {
            self.connected = false;
            return Err(Error::Connection(format!(
                "simulated link dropped after {} commands",
                limit
            )));
        }
        self.motion_commands += 1;
        Ok(())
    }

    fn record(&mut self, command: SimCommand) {
        let capacity = self.config.event_log_capacity;
        if capacity == 0 {
            return;
        }
        while self.events.len() >= capacity {
            self.events.pop_front();
        }
        self.events.push_back(SimEvent {
            at: self.now,
            command,
        });
    }
}

/// Shared simulation state
#[derive(Clone)]
pub struct SimWorld {
    state: Arc<Mutex<SimState>>,
}

impl SimWorld {
    /// Create a world with the robot at the origin
    pub fn new(config: SimConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                config,
                now: Duration::ZERO,
                x: 0.0,
                y: 0.0,
                origin_x: 0.0,
                origin_y: 0.0,
                heading: 0,
                speed: 0,
                reads: 0,
                motion_commands: 0,
                connected: true,
                events: VecDeque::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        // A panicking test thread must not hide the state from the others
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Command stream handle
    pub fn robot(&self) -> SimRobot {
        SimRobot {
            world: self.clone(),
        }
    }

    /// Time base handle
    pub fn clock(&self) -> SimClock {
        SimClock {
            world: self.clone(),
        }
    }

    /// Virtual time since creation
    pub fn now(&self) -> Duration {
        self.lock().now
    }

    /// True position in metres (track frame)
    pub fn true_position(&self) -> (f32, f32) {
        let state = self.lock();
        (state.x, state.y)
    }

    /// Currently commanded speed
    pub fn speed(&self) -> u8 {
        self.lock().speed
    }

    /// Currently commanded heading
    pub fn heading(&self) -> u16 {
        self.lock().heading
    }

    /// Most recent commands, up to `event_log_capacity`
    pub fn events(&self) -> Vec<SimEvent> {
        self.lock().events.iter().copied().collect()
    }

    /// Commands without timestamps
    pub fn commands(&self) -> Vec<SimCommand> {
        self.lock().events.iter().map(|e| e.command).collect()
    }

    /// Heading commands in order
    pub fn headings(&self) -> Vec<u16> {
        self.lock()
            .events
            .iter()
            .filter_map(|e| match e.command {
                SimCommand::Heading(h) => Some(h),
                _ => None,
            })
            .collect()
    }

    /// Speed commands in order
    pub fn speeds(&self) -> Vec<u8> {
        self.lock()
            .events
            .iter()
            .filter_map(|e| match e.command {
                SimCommand::Speed(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    /// Number of successful locator reads
    pub fn reads(&self) -> u32 {
        self.lock().reads
    }

    /// Whether the simulated link is up
    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    /// Toggle the locator capability
    pub fn set_position_feedback(&self, enabled: bool) {
        self.lock().config.position_feedback = enabled;
    }

    /// Fail locator reads once `reads` more reads succeeded
    pub fn fail_reads_after(&self, reads: u32) {
        let mut state = self.lock();
        state.config.fail_reads_after = Some(state.reads + reads);
    }

    /// Break the link once `commands` more motion commands were accepted
    pub fn drop_connection_after(&self, commands: u32) {
        let mut state = self.lock();
        state.config.drop_connection_after = Some(state.motion_commands + commands);
    }
}

/// Simulated command stream
#[derive(Clone)]
pub struct SimRobot {
    world: SimWorld,
}

impl RobotCommander for SimRobot {
    fn set_heading(&mut self, heading_deg: u16) -> Result<()> {
        let mut state = self.world.lock();
        state.accept_motion_command()?;
        state.heading = heading_deg % 360;
        state.record(SimCommand::Heading(heading_deg));
        Ok(())
    }

    fn set_speed(&mut self, speed: u8) -> Result<()> {
        let mut state = self.world.lock();
        state.accept_motion_command()?;
        state.speed = speed;
        state.record(SimCommand::Speed(speed));
        Ok(())
    }

    fn position_feedback(&mut self) -> Option<&mut dyn PositionFeedback> {
        if self.world.lock().config.position_feedback {
            Some(self)
        } else {
            None
        }
    }

    fn set_matrix_character(&mut self, ch: char, color: Color) -> Result<()> {
        let mut state = self.world.lock();
        if !state.config.has_matrix {
            return Err(Error::NotSupported("LED matrix"));
        }
        let _ = color;
        state.record(SimCommand::Matrix(ch));
        Ok(())
    }

    fn set_front_led(&mut self, color: Color) -> Result<()> {
        self.world.lock().record(SimCommand::FrontLed(color));
        Ok(())
    }

    fn set_main_led(&mut self, color: Color) -> Result<()> {
        self.world.lock().record(SimCommand::MainLed(color));
        Ok(())
    }

    fn battery_voltage(&mut self) -> Result<f32> {
        Ok(self.world.lock().config.battery_voltage)
    }
}

impl PositionFeedback for SimRobot {
    fn get_position(&mut self) -> Result<Position> {
        let mut state = self.world.lock();
        if let Some(limit) = state.config.fail_reads_after
            && state.reads >= limit
        {
            return Err(Error::PositionRead("simulated locator fault".into()));
        }
        state.reads += 1;
        Ok(Position::new(
            (state.x - state.origin_x) * 1000.0,
            (state.y - state.origin_y) * 1000.0,
        ))
    }

    fn reset_origin(&mut self, method: OriginReset) -> Result<()> {
        let mut state = self.world.lock();
        if !state.config.reset_methods.contains(&method) {
            return Err(Error::NotSupported("locator reset method"));
        }
        state.origin_x = state.x;
        state.origin_y = state.y;
        Ok(())
    }
}

/// Virtual clock driving the simulation
#[derive(Clone)]
pub struct SimClock {
    world: SimWorld,
}

impl Clock for SimClock {
    fn now(&self) -> Duration {
        self.world.now()
    }

    fn sleep(&self, duration: Duration) {
        let realtime = {
            let mut state = self.world.lock();
            state.advance(duration);
            state.config.realtime
        };
        if realtime {
            std::thread::sleep(duration);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_straight_motion_integrates_with_clock() {
        let world = SimWorld::new(SimConfig::default());
        let mut robot = world.robot();
        let clock = world.clock();

        robot.set_heading(0).unwrap();
        robot.set_speed(170).unwrap();
        clock.sleep(Duration::from_secs(1));
        robot.stop().unwrap();
        clock.sleep(Duration::from_secs(1));

        let (x, y) = world.true_position();
        assert!((x - 0.60).abs() < 1e-4);
        assert!(y.abs() < 1e-4);
        assert_eq!(world.now(), Duration::from_secs(2));
        // Stop arrived after one virtual second
        assert_eq!(world.events()[2].at, Duration::from_secs(1));
        assert_eq!(world.events()[2].command, SimCommand::Speed(0));
    }

    #[test]
    fn test_heading_bias_and_y_down() {
        let world = SimWorld::new(SimConfig {
            heading_bias_deg: 90.0,
            ..Default::default()
        });
        let mut robot = world.robot();
        robot.set_heading(0).unwrap();
        robot.set_speed(170).unwrap();
        world.clock().sleep(Duration::from_secs(1));

        // Heading 90° in the track frame is "up", i.e. negative y
        let (x, y) = world.true_position();
        assert!(x.abs() < 1e-4);
        assert!((y + 0.60).abs() < 1e-4);
    }

    #[test]
    fn test_locator_reset_methods() {
        let world = SimWorld::new(SimConfig {
            reset_methods: vec![OriginReset::SetPosition],
            ..Default::default()
        });
        let mut robot = world.robot();
        let feedback = robot.position_feedback().unwrap();
        assert!(feedback.reset_origin(OriginReset::ResetLocator).is_err());
        assert!(feedback.reset_origin(OriginReset::SetPosition).is_ok());
        assert_eq!(feedback.get_position().unwrap(), Position::new(0.0, 0.0));
    }

    #[test]
    fn test_fault_injection() {
        let world = SimWorld::new(SimConfig::default());
        let mut robot = world.robot();

        world.fail_reads_after(1);
        assert!(robot.position_feedback().unwrap().get_position().is_ok());
        assert!(matches!(
            robot.position_feedback().unwrap().get_position(),
            Err(Error::PositionRead(_))
        ));

        world.set_position_feedback(false);
        assert!(!robot.has_position_feedback());

        world.drop_connection_after(1);
        assert!(robot.set_heading(10).is_ok());
        assert!(matches!(robot.set_speed(50), Err(Error::Connection(_))));
        assert!(!world.is_connected());
        assert!(robot.stop().is_err());
    }

    #[test]
    fn test_records_commands() {
        let world = SimWorld::new(SimConfig {
            has_matrix: false,
            ..Default::default()
        });
        let mut robot = world.robot();
        robot.set_heading(45).unwrap();
        robot.set_speed(100).unwrap();
        assert!(robot.set_matrix_character('A', Color::GREEN).is_err());
        robot.set_front_led(Color::RED).unwrap();

        assert_eq!(
            world.commands(),
            vec![
                SimCommand::Heading(45),
                SimCommand::Speed(100),
                SimCommand::FrontLed(Color::RED),
            ]
        );
        assert_eq!(world.headings(), vec![45]);
        assert_eq!(world.speeds(), vec![100]);
    }

    #[test]
    fn test_realtime_clock_waits() {
        let world = SimWorld::new(SimConfig {
            realtime: true,
            ..Default::default()
        });
        let started = std::time::Instant::now();
        world.clock().sleep(Duration::from_millis(50));
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert_eq!(world.now(), Duration::from_millis(50));
    }

    #[test]
    fn test_event_log_is_bounded() {
        let world = SimWorld::new(SimConfig {
            event_log_capacity: 3,
            ..Default::default()
        });
        let mut robot = world.robot();
        for heading in 0..1000u16 {
            robot.set_heading(heading).unwrap();
        }
        assert_eq!(world.headings(), vec![997, 998, 999]);
        assert_eq!(world.heading(), 999);

        let silent = SimWorld::new(SimConfig {
            event_log_capacity: 0,
            ..Default::default()
        });
        let mut robot = silent.robot();
        robot.set_speed(50).unwrap();
        assert!(silent.events().is_empty());
        assert_eq!(silent.speed(), 50);
    }
}
