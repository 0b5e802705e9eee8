//! Control integration: acceleration limiting and kinematic conversion.
//!
//! The planner thinks in `(speed, radius)` arcs; the drive base wants
//! `(linear, angular)` velocities. [`DriveController`] bridges the two and
//! keeps speed-magnitude increases per tick within `max_accel`, measured from
//! the speed the base last reported. Slowing down is never limited.
//!
//! # Example
//!
//! ```rust
//! use conenav_hal::drive::DriveController;
//! use conenav_types::Command;
//!
//! let drive = DriveController::new(0.3);
//!
//! // Standing still, asking for 1.5 m/s on a 2 m arc.
//! let twist = drive.to_twist(&Command::new(1.5, 2.0), 0.0);
//! assert!((twist.linear - 0.3).abs() < 1e-9);
//! assert!((twist.angular - 0.15).abs() < 1e-9);
//! ```

use conenav_types::{Command, Twist};

/// Stateless converter from planner commands to drive velocities.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriveController {
    max_accel: f64,
}

impl DriveController {
    /// `max_accel` is the largest speed-magnitude increase allowed per tick.
    pub fn new(max_accel: f64) -> Self {
        Self { max_accel }
    }

    pub fn max_accel(&self) -> f64 {
        self.max_accel
    }

    pub fn set_max_accel(&mut self, max_accel: f64) {
        self.max_accel = max_accel;
    }

    /// Limit `requested` so its magnitude grows by at most `max_accel` over
    /// `current`. Reversing direction starts from zero.
    pub fn limit_speed(&self, requested: f64, current: f64) -> f64 {
        if requested > 0.0 {
            requested.min(current.max(0.0) + self.max_accel)
        } else if requested < 0.0 {
            requested.max(current.min(0.0) - self.max_accel)
        } else {
            0.0
        }
    }

    /// Acceleration-limit `command` and convert it to a twist. The radius is
    /// kept, so the limited twist still follows the planned arc.
    pub fn to_twist(&self, command: &Command, current_speed: f64) -> Twist {
        let linear = self.limit_speed(command.speed, current_speed);
        let angular = if command.radius != 0.0 {
            linear / command.radius
        } else {
            0.0
        };
        Twist { linear, angular }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speeding_up_is_limited_per_tick() {
        let drive = DriveController::new(0.3);
        assert!((drive.limit_speed(1.5, 0.0) - 0.3).abs() < 1e-9);
        assert!((drive.limit_speed(1.5, 1.0) - 1.3).abs() < 1e-9);
        assert!((drive.limit_speed(1.1, 1.0) - 1.1).abs() < 1e-9);
    }

    #[test]
    fn slowing_down_is_immediate() {
        let drive = DriveController::new(0.3);
        assert!((drive.limit_speed(0.2, 1.5) - 0.2).abs() < 1e-9);
        assert_eq!(drive.limit_speed(0.0, 1.5), 0.0);
        assert!((drive.limit_speed(-0.1, -1.0) + 0.1).abs() < 1e-9);
    }

    #[test]
    fn reverse_is_limited_symmetrically() {
        let drive = DriveController::new(0.3);
        assert!((drive.limit_speed(-1.0, 0.0) + 0.3).abs() < 1e-9);
        assert!((drive.limit_speed(-1.0, -0.5) + 0.8).abs() < 1e-9);
        // Still rolling forward: reverse ramps up from zero.
        assert!((drive.limit_speed(-0.2, 0.8) + 0.2).abs() < 1e-9);
        assert!((drive.limit_speed(-1.0, 0.8) + 0.3).abs() < 1e-9);
    }

    #[test]
    fn straight_commands_have_no_rotation() {
        let drive = DriveController::new(10.0);
        let twist = drive.to_twist(&Command::new(1.0, 0.0), 1.0);
        assert_eq!(twist, Twist { linear: 1.0, angular: 0.0 });
    }

    #[test]
    fn angular_rate_follows_limited_speed() {
        let drive = DriveController::new(0.3);
        let twist = drive.to_twist(&Command::new(-0.2, -0.695), 0.0);
        assert!((twist.linear + 0.2).abs() < 1e-9);
        assert!((twist.angular - 0.2 / 0.695).abs() < 1e-9);
    }

    #[test]
    fn stop_is_zero_twist() {
        let drive = DriveController::new(0.3);
        assert_eq!(drive.to_twist(&Command::stop(), 1.2), Twist::default());
    }
}
