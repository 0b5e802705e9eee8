//! `conenav-hal` – the boundary between planner commands and the drive base.
//!
//! - [`drive`] turns planner [`Command`][conenav_types::Command]s into
//!   acceleration-limited [`Twist`][conenav_types::Twist]s.
//! - [`sim`] is a kinematic stand-in for the robot and its surroundings so the
//!   whole stack can run headless in tests and from the CLI.

pub mod drive;
pub mod sim;

pub use drive::DriveController;
pub use sim::{SimRobot, SimWorld};
