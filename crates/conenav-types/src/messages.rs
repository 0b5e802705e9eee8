//! Message types exchanged between the navigation node and the outside world.
//!
//! Inbound: [`Odometry`], [`LaserScan`], [`Goal`], [`ConeBearing`],
//! [`TransformStamped`], contact flags and [`ParamUpdate`] batches.
//! Outbound: [`Twist`], [`PathPreview`], [`GridSnapshot`], [`ConeMarkers`]
//! and goal-reached flags.

use serde::{Deserialize, Serialize};

use crate::Timestamp;
use crate::geometry::{Point2D, Pose, Transform2D};

// ────────────────────────────────────────────────────────────────────────────
// Commands
// ────────────────────────────────────────────────────────────────────────────

/// A planner command: drive at `speed` along an arc of `radius`.
///
/// `radius == 0` denotes a straight segment; positive radii turn left.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Command {
    /// Linear speed in m/s; negative values reverse.
    pub speed: f64,
    /// Signed turning radius in metres, `0.0` for straight travel.
    pub radius: f64,
}

impl Command {
    pub fn new(speed: f64, radius: f64) -> Self {
        Self { speed, radius }
    }

    /// The all-stop command.
    pub fn stop() -> Self {
        Self::default()
    }

    pub fn is_straight(&self) -> bool {
        self.radius == 0.0
    }

    /// `true` when the radius is straight or within `[min_radius, max_radius]`
    /// in magnitude.
    pub fn radius_within(&self, min_radius: f64, max_radius: f64) -> bool {
        self.is_straight() || (self.radius.abs() >= min_radius && self.radius.abs() <= max_radius)
    }
}

/// Kinematic velocity command sent to the drive base.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Twist {
    /// Linear velocity along the robot's X axis (m/s).
    pub linear: f64,
    /// Angular velocity around the vertical axis (rad/s).
    pub angular: f64,
}

// ────────────────────────────────────────────────────────────────────────────
// Inbound
// ────────────────────────────────────────────────────────────────────────────

/// Pose and velocity feedback from odometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Odometry {
    pub stamp: Timestamp,
    /// Frame the pose is expressed in, e.g. `"odom"`.
    pub frame_id: String,
    pub pose: Pose,
    /// Current forward speed reported by the base (m/s).
    pub linear_speed: f64,
}

/// A planar range scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaserScan {
    pub stamp: Timestamp,
    /// Frame of the scanner, e.g. `"laser"`.
    pub frame_id: String,
    /// Bearing of the first reading relative to the scanner (radians).
    pub angle_min: f64,
    /// Angular step between consecutive readings (radians).
    pub angle_increment: f64,
    /// Smallest range the scanner reports as a real return (metres).
    pub range_min: f64,
    /// Raw ranges in metres. Values below `range_min` may be status codes.
    pub ranges: Vec<f64>,
}

impl LaserScan {
    /// Bearing of reading `index` relative to the scanner.
    pub fn angle_of(&self, index: usize) -> f64 {
        self.angle_min + index as f64 * self.angle_increment
    }
}

/// A goal point to drive to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub stamp: Timestamp,
    pub frame_id: String,
    pub position: Point2D,
}

/// Bearing to a cone from the vision pipeline, relative to the robot's
/// heading (positive = left).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConeBearing {
    pub stamp: Timestamp,
    pub angle: f64,
}

/// A time-stamped transform between two named frames.
///
/// `transform` maps points expressed in `child_frame` into `parent_frame`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformStamped {
    pub stamp: Timestamp,
    pub parent_frame: String,
    pub child_frame: String,
    pub transform: Transform2D,
    /// Static transforms are valid at every time.
    #[serde(default)]
    pub is_static: bool,
}

/// Value of a named runtime parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
}

impl ParamValue {
    /// Numeric view of the value; booleans are not numbers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(i) => Some(*i as f64),
            ParamValue::Float(f) => Some(*f),
            ParamValue::Bool(_) => None,
        }
    }
}

/// A single named parameter assignment in a live reconfiguration batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamUpdate {
    pub name: String,
    pub value: ParamValue,
}

impl ParamUpdate {
    pub fn new(name: impl Into<String>, value: ParamValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Outbound
// ────────────────────────────────────────────────────────────────────────────

/// Tracked cone centres, published after every scan (possibly empty).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConeMarkers {
    pub stamp: Timestamp,
    pub frame_id: String,
    pub points: Vec<Point2D>,
}

/// Poses sampled along the arc the planner chose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathPreview {
    pub frame_id: String,
    pub poses: Vec<Pose>,
}

/// A square window of the occupancy grid, for visualization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSnapshot {
    pub stamp: Timestamp,
    pub frame_id: String,
    /// Metres per cell.
    pub resolution: f64,
    /// Side length of the window, in cells.
    pub width: usize,
    /// World coordinates of cell `(0, 0)`.
    pub origin: Point2D,
    /// Row-major levels in `[0, 4]`; row index is `y`, column is `x`.
    pub cells: Vec<u8>,
}
