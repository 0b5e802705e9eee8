//! Planar geometry primitives shared by every ConeNav crate.
//!
//! All quantities are SI: metres for distances, radians for angles, with
//! angles measured counter-clockwise from the frame's +X axis.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

// ────────────────────────────────────────────────────────────────────────────
// Point2D
// ────────────────────────────────────────────────────────────────────────────

/// A point in a stable 2-D reference frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`.
    pub fn distance(&self, other: &Point2D) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Pose
// ────────────────────────────────────────────────────────────────────────────

/// Robot position and heading.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    /// Heading (yaw) in radians.
    pub heading: f64,
}

impl Pose {
    pub fn new(x: f64, y: f64, heading: f64) -> Self {
        Self { x, y, heading }
    }

    /// The position part of the pose.
    pub fn position(&self) -> Point2D {
        Point2D::new(self.x, self.y)
    }

    /// Bearing from this pose's position to `target`, in the stable frame.
    pub fn angle_to(&self, target: &Point2D) -> f64 {
        (target.y - self.y).atan2(target.x - self.x)
    }
}

/// Wrap `angle` into `(-π, π]`.
pub fn normalize_angle(angle: f64) -> f64 {
    let mut a = angle % (2.0 * PI);
    if a > PI {
        a -= 2.0 * PI;
    } else if a <= -PI {
        a += 2.0 * PI;
    }
    a
}

// ────────────────────────────────────────────────────────────────────────────
// Transform2D
// ────────────────────────────────────────────────────────────────────────────

/// A rigid-body 2-D transform: rotation by `theta` followed by translation.
///
/// Represents the pose of frame B relative to frame A: to convert a point
/// expressed in frame B into frame A, rotate it by `theta` then add
/// `(x, y)`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Transform2D {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
}

impl Transform2D {
    pub fn new(x: f64, y: f64, theta: f64) -> Self {
        Self { x, y, theta }
    }

    /// The identity transform.
    pub fn identity() -> Self {
        Self::default()
    }

    /// The transform whose child frame sits at `pose`.
    pub fn from_pose(pose: &Pose) -> Self {
        Self::new(pose.x, pose.y, pose.heading)
    }

    /// Map a point expressed in the child frame into the parent frame.
    pub fn apply(&self, p: Point2D) -> Point2D {
        let (s, c) = self.theta.sin_cos();
        Point2D::new(c * p.x - s * p.y + self.x, s * p.x + c * p.y + self.y)
    }

    /// Compose two transforms: if `self` = T_A_B and `other` = T_B_C, the
    /// result is T_A_C.
    pub fn compose(&self, other: &Transform2D) -> Transform2D {
        let t = self.apply(Point2D::new(other.x, other.y));
        Transform2D::new(t.x, t.y, normalize_angle(self.theta + other.theta))
    }

    /// The inverse transform: T_A_B becomes T_B_A.
    pub fn inverse(&self) -> Transform2D {
        let (s, c) = self.theta.sin_cos();
        Transform2D::new(
            -(c * self.x + s * self.y),
            s * self.x - c * self.y,
            normalize_angle(-self.theta),
        )
    }
}
