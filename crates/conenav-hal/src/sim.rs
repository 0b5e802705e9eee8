//! Kinematic simulation for headless runs without a physical robot.
//!
//! [`SimRobot`] integrates unicycle kinematics from [`Twist`] commands and
//! reports [`Odometry`]. [`SimWorld`] holds circular obstacles and cones and
//! renders what the robot's sensors would see from a given pose: a planar
//! [`LaserScan`], the bump switch and a camera-style [`ConeBearing`].
//!
//! # Example
//!
//! ```rust
//! use chrono::Utc;
//! use conenav_hal::sim::{SimRobot, SimWorld};
//! use conenav_types::{Point2D, Pose, Twist};
//!
//! let world = SimWorld::new()
//!     .with_obstacle(Point2D::new(3.0, 0.0), 0.5)
//!     .with_cone(Point2D::new(6.0, 1.0));
//!
//! let mut robot = SimRobot::new(Pose::default());
//! robot.command(Twist { linear: 0.5, angular: 0.0 });
//! robot.step(1.0);
//!
//! let scan = world.scan(&robot.pose(), Utc::now());
//! assert!(!scan.ranges.is_empty());
//! assert!(!world.contact(&robot.pose()));
//! ```

use serde::{Deserialize, Serialize};

use conenav_types::{
    ConeBearing, LaserScan, Odometry, Point2D, Pose, Timestamp, Transform2D, TransformStamped,
    Twist, normalize_angle,
};

/// Radius of a simulated traffic cone at laser height.
pub const CONE_RADIUS: f64 = 0.15;

// ────────────────────────────────────────────────────────────────────────────
// Robot
// ────────────────────────────────────────────────────────────────────────────

/// A differential-drive base that follows the last commanded twist exactly.
#[derive(Debug, Clone)]
pub struct SimRobot {
    pose: Pose,
    twist: Twist,
    frame_id: String,
}

impl SimRobot {
    /// A robot at rest at `pose`, reporting in the `"odom"` frame.
    pub fn new(pose: Pose) -> Self {
        Self {
            pose,
            twist: Twist::default(),
            frame_id: "odom".to_string(),
        }
    }

    /// Report odometry in `frame_id` instead of `"odom"`.
    pub fn with_frame(mut self, frame_id: impl Into<String>) -> Self {
        self.frame_id = frame_id.into();
        self
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    pub fn twist(&self) -> Twist {
        self.twist
    }

    pub fn frame_id(&self) -> &str {
        &self.frame_id
    }

    /// Latch a new velocity command.
    pub fn command(&mut self, twist: Twist) {
        self.twist = twist;
    }

    /// Advance the pose by `dt` seconds along the current twist.
    pub fn step(&mut self, dt: f64) {
        if dt <= 0.0 {
            return;
        }
        let Twist { linear: v, angular: w } = self.twist;
        let h = self.pose.heading;
        if w.abs() < 1e-9 {
            self.pose.x += v * h.cos() * dt;
            self.pose.y += v * h.sin() * dt;
        } else {
            // Exact integration along the arc of radius v / w.
            let r = v / w;
            let h1 = h + w * dt;
            self.pose.x += r * (h1.sin() - h.sin());
            self.pose.y -= r * (h1.cos() - h.cos());
            self.pose.heading = normalize_angle(h1);
        }
    }

    pub fn odometry(&self, stamp: Timestamp) -> Odometry {
        Odometry {
            stamp,
            frame_id: self.frame_id.clone(),
            pose: self.pose,
            linear_speed: self.twist.linear,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// World
// ────────────────────────────────────────────────────────────────────────────

/// A vertical cylinder, as seen by a planar sensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Circle {
    pub center: Point2D,
    pub radius: f64,
}

impl Circle {
    /// Distance along the unit ray `(origin, dir)` to the first surface
    /// crossing ahead of the origin.
    pub fn ray_hit(&self, origin: Point2D, dir: (f64, f64)) -> Option<f64> {
        let fx = origin.x - self.center.x;
        let fy = origin.y - self.center.y;
        let b = fx * dir.0 + fy * dir.1;
        let c = fx * fx + fy * fy - self.radius * self.radius;
        let disc = b * b - c;
        if disc < 0.0 {
            return None;
        }
        let sq = disc.sqrt();
        [-b - sq, -b + sq].into_iter().find(|t| *t > 0.0)
    }
}

/// Geometry and mounting of the simulated laser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaserConfig {
    pub frame_id: String,
    pub angle_min: f64,
    pub angle_increment: f64,
    pub beams: usize,
    pub range_min: f64,
    /// Beyond this nothing is returned (range `0.0`).
    pub range_max: f64,
    /// Distance of the laser ahead of the robot centre along the heading.
    pub mount_offset: f64,
}

impl Default for LaserConfig {
    fn default() -> Self {
        Self {
            frame_id: "laser".to_string(),
            angle_min: -2.0944,
            angle_increment: 0.006_136,
            beams: 683,
            range_min: 0.02,
            range_max: 5.6,
            mount_offset: 0.26,
        }
    }
}

/// Field of view of the simulated cone camera.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Full horizontal field of view, in radians.
    pub fov: f64,
    pub range: f64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self { fov: 1.0, range: 6.0 }
    }
}

/// Static surroundings of a [`SimRobot`].
#[derive(Debug, Clone)]
pub struct SimWorld {
    obstacles: Vec<Circle>,
    cones: Vec<Circle>,
    laser: LaserConfig,
    camera: CameraConfig,
    robot_radius: f64,
}

impl Default for SimWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl SimWorld {
    /// An empty world with the default laser, camera and a 0.4 m robot.
    pub fn new() -> Self {
        Self {
            obstacles: Vec::new(),
            cones: Vec::new(),
            laser: LaserConfig::default(),
            camera: CameraConfig::default(),
            robot_radius: 0.4,
        }
    }

    pub fn with_obstacle(mut self, center: Point2D, radius: f64) -> Self {
        self.obstacles.push(Circle { center, radius });
        self
    }

    pub fn with_cone(mut self, center: Point2D) -> Self {
        self.cones.push(Circle {
            center,
            radius: CONE_RADIUS,
        });
        self
    }

    pub fn with_laser(mut self, laser: LaserConfig) -> Self {
        self.laser = laser;
        self
    }

    pub fn with_camera(mut self, camera: CameraConfig) -> Self {
        self.camera = camera;
        self
    }

    pub fn with_robot_radius(mut self, radius: f64) -> Self {
        self.robot_radius = radius;
        self
    }

    pub fn laser(&self) -> &LaserConfig {
        &self.laser
    }

    pub fn cones(&self) -> impl Iterator<Item = Point2D> + '_ {
        self.cones.iter().map(|c| c.center)
    }

    /// Where the laser sits when the robot is at `pose`.
    pub fn laser_pose(&self, pose: &Pose) -> Pose {
        Pose::new(
            pose.x + self.laser.mount_offset * pose.heading.cos(),
            pose.y + self.laser.mount_offset * pose.heading.sin(),
            pose.heading,
        )
    }

    /// The `fixed_frame -> laser` transform for a robot at `pose`.
    pub fn laser_transform(&self, fixed_frame: &str, pose: &Pose, stamp: Timestamp) -> TransformStamped {
        TransformStamped {
            stamp,
            parent_frame: fixed_frame.to_string(),
            child_frame: self.laser.frame_id.clone(),
            transform: Transform2D::from_pose(&self.laser_pose(pose)),
            is_static: false,
        }
    }

    /// Render one laser sweep from `pose`. Beams that hit nothing within
    /// `range_max` report `0.0`, the sensor's no-return code.
    pub fn scan(&self, pose: &Pose, stamp: Timestamp) -> LaserScan {
        let origin = self.laser_pose(pose);
        let ranges = (0..self.laser.beams)
            .map(|i| {
                let angle = origin.heading + self.laser.angle_min + i as f64 * self.laser.angle_increment;
                let dir = (angle.cos(), angle.sin());
                self.obstacles
                    .iter()
                    .chain(&self.cones)
                    .filter_map(|c| c.ray_hit(origin.position(), dir))
                    .fold(None, |best: Option<f64>, t| Some(best.map_or(t, |b| b.min(t))))
                    .filter(|t| *t <= self.laser.range_max)
                    .unwrap_or(0.0)
            })
            .collect();
        LaserScan {
            stamp,
            frame_id: self.laser.frame_id.clone(),
            angle_min: self.laser.angle_min,
            angle_increment: self.laser.angle_increment,
            range_min: self.laser.range_min,
            ranges,
        }
    }

    /// `true` when the robot's disc at `pose` touches any obstacle or cone.
    pub fn contact(&self, pose: &Pose) -> bool {
        let p = pose.position();
        self.obstacles
            .iter()
            .chain(&self.cones)
            .any(|c| p.distance(&c.center) <= c.radius + self.robot_radius)
    }

    /// Bearing, relative to the heading, of the nearest cone the camera can
    /// see from `pose`.
    pub fn cone_bearing(&self, pose: &Pose, stamp: Timestamp) -> Option<ConeBearing> {
        let p = pose.position();
        self.cones
            .iter()
            .filter_map(|c| {
                let dist = p.distance(&c.center);
                let angle = normalize_angle(pose.angle_to(&c.center) - pose.heading);
                (dist <= self.camera.range && angle.abs() <= self.camera.fov / 2.0).then_some((dist, angle))
            })
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, angle)| ConeBearing { stamp, angle })
    }
}
