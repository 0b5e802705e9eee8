//! Simulation scenarios – TOML descriptions of a course to drive.
//!
//! ```toml
//! name = "slalom"
//! duration = 60.0
//!
//! [start]
//! x = 0.0
//! y = 0.0
//! heading = 0.0
//!
//! [goal]
//! x = 8.0
//! y = 0.0
//!
//! [[obstacles]]
//! center = { x = 4.0, y = 0.2 }
//! radius = 0.5
//!
//! [[cones]]
//! x = 8.0
//! y = 0.0
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use conenav_hal::sim::{CameraConfig, Circle, LaserConfig, SimWorld};
use conenav_types::{Point2D, Pose};

/// One simulated run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scenario {
    pub name: String,
    /// Simulated seconds before giving up.
    pub duration: f64,
    /// Simulation step, in seconds.
    pub dt: f64,
    /// A scan is published every this many steps.
    pub scan_every: u32,
    /// Simulated seconds per wall-clock second; `0` runs unpaced.
    pub time_scale: f64,
    pub start: Pose,
    /// Goal in the odometry frame.
    pub goal: Point2D,
    pub obstacles: Vec<Circle>,
    pub cones: Vec<Point2D>,
    pub laser: LaserConfig,
    pub camera: CameraConfig,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            name: "open-field".to_string(),
            duration: 60.0,
            dt: 0.05,
            scan_every: 2,
            time_scale: 1.0,
            start: Pose::default(),
            goal: Point2D::new(8.0, 0.0),
            obstacles: vec![Circle {
                center: Point2D::new(4.0, 0.2),
                radius: 0.5,
            }],
            cones: Vec::new(),
            laser: LaserConfig::default(),
            camera: CameraConfig::default(),
        }
    }
}

impl Scenario {
    /// Parse a scenario file.
    pub fn load(path: &Path) -> Result<Self, String> {
        let raw = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read scenario at {}: {}", path.display(), e))?;
        let scenario: Scenario =
            toml::from_str(&raw).map_err(|e| format!("Failed to parse scenario: {}", e))?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Err("dt must be a positive number of seconds".to_string());
        }
        if !(self.duration.is_finite() && self.duration > 0.0) {
            return Err("duration must be a positive number of seconds".to_string());
        }
        if self.scan_every == 0 {
            return Err("scan_every must be at least 1".to_string());
        }
        if !(self.time_scale.is_finite() && self.time_scale >= 0.0) {
            return Err("time_scale must be zero or positive".to_string());
        }
        if self.obstacles.iter().any(|o| !(o.radius > 0.0)) {
            return Err("obstacle radii must be positive".to_string());
        }
        Ok(())
    }

    /// Number of simulation steps in the run.
    pub fn steps(&self) -> u64 {
        (self.duration / self.dt).ceil() as u64
    }

    /// The static world described by this scenario.
    pub fn world(&self) -> SimWorld {
        let world = self
            .obstacles
            .iter()
            .fold(SimWorld::new(), |w, o| w.with_obstacle(o.center, o.radius));
        self.cones
            .iter()
            .fold(world, |w, c| w.with_cone(*c))
            .with_laser(self.laser.clone())
            .with_camera(self.camera)
    }
}
