//! Planner tuning parameters.

use serde::{Deserialize, Serialize};

use conenav_types::NavError;

/// Every knob of the arc planner and its recovery behaviours.
///
/// All distances in metres, speeds in m/s, times in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerParams {
    /// Tightest turn the base can drive.
    pub min_radius: f64,
    /// Wider turns are flattened to this radius.
    pub max_radius: f64,
    /// The goal counts as reached inside this distance.
    pub goal_err: f64,
    /// With cone tracking on, cone approach starts inside this distance.
    pub cone_dist: f64,
    pub max_speed: f64,
    pub min_speed: f64,
    /// Longest arc considered per cycle.
    pub planner_lookahead: f64,
    /// Largest speed-magnitude increase per pose tick.
    pub max_accel: f64,
    pub backup_time: f64,
    pub backup_dist: f64,
    /// How long every forward candidate must stay blocked before backing up.
    pub stuck_timeout: f64,
    /// A cone bearing older than this is ignored.
    pub cone_timeout: f64,
    /// Forward speed while approaching a cone.
    pub cone_speed: f64,
    pub track_cones: bool,
    /// Derive a bearing from the tracked cone registry when vision is silent.
    pub use_registry_bearing: bool,
}

impl Default for PlannerParams {
    fn default() -> Self {
        Self {
            min_radius: 0.695,
            max_radius: 4.0,
            goal_err: 0.3,
            cone_dist: 6.0,
            max_speed: 1.5,
            min_speed: 0.1,
            planner_lookahead: 4.0,
            max_accel: 0.3,
            backup_time: 10.0,
            backup_dist: 1.0,
            stuck_timeout: 2.0,
            cone_timeout: 1.0,
            cone_speed: 0.4,
            track_cones: false,
            use_registry_bearing: false,
        }
    }
}

impl PlannerParams {
    /// Reject combinations the planner cannot honour.
    pub fn validate(&self) -> Result<(), NavError> {
        let invalid = |name: &str, reason: &str| NavError::InvalidParameter {
            name: name.to_string(),
            reason: reason.to_string(),
        };
        for (name, value) in [
            ("min_radius", self.min_radius),
            ("max_radius", self.max_radius),
            ("goal_err", self.goal_err),
            ("cone_dist", self.cone_dist),
            ("max_speed", self.max_speed),
            ("min_speed", self.min_speed),
            ("planner_lookahead", self.planner_lookahead),
            ("max_accel", self.max_accel),
            ("backup_time", self.backup_time),
            ("backup_dist", self.backup_dist),
            ("stuck_timeout", self.stuck_timeout),
            ("cone_timeout", self.cone_timeout),
            ("cone_speed", self.cone_speed),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(invalid(name, "must be a non-negative number"));
            }
        }
        if self.min_radius <= 0.0 {
            return Err(invalid("min_radius", "must be positive"));
        }
        if self.max_radius < self.min_radius {
            return Err(invalid("max_radius", "must be at least min_radius"));
        }
        if self.min_speed > self.max_speed {
            return Err(invalid("min_speed", "must not exceed max_speed"));
        }
        if self.planner_lookahead <= 0.0 {
            return Err(invalid("planner_lookahead", "must be positive"));
        }
        Ok(())
    }
}
