//! [`NavigationNode`] – the single context object that owns all navigation
//! state.
//!
//! The occupancy grid, the cone registry, the planner state machine and the
//! transform buffer live here and nowhere else. Each `on_*` handler consumes
//! one inbound message and returns the payloads to publish; handlers never
//! run concurrently (see [`NodeRunner`][crate::runner::NodeRunner]), so none
//! of this state needs locking.
//!
//! | Handler | Drives |
//! |---|---|
//! | [`on_pose`][NavigationNode::on_pose] | goal conversion, planning tick, velocity command |
//! | [`on_scan`][NavigationNode::on_scan] | cone detection, grid update, snapshots |
//! | [`on_goal`][NavigationNode::on_goal] | stores the goal and activates the planner |
//! | [`on_contact`][NavigationNode::on_contact] | bump switch state |
//! | [`on_bearing`][NavigationNode::on_bearing] | vision cone bearing |
//! | [`on_transform`][NavigationNode::on_transform] | transform buffer |
//! | [`on_config`][NavigationNode::on_config] | atomic parameter swap |

use tracing::{debug, info, warn};

use conenav_hal::DriveController;
use conenav_perception::{ConeDetector, OccupancyMap, TfBuffer, TransformService};
use conenav_planner::{Planner, TickInputs};
use conenav_types::{
    ConeBearing, EventPayload, Goal, LaserScan, NavError, Odometry, ParamUpdate, PathPreview,
    TransformStamped, Twist, normalize_angle, seconds_between,
};

use crate::config::NavConfig;

/// Navigation state plus the handlers that evolve it.
pub struct NavigationNode {
    config: NavConfig,
    map: OccupancyMap,
    detector: ConeDetector,
    planner: Planner,
    drive: DriveController,
    tf: TfBuffer,
    goal: Option<Goal>,
    contact: bool,
    /// Last bearing from the vision collaborator.
    vision_bearing: Option<ConeBearing>,
    /// Bearing handed to the planner: vision, or derived from the registry.
    bearing: Option<ConeBearing>,
    last_odometry: Option<Odometry>,
}

impl NavigationNode {
    /// Build a node from a validated configuration.
    pub fn new(config: NavConfig) -> Result<Self, NavError> {
        config.validate()?;
        Ok(Self {
            map: OccupancyMap::new(config.map.clone()),
            detector: ConeDetector::new(
                config.detector.clone(),
                config.frames.fixed_frame.clone(),
                config.frames.timeout(),
            ),
            planner: Planner::new(config.planner.clone()),
            drive: DriveController::new(config.planner.max_accel),
            tf: TfBuffer::new(),
            goal: None,
            contact: false,
            vision_bearing: None,
            bearing: None,
            last_odometry: None,
            config,
        })
    }

    pub fn config(&self) -> &NavConfig {
        &self.config
    }

    pub fn planner(&self) -> &Planner {
        &self.planner
    }

    pub fn map(&self) -> &OccupancyMap {
        &self.map
    }

    pub fn detector(&self) -> &ConeDetector {
        &self.detector
    }

    pub fn goal(&self) -> Option<&Goal> {
        self.goal.as_ref()
    }

    pub fn bearing(&self) -> Option<&ConeBearing> {
        self.bearing.as_ref()
    }

    /// Route one inbound payload to its handler. Outbound payloads are
    /// ignored.
    pub fn handle(&mut self, payload: EventPayload) -> Vec<EventPayload> {
        match payload {
            EventPayload::Odometry(odom) => self.on_pose(odom),
            EventPayload::Scan(scan) => self.on_scan(&scan),
            EventPayload::Goal(goal) => self.on_goal(goal),
            EventPayload::Contact(pressed) => self.on_contact(pressed),
            EventPayload::ConeBearing(bearing) => self.on_bearing(bearing),
            EventPayload::Transform(tf) => self.on_transform(&tf),
            EventPayload::Reconfigure(updates) => {
                // Rejections are logged inside; nothing is published either way.
                let _ = self.on_config(&updates);
                Vec::new()
            }
            other => {
                debug!(payload = ?std::mem::discriminant(&other), "ignoring outbound payload");
                Vec::new()
            }
        }
    }

    // ── Pose ───────────────────────────────────────────────────────────────

    /// Run one planning cycle against the latest pose.
    pub fn on_pose(&mut self, odom: Odometry) -> Vec<EventPayload> {
        self.last_odometry = Some(odom.clone());

        if !self.planner.is_active() {
            return vec![EventPayload::CmdVel(Twist::default())];
        }
        let Some(goal) = self.goal_in_frame(&odom) else {
            return vec![EventPayload::CmdVel(Twist::default())];
        };

        let outcome = self.planner.tick(&TickInputs {
            now: odom.stamp,
            pose: odom.pose,
            goal: goal.position,
            map: &self.map,
            contact: self.contact,
            bearing: self.bearing,
        });

        let twist = self.drive.to_twist(&outcome.command, odom.linear_speed);
        let mut out = vec![EventPayload::CmdVel(twist)];
        if let Some(poses) = outcome.path {
            out.push(EventPayload::Path(PathPreview {
                frame_id: odom.frame_id.clone(),
                poses,
            }));
        }
        if let Some(reached) = outcome.goal_reached {
            out.push(EventPayload::GoalReached(reached));
        }
        out
    }

    /// The stored goal expressed in the pose frame, converting (and storing
    /// the conversion) if needed. `None` skips this cycle's plan.
    fn goal_in_frame(&mut self, odom: &Odometry) -> Option<Goal> {
        let goal = self.goal.as_ref()?;
        if goal.frame_id == odom.frame_id {
            return Some(goal.clone());
        }
        match self.tf.transform_point(
            &odom.frame_id,
            &goal.frame_id,
            odom.stamp,
            self.config.frames.timeout(),
            goal.position,
        ) {
            Ok(position) => {
                let converted = Goal {
                    stamp: goal.stamp,
                    frame_id: odom.frame_id.clone(),
                    position,
                };
                debug!(from = %goal.frame_id, to = %odom.frame_id, x = position.x, y = position.y, "goal converted");
                self.goal = Some(converted.clone());
                Some(converted)
            }
            Err(e) => {
                warn!(frame = %goal.frame_id, error = %e, "goal transform failed, skipping cycle");
                None
            }
        }
    }

    // ── Scan ───────────────────────────────────────────────────────────────

    /// Detect cones and fold the scan into the grid.
    pub fn on_scan(&mut self, scan: &LaserScan) -> Vec<EventPayload> {
        let mut out = Vec::new();

        match self.detector.process_scan(scan, &self.tf) {
            Ok(markers) => out.push(EventPayload::ConeMarkers(markers)),
            Err(e) => warn!(frame = %scan.frame_id, error = %e, "cone detection skipped"),
        }

        let Some(odom) = self.last_odometry.clone() else {
            warn!("scan dropped: no pose received yet");
            return out;
        };
        self.map.update(&odom.pose, scan);
        if self.map.snapshot_due() {
            out.push(EventPayload::Map(self.map.snapshot(&odom.pose, scan.stamp, &odom.frame_id)));
        }

        self.refresh_registry_bearing(&odom, scan);
        out
    }

    /// Derive a bearing from the nearest tracked cone while vision is silent.
    fn refresh_registry_bearing(&mut self, odom: &Odometry, scan: &LaserScan) {
        let params = self.planner.params();
        if !(params.track_cones && params.use_registry_bearing) {
            return;
        }
        let vision_fresh = self
            .vision_bearing
            .is_some_and(|b| seconds_between(scan.stamp, b.stamp) < params.cone_timeout);
        if vision_fresh {
            return;
        }

        let fixed = self.detector.fixed_frame().to_string();
        let to_pose_frame = if fixed == odom.frame_id {
            None
        } else {
            match self.tf.lookup_transform(&odom.frame_id, &fixed, scan.stamp, self.config.frames.timeout()) {
                Ok(t) => Some(t),
                Err(e) => {
                    warn!(frame = %fixed, error = %e, "registry bearing skipped");
                    return;
                }
            }
        };

        let robot = odom.pose.position();
        let robot_fixed = to_pose_frame.map_or(robot, |t| t.inverse().apply(robot));
        let nearest = self
            .detector
            .registry()
            .nearest_within(robot_fixed, params.cone_dist)
            .map(|cone| to_pose_frame.map_or(cone.center, |t| t.apply(cone.center)));

        if let Some(cone) = nearest {
            let angle = normalize_angle(odom.pose.angle_to(&cone) - odom.pose.heading);
            self.bearing = Some(ConeBearing {
                stamp: scan.stamp,
                angle,
            });
        }
    }

    // ── Small inputs ───────────────────────────────────────────────────────

    /// Store a new goal and (re)activate the planner.
    pub fn on_goal(&mut self, goal: Goal) -> Vec<EventPayload> {
        info!(x = goal.position.x, y = goal.position.y, frame = %goal.frame_id, "new goal");
        self.goal = Some(goal);
        self.planner.activate();
        Vec::new()
    }

    pub fn on_contact(&mut self, pressed: bool) -> Vec<EventPayload> {
        if pressed != self.contact {
            debug!(pressed, "contact changed");
        }
        self.contact = pressed;
        Vec::new()
    }

    pub fn on_bearing(&mut self, bearing: ConeBearing) -> Vec<EventPayload> {
        self.vision_bearing = Some(bearing);
        self.bearing = Some(bearing);
        Vec::new()
    }

    pub fn on_transform(&mut self, tf: &TransformStamped) -> Vec<EventPayload> {
        self.tf.set_transform(tf);
        Vec::new()
    }

    /// Apply a parameter batch atomically: all of it or none of it.
    pub fn on_config(&mut self, updates: &[ParamUpdate]) -> Result<(), NavError> {
        let next = match self.config.with_overrides(updates) {
            Ok(next) => next,
            Err(e) => {
                warn!(error = %e, "configuration rejected");
                return Err(e);
            }
        };
        self.planner.set_params(next.planner.clone());
        self.detector.set_params(next.detector.clone());
        self.drive.set_max_accel(next.planner.max_accel);
        self.config = next;
        info!(updates = updates.len(), "configuration applied");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use conenav_hal::sim::SimWorld;
    use conenav_perception::MapParams;
    use conenav_planner::{PlannerParams, PlannerState};
    use conenav_types::{ParamValue, Point2D, Pose, Timestamp, Transform2D};

    fn small_config() -> NavConfig {
        NavConfig {
            map: MapParams {
                size: 400,
                snapshot_interval: 3,
                snapshot_size: 50,
                ..MapParams::default()
            },
            ..NavConfig::default()
        }
    }

    fn odom(stamp: Timestamp, pose: Pose, speed: f64) -> Odometry {
        Odometry {
            stamp,
            frame_id: "odom".to_string(),
            pose,
            linear_speed: speed,
        }
    }

    fn goal(frame: &str, x: f64, y: f64) -> Goal {
        Goal {
            stamp: Utc::now(),
            frame_id: frame.to_string(),
            position: Point2D::new(x, y),
        }
    }

    fn twist_of(out: &[EventPayload]) -> Option<Twist> {
        out.iter().find_map(|p| match p {
            EventPayload::CmdVel(t) => Some(*t),
            _ => None,
        })
    }

    #[test]
    fn idle_node_commands_zero_twist() {
        let mut node = NavigationNode::new(small_config()).unwrap();
        let out = node.on_pose(odom(Utc::now(), Pose::default(), 0.0));
        assert_eq!(out, vec![EventPayload::CmdVel(Twist::default())]);
    }

    #[test]
    fn invalid_config_is_refused() {
        let mut cfg = small_config();
        cfg.planner.max_radius = 0.1;
        assert!(NavigationNode::new(cfg).is_err());
    }

    #[test]
    fn goal_starts_acceleration_limited_drive() {
        let mut node = NavigationNode::new(small_config()).unwrap();
        node.on_goal(goal("odom", 5.0, 0.0));

        let out = node.on_pose(odom(Utc::now(), Pose::default(), 0.0));
        let twist = twist_of(&out).unwrap();
        assert!((twist.linear - 0.3).abs() < 1e-9);
        assert_eq!(twist.angular, 0.0);
        assert!(out.iter().any(|p| matches!(p, EventPayload::Path(path) if path.frame_id == "odom")));

        // Already rolling at 1.0 m/s: capped at 1.3.
        let out = node.on_pose(odom(Utc::now(), Pose::default(), 1.0));
        assert!((twist_of(&out).unwrap().linear - 1.3).abs() < 1e-9);
    }

    #[test]
    fn reaching_goal_signals_and_goes_idle() {
        let mut node = NavigationNode::new(small_config()).unwrap();
        node.on_goal(goal("odom", 1.0, 0.0));
        let out = node.on_pose(odom(Utc::now(), Pose::new(0.9, 0.0, 0.0), 0.5));
        assert!(out.contains(&EventPayload::GoalReached(true)));
        assert_eq!(twist_of(&out), Some(Twist::default()));
        assert!(!node.planner().is_active());
    }

    #[test]
    fn goal_in_other_frame_is_converted_once_available() {
        let mut node = NavigationNode::new(small_config()).unwrap();
        let t0 = Utc::now();
        node.on_goal(goal("map", 5.0, 0.0));

        // No transform yet: no plan, the robot is held still.
        let out = node.on_pose(odom(t0, Pose::default(), 0.0));
        assert_eq!(out, vec![EventPayload::CmdVel(Twist::default())]);
        assert_eq!(node.goal().unwrap().frame_id, "map");

        node.on_transform(&TransformStamped {
            stamp: t0,
            parent_frame: "odom".to_string(),
            child_frame: "map".to_string(),
            transform: Transform2D::new(1.0, 2.0, 0.0),
            is_static: true,
        });
        let out = node.on_pose(odom(t0, Pose::default(), 0.0));
        assert!(twist_of(&out).is_some());
        let stored = node.goal().unwrap();
        assert_eq!(stored.frame_id, "odom");
        assert!((stored.position.x - 6.0).abs() < 1e-9);
        assert!((stored.position.y - 2.0).abs() < 1e-9);
    }

    #[test]
    fn scan_before_pose_still_detects_but_skips_grid() {
        let mut node = NavigationNode::new(small_config()).unwrap();
        let world = SimWorld::new().with_cone(Point2D::new(1.0, 0.0));
        let t0 = Utc::now();
        node.on_transform(&world.laser_transform("odom", &Pose::default(), t0));

        let out = node.on_scan(&world.scan(&Pose::default(), t0));
        assert!(matches!(&out[..], [EventPayload::ConeMarkers(_)]));
        assert_eq!(node.map().scans_processed(), 0);
    }

    #[test]
    fn scan_without_transform_still_updates_grid() {
        let mut node = NavigationNode::new(small_config()).unwrap();
        let world = SimWorld::new().with_obstacle(Point2D::new(2.0, 0.0), 0.3);
        let t0 = Utc::now();
        node.on_pose(odom(t0, Pose::default(), 0.0));

        let out = node.on_scan(&world.scan(&Pose::default(), t0));
        assert!(!out.iter().any(|p| matches!(p, EventPayload::ConeMarkers(_))));
        assert_eq!(node.map().scans_processed(), 1);
        assert!(node.map().level(Point2D::new(1.7, 0.0)) > 0);
    }

    #[test]
    fn cone_in_scan_lands_in_registry() {
        let mut node = NavigationNode::new(small_config()).unwrap();
        let world = SimWorld::new().with_cone(Point2D::new(1.5, 0.3));
        let t0 = Utc::now();
        let pose = Pose::default();
        node.on_pose(odom(t0, pose, 0.0));
        node.on_transform(&world.laser_transform("odom", &pose, t0));

        let out = node.on_scan(&world.scan(&pose, t0));
        let markers = out
            .iter()
            .find_map(|p| match p {
                EventPayload::ConeMarkers(m) => Some(m.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(markers.points.len(), 1);
        assert!(markers.points[0].distance(&Point2D::new(1.5, 0.3)) < 0.05);
    }

    #[test]
    fn snapshots_follow_scan_interval() {
        let mut node = NavigationNode::new(small_config()).unwrap();
        let world = SimWorld::new();
        let t0 = Utc::now();
        node.on_pose(odom(t0, Pose::default(), 0.0));

        let snapshots: Vec<usize> = (0..7)
            .filter(|k| {
                let out = node.on_scan(&world.scan(&Pose::default(), t0 + Duration::milliseconds(100 * *k as i64)));
                out.iter().any(|p| matches!(p, EventPayload::Map(_)))
            })
            .collect();
        assert_eq!(snapshots, vec![2, 5]);
    }

    #[test]
    fn registry_bearing_feeds_planner_when_vision_is_silent() {
        let mut cfg = small_config();
        cfg.planner.track_cones = true;
        cfg.planner.use_registry_bearing = true;
        let mut node = NavigationNode::new(cfg).unwrap();
        let world = SimWorld::new().with_cone(Point2D::new(1.5, 0.5));
        let t0 = Utc::now();
        let pose = Pose::default();
        node.on_pose(odom(t0, pose, 0.0));
        node.on_transform(&world.laser_transform("odom", &pose, t0));
        node.on_scan(&world.scan(&pose, t0));

        let b = node.bearing().copied().unwrap();
        assert_eq!(b.stamp, t0);
        assert!((b.angle - 0.5f64.atan2(1.5)).abs() < 0.05);

        // A fresh vision bearing takes precedence.
        let vision = ConeBearing { stamp: t0, angle: -0.2 };
        node.on_bearing(vision);
        node.on_scan(&world.scan(&pose, t0 + Duration::milliseconds(100)));
        assert_eq!(node.bearing(), Some(&vision));
    }

    #[test]
    fn registry_bearing_through_separate_fixed_frame() {
        let mut cfg = small_config();
        cfg.planner.track_cones = true;
        cfg.planner.use_registry_bearing = true;
        cfg.frames.fixed_frame = "map".to_string();
        let mut node = NavigationNode::new(cfg).unwrap();
        let world = SimWorld::new().with_cone(Point2D::new(1.5, 0.5));
        let t0 = Utc::now();
        let pose = Pose::default();
        node.on_transform(&TransformStamped {
            stamp: t0,
            parent_frame: "map".to_string(),
            child_frame: "odom".to_string(),
            transform: Transform2D::new(1.0, 2.0, 0.0),
            is_static: true,
        });
        node.on_pose(odom(t0, pose, 0.0));
        node.on_transform(&world.laser_transform("odom", &pose, t0));
        node.on_scan(&world.scan(&pose, t0));

        // Tracked in the map frame, bearing taken in the odometry frame.
        let tracked = node.detector().registry().centers();
        assert_eq!(tracked.len(), 1);
        assert!(tracked[0].distance(&Point2D::new(2.5, 2.5)) < 0.1, "{tracked:?}");
        let b = node.bearing().copied().unwrap();
        assert!((b.angle - 0.5f64.atan2(1.5)).abs() < 0.05, "angle={}", b.angle);

        // Out of cone range: the bearing is left alone.
        let mut far = NavigationNode::new(NavConfig {
            planner: PlannerParams {
                track_cones: true,
                use_registry_bearing: true,
                cone_dist: 1.0,
                ..PlannerParams::default()
            },
            ..small_config()
        })
        .unwrap();
        far.on_pose(odom(t0, pose, 0.0));
        far.on_transform(&world.laser_transform("odom", &pose, t0));
        far.on_scan(&world.scan(&pose, t0));
        assert_eq!(far.detector().registry().len(), 1);
        assert!(far.bearing().is_none());
    }

    #[test]
    fn registry_bearing_off_by_default() {
        let mut node = NavigationNode::new(small_config()).unwrap();
        let world = SimWorld::new().with_cone(Point2D::new(1.5, 0.5));
        let t0 = Utc::now();
        node.on_pose(odom(t0, Pose::default(), 0.0));
        node.on_transform(&world.laser_transform("odom", &Pose::default(), t0));
        node.on_scan(&world.scan(&Pose::default(), t0));
        assert!(node.bearing().is_none());
    }

    #[test]
    fn cone_contact_flow() {
        let mut cfg = small_config();
        cfg.planner.track_cones = true;
        let mut node = NavigationNode::new(cfg).unwrap();
        let t0 = Utc::now();
        node.on_goal(goal("odom", 3.0, 0.0));
        node.on_pose(odom(t0, Pose::default(), 0.0));
        assert!(matches!(node.planner().state(), PlannerState::ConeApproach { .. }));

        node.on_contact(true);
        let out = node.on_pose(odom(t0 + Duration::seconds(1), Pose::new(0.5, 0.0, 0.0), 0.4));
        assert_eq!(twist_of(&out), Some(Twist::default()));
        assert_eq!(
            out.iter().filter(|p| matches!(p, EventPayload::GoalReached(false))).count(),
            1
        );
        assert!(matches!(node.planner().state(), PlannerState::Backing { .. }));

        // Idle again: further poses only command a stop.
        let out = node.on_pose(odom(t0 + Duration::seconds(2), Pose::new(0.5, 0.0, 0.0), 0.0));
        assert_eq!(out, vec![EventPayload::CmdVel(Twist::default())]);
    }

    #[test]
    fn config_batch_is_atomic() {
        let mut node = NavigationNode::new(small_config()).unwrap();
        let before = node.config().clone();
        let result = node.on_config(&[
            ParamUpdate::new("max_speed", ParamValue::Float(0.5)),
            ParamUpdate::new("no_such_knob", ParamValue::Int(1)),
        ]);
        assert!(result.is_err());
        assert_eq!(node.config(), &before);

        node.on_config(&[
            ParamUpdate::new("max_accel", ParamValue::Float(1.0)),
            ParamUpdate::new("same_cone_threshold", ParamValue::Float(0.5)),
        ])
        .unwrap();
        assert_eq!(node.planner().params().max_accel, 1.0);
        assert_eq!(node.detector().params().same_cone_threshold, 0.5);

        node.on_goal(goal("odom", 5.0, 0.0));
        let out = node.on_pose(odom(Utc::now(), Pose::default(), 0.0));
        assert!((twist_of(&out).unwrap().linear - 1.0).abs() < 1e-9);
    }

    #[test]
    fn handle_dispatches_and_ignores_outbound() {
        let mut node = NavigationNode::new(small_config()).unwrap();
        assert!(node.handle(EventPayload::GoalReached(true)).is_empty());
        assert!(node.handle(EventPayload::Goal(goal("odom", 5.0, 0.0))).is_empty());
        assert!(node.planner().is_active());
        let out = node.handle(EventPayload::Odometry(odom(Utc::now(), Pose::default(), 0.0)));
        assert!(twist_of(&out).is_some());
    }
}
