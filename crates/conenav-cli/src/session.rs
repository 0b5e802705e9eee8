//! Runs a [`NavigationNode`] against the simulator over the event bus.
//!
//! The simulator steps in lockstep with the node: each step publishes the
//! step's sensor traffic, then waits for the velocity command answering that
//! step's odometry before integrating the robot forward. Runs are therefore
//! reproducible however fast they are paced.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info};

use conenav_hal::sim::SimRobot;
use conenav_middleware::{EventBus, Topic, TopicReceiver};
use conenav_runtime::{NavConfig, NavigationNode, NodeRunner};
use conenav_types::{
    Event, EventPayload, Goal, NavError, Pose, Transform2D, TransformStamped, Twist,
};

use crate::scenario::Scenario;

const SOURCE: &str = "conenav-cli::sim";

/// Longest wait for the node to answer one step.
const STEP_TIMEOUT: Duration = Duration::from_secs(2);

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The node reported the goal reached.
    GoalReached,
    /// The node gave up on the goal (cone touched or approach timed out).
    GoalAbandoned,
    TimedOut,
    Interrupted,
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub outcome: Outcome,
    /// Simulated seconds elapsed.
    pub elapsed: f64,
    pub final_pose: Pose,
    /// Cones tracked by the node at the end of the run.
    pub cones_tracked: usize,
}

/// Drive `scenario` with a node built from `config`. `on_progress` is called
/// once per simulated second with the elapsed time and the robot's pose.
pub async fn run(
    config: NavConfig,
    scenario: &Scenario,
    shutdown: Arc<AtomicBool>,
    mut on_progress: impl FnMut(f64, &Pose, &Twist),
) -> Result<Report, NavError> {
    let bus = EventBus::default();
    let mut commands = bus.subscribe_to(Topic::Commands);
    let mut status = bus.subscribe_to(Topic::Status);

    let fixed_frame = config.frames.fixed_frame.clone();
    let node = NavigationNode::new(config)?;
    let (stop_tx, stop_rx) = watch::channel(false);
    let runner = tokio::spawn(NodeRunner::new(node, bus.clone()).run(stop_rx));

    let world = scenario.world();
    let mut robot = SimRobot::new(scenario.start);
    let t0 = Utc::now();

    if fixed_frame != robot.frame_id() {
        publish(
            &bus,
            EventPayload::Transform(TransformStamped {
                stamp: t0,
                parent_frame: fixed_frame.clone(),
                child_frame: robot.frame_id().to_string(),
                transform: Transform2D::identity(),
                is_static: true,
            }),
        )?;
    }
    publish(
        &bus,
        EventPayload::Goal(Goal {
            stamp: t0,
            frame_id: robot.frame_id().to_string(),
            position: scenario.goal,
        }),
    )?;
    info!(scenario = %scenario.name, x = scenario.goal.x, y = scenario.goal.y, "simulation started");

    let pace = (scenario.time_scale > 0.0).then(|| Duration::from_secs_f64(scenario.dt / scenario.time_scale));
    let steps_per_report = (1.0 / scenario.dt).round().max(1.0) as u64;
    let mut outcome = Outcome::TimedOut;
    let mut step = 0;

    while step < scenario.steps() {
        if shutdown.load(Ordering::SeqCst) {
            outcome = Outcome::Interrupted;
            break;
        }
        if let Some(reached) = goal_reached(&mut status) {
            outcome = if reached { Outcome::GoalReached } else { Outcome::GoalAbandoned };
            break;
        }

        let stamp = t0 + chrono::Duration::microseconds((step as f64 * scenario.dt * 1e6) as i64);
        let pose = robot.pose();
        publish(&bus, EventPayload::Transform(world.laser_transform(robot.frame_id(), &pose, stamp)))?;
        publish(&bus, EventPayload::Contact(world.contact(&pose)))?;
        if let Some(bearing) = world.cone_bearing(&pose, stamp) {
            publish(&bus, EventPayload::ConeBearing(bearing))?;
        }
        if step % u64::from(scenario.scan_every) == 0 {
            publish(&bus, EventPayload::Scan(world.scan(&pose, stamp)))?;
        }
        publish(&bus, EventPayload::Odometry(robot.odometry(stamp)))?;

        let twist = next_command(&mut commands).await?;
        robot.command(twist);
        robot.step(scenario.dt);
        step += 1;

        if step % steps_per_report == 0 {
            on_progress(step as f64 * scenario.dt, &robot.pose(), &twist);
        }
        if let Some(period) = pace {
            tokio::time::sleep(period).await;
        }
    }

    let _ = stop_tx.send(true);
    let node = runner
        .await
        .map_err(|e| NavError::Channel(format!("navigation node task failed: {e}")))?;
    robot.command(Twist::default());

    let report = Report {
        outcome,
        elapsed: step as f64 * scenario.dt,
        final_pose: robot.pose(),
        cones_tracked: node.detector().registry().len(),
    };
    info!(outcome = ?report.outcome, elapsed = report.elapsed, "simulation finished");
    Ok(report)
}

fn publish(bus: &EventBus, payload: EventPayload) -> Result<usize, NavError> {
    bus.publish(Event::new(SOURCE, payload))
}

/// The latest goal-reached flag published since the last call.
fn goal_reached(status: &mut TopicReceiver) -> Option<bool> {
    std::iter::from_fn(|| status.try_next())
        .filter_map(|e| match e.payload {
            EventPayload::GoalReached(v) => Some(v),
            _ => None,
        })
        .last()
}

/// Wait for the node's answer to this step's odometry.
async fn next_command(commands: &mut TopicReceiver) -> Result<Twist, NavError> {
    loop {
        let event = tokio::time::timeout(STEP_TIMEOUT, commands.next())
            .await
            .map_err(|_| NavError::Channel("navigation node stopped answering".to_string()))?
            .ok_or_else(|| NavError::Channel("event bus closed".to_string()))?;
        match event.payload {
            EventPayload::CmdVel(twist) => return Ok(twist),
            other => debug!(payload = ?other, "unexpected payload on command lane"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conenav_hal::sim::Circle;
    use conenav_types::Point2D;

    fn fast_config() -> NavConfig {
        let mut cfg = NavConfig::default();
        cfg.map.size = 400;
        cfg
    }

    fn fast_scenario() -> Scenario {
        Scenario {
            time_scale: 0.0,
            duration: 30.0,
            goal: Point2D::new(3.0, 0.0),
            obstacles: Vec::new(),
            ..Scenario::default()
        }
    }

    #[tokio::test]
    async fn reaches_goal_in_open_field() {
        let mut ticks = 0;
        let report = run(fast_config(), &fast_scenario(), Arc::new(AtomicBool::new(false)), |_, _, _| {
            ticks += 1
        })
        .await
        .unwrap();
        assert_eq!(report.outcome, Outcome::GoalReached);
        assert!(report.final_pose.position().distance(&Point2D::new(3.0, 0.0)) < 0.5);
        assert!(ticks >= 1);
    }

    #[tokio::test]
    async fn drives_around_obstacle() {
        let scenario = Scenario {
            duration: 60.0,
            goal: Point2D::new(6.0, 0.0),
            obstacles: vec![Circle {
                center: Point2D::new(3.0, 0.3),
                radius: 0.4,
            }],
            ..fast_scenario()
        };
        let center = scenario.obstacles[0].center;
        let report = run(fast_config(), &scenario, Arc::new(AtomicBool::new(false)), |_, pose, _| {
            assert!(pose.position().distance(&center) > 0.4, "robot drove into the obstacle at {pose:?}");
        })
        .await
        .unwrap();
        assert_eq!(report.outcome, Outcome::GoalReached);
    }

    #[tokio::test]
    async fn cone_hunt_ends_on_contact() {
        let mut cfg = fast_config();
        cfg.planner.track_cones = true;
        let scenario = Scenario {
            cones: vec![Point2D::new(3.0, 0.0)],
            ..fast_scenario()
        };
        let report = run(cfg, &scenario, Arc::new(AtomicBool::new(false)), |_, _, _| {})
            .await
            .unwrap();
        assert_eq!(report.outcome, Outcome::GoalAbandoned);
        assert!(report.final_pose.x > 2.0);
        assert_eq!(report.cones_tracked, 1);
    }

    #[tokio::test]
    async fn interrupt_stops_immediately() {
        let report = run(fast_config(), &fast_scenario(), Arc::new(AtomicBool::new(true)), |_, _, _| {})
            .await
            .unwrap();
        assert_eq!(report.outcome, Outcome::Interrupted);
        assert_eq!(report.elapsed, 0.0);
    }

    #[tokio::test]
    async fn short_run_times_out() {
        let scenario = Scenario {
            duration: 0.5,
            ..fast_scenario()
        };
        let report = run(fast_config(), &scenario, Arc::new(AtomicBool::new(false)), |_, _, _| {})
            .await
            .unwrap();
        assert_eq!(report.outcome, Outcome::TimedOut);
        assert!(report.final_pose.x > 0.0);
    }
}
